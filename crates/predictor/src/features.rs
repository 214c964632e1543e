//! Feature extraction from an indicator frame.

use ndarray::{Array1, Array2};
use strategy::{Indicator, IndicatorFrame};

/// Indicator columns used directly as model inputs.
pub const INDICATOR_FEATURES: [Indicator; 28] = [
    Indicator::Rsi,
    Indicator::Macd,
    Indicator::MacdSignal,
    Indicator::MacdDiff,
    Indicator::BbUpper,
    Indicator::BbMiddle,
    Indicator::BbLower,
    Indicator::BbWidth,
    Indicator::BbPercent,
    Indicator::Atr,
    Indicator::Adx,
    Indicator::AdxPos,
    Indicator::AdxNeg,
    Indicator::StochK,
    Indicator::StochD,
    Indicator::WilliamsR,
    Indicator::Obv,
    Indicator::Vwap,
    Indicator::VolumeSma,
    Indicator::Sma20,
    Indicator::Sma50,
    Indicator::Ema9,
    Indicator::Ema21,
    Indicator::Momentum5,
    Indicator::Momentum10,
    Indicator::Momentum20,
    Indicator::Volatility20,
    Indicator::TrendStrength,
];

pub const ENGINEERED_FEATURES: [&str; 3] = ["price_position", "volume_ratio", "distance_from_sma20"];

pub const FEATURE_COUNT: usize = INDICATOR_FEATURES.len() + ENGINEERED_FEATURES.len();

const EPSILON: f64 = 1e-10;

pub fn feature_names() -> Vec<&'static str> {
    INDICATOR_FEATURES
        .iter()
        .map(|i| i.name())
        .chain(ENGINEERED_FEATURES)
        .collect()
}

/// Feature vector for row `at`, or `None` if any input is missing.
pub fn feature_row(frame: &IndicatorFrame, at: usize) -> Option<Vec<f64>> {
    let candle = frame.candles().get(at)?;
    let mut row = Vec::with_capacity(FEATURE_COUNT);
    for indicator in INDICATOR_FEATURES {
        row.push(frame.value(indicator, at)?);
    }

    let sma20 = frame.value(Indicator::Sma20, at)?;
    let volume_sma = frame.value(Indicator::VolumeSma, at)?;
    if sma20 == 0.0 || volume_sma <= 0.0 {
        return None;
    }
    row.push((candle.close - candle.low) / (candle.high - candle.low + EPSILON));
    row.push(candle.volume / volume_sma);
    row.push((candle.close - sma20) / sma20);
    Some(row)
}

/// Labelled training rows in chronological order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    /// 1.0 when the next close is higher than this close, else 0.0.
    pub labels: Vec<f64>,
}

impl Dataset {
    /// Every row with a complete feature vector and a following candle.
    pub fn from_frame(frame: &IndicatorFrame) -> Self {
        let candles = frame.candles();
        let mut out = Dataset::default();
        for at in 0..candles.len().saturating_sub(1) {
            if let Some(row) = feature_row(frame, at) {
                out.features.push(row);
                out.labels.push(if candles[at + 1].close > candles[at].close { 1.0 } else { 0.0 });
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Chronological split: the first `fraction` of rows, then the rest.
    pub fn split(&self, fraction: f64) -> (Dataset, Dataset) {
        let cut = ((self.len() as f64) * fraction).round() as usize;
        let cut = cut.min(self.len());
        (
            Dataset {
                features: self.features[..cut].to_vec(),
                labels: self.labels[..cut].to_vec(),
            },
            Dataset {
                features: self.features[cut..].to_vec(),
                labels: self.labels[cut..].to_vec(),
            },
        )
    }

    /// Feature matrix `(rows, FEATURE_COUNT)` and label vector.
    pub fn to_arrays(&self) -> (Array2<f64>, Array1<f64>) {
        let width = self.features.first().map_or(0, Vec::len);
        let x = Array2::from_shape_fn((self.features.len(), width), |(i, j)| self.features[i][j]);
        (x, Array1::from(self.labels.clone()))
    }

    pub fn positive_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.5;
        }
        self.labels.iter().sum::<f64>() / self.len() as f64
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{Duration, TimeZone, Utc};
    use common::{Candle, CandleSeries};
    use strategy::{compute_indicators, IndicatorConfig, IndicatorFrame};

    /// A noisy oscillating market with varying volume.
    pub fn market_frame(n: usize) -> IndicatorFrame {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = (0..n)
            .map(|i| {
                let t = i as f64;
                let close = 1000.0 + 50.0 * (t / 9.0).sin() + 20.0 * (t / 2.3).cos() + t * 0.3;
                Candle {
                    timestamp: start + Duration::hours(i as i64),
                    open: close - 1.0,
                    high: close + 4.0 + (t / 3.0).sin().abs() * 3.0,
                    low: close - 4.0 - (t / 5.0).cos().abs() * 3.0,
                    close,
                    volume: 500.0 + 200.0 * (t / 4.0).sin().abs(),
                }
            })
            .collect();
        compute_indicators(&CandleSeries::new(candles).unwrap(), &IndicatorConfig::default())
    }
}
