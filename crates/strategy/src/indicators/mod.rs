//! Indicator Engine: derives technical indicator columns from a candle series.
//!
//! Each indicator is computed independently. A failure (short history, bad
//! period) degrades that one column to all-missing and is logged; it never
//! aborts the rest of the frame.

pub mod custom;
pub mod math;
pub mod momentum;
pub mod trend;
pub mod volatility;
pub mod volume;

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use common::{Candle, CandleSeries};

use crate::config::IndicatorConfig;

/// Rows at the head of every frame that are excluded from decisions.
pub const WARMUP_CANDLES: usize = 100;

/// A derived column aligned with the candle series. `None` means missing.
pub type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("need {needed} rows, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("invalid period {0}")]
    InvalidPeriod(usize),
}

/// Every derived column the engine produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    // trend
    Sma20,
    Sma50,
    Sma200,
    Ema9,
    Ema21,
    Ema55,
    Macd,
    MacdSignal,
    MacdDiff,
    Adx,
    AdxPos,
    AdxNeg,
    // momentum
    Rsi,
    StochK,
    StochD,
    Roc,
    WilliamsR,
    // volatility
    BbUpper,
    BbMiddle,
    BbLower,
    BbWidth,
    BbPercent,
    Atr,
    // volume
    Obv,
    Vwap,
    VolumeSma,
    // custom
    Momentum5,
    Momentum10,
    Momentum20,
    Volatility20,
    HigherHigh,
    LowerLow,
    Support,
    Resistance,
    TrendStrength,
}

impl Indicator {
    pub const ALL: [Indicator; 35] = [
        Indicator::Sma20,
        Indicator::Sma50,
        Indicator::Sma200,
        Indicator::Ema9,
        Indicator::Ema21,
        Indicator::Ema55,
        Indicator::Macd,
        Indicator::MacdSignal,
        Indicator::MacdDiff,
        Indicator::Adx,
        Indicator::AdxPos,
        Indicator::AdxNeg,
        Indicator::Rsi,
        Indicator::StochK,
        Indicator::StochD,
        Indicator::Roc,
        Indicator::WilliamsR,
        Indicator::BbUpper,
        Indicator::BbMiddle,
        Indicator::BbLower,
        Indicator::BbWidth,
        Indicator::BbPercent,
        Indicator::Atr,
        Indicator::Obv,
        Indicator::Vwap,
        Indicator::VolumeSma,
        Indicator::Momentum5,
        Indicator::Momentum10,
        Indicator::Momentum20,
        Indicator::Volatility20,
        Indicator::HigherHigh,
        Indicator::LowerLow,
        Indicator::Support,
        Indicator::Resistance,
        Indicator::TrendStrength,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Indicator::Sma20 => "sma_20",
            Indicator::Sma50 => "sma_50",
            Indicator::Sma200 => "sma_200",
            Indicator::Ema9 => "ema_9",
            Indicator::Ema21 => "ema_21",
            Indicator::Ema55 => "ema_55",
            Indicator::Macd => "macd",
            Indicator::MacdSignal => "macd_signal",
            Indicator::MacdDiff => "macd_diff",
            Indicator::Adx => "adx",
            Indicator::AdxPos => "adx_pos",
            Indicator::AdxNeg => "adx_neg",
            Indicator::Rsi => "rsi",
            Indicator::StochK => "stoch_k",
            Indicator::StochD => "stoch_d",
            Indicator::Roc => "roc",
            Indicator::WilliamsR => "williams_r",
            Indicator::BbUpper => "bb_upper",
            Indicator::BbMiddle => "bb_middle",
            Indicator::BbLower => "bb_lower",
            Indicator::BbWidth => "bb_width",
            Indicator::BbPercent => "bb_percent",
            Indicator::Atr => "atr",
            Indicator::Obv => "obv",
            Indicator::Vwap => "vwap",
            Indicator::VolumeSma => "volume_sma",
            Indicator::Momentum5 => "price_momentum_5",
            Indicator::Momentum10 => "price_momentum_10",
            Indicator::Momentum20 => "price_momentum_20",
            Indicator::Volatility20 => "volatility_20",
            Indicator::HigherHigh => "higher_high",
            Indicator::LowerLow => "lower_low",
            Indicator::Support => "support",
            Indicator::Resistance => "resistance",
            Indicator::TrendStrength => "trend_strength",
        }
    }
}

impl std::fmt::Display for Indicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A candle series augmented with derived indicator columns.
///
/// The candles are never modified; columns are only ever appended.
#[derive(Debug, Clone, Default)]
pub struct IndicatorFrame {
    candles: CandleSeries,
    columns: HashMap<Indicator, Series>,
}

impl IndicatorFrame {
    pub fn new(candles: CandleSeries) -> Self {
        Self { candles, columns: HashMap::new() }
    }

    /// Attach a column. Columns of the wrong length are padded or cut to fit.
    pub fn insert(&mut self, indicator: Indicator, mut column: Series) {
        column.resize(self.candles.len(), None);
        self.columns.insert(indicator, column);
    }

    /// Store the outcome of one indicator computation, absorbing failures.
    pub(crate) fn absorb(&mut self, indicator: Indicator, result: Result<Series, IndicatorError>) {
        match result {
            Ok(column) => self.insert(indicator, column),
            Err(e @ IndicatorError::InsufficientHistory { .. }) => {
                debug!(%indicator, error = %e, "indicator unavailable");
                self.insert(indicator, vec![None; self.candles.len()]);
            }
            Err(e) => {
                warn!(%indicator, error = %e, "indicator computation failed");
                self.insert(indicator, vec![None; self.candles.len()]);
            }
        }
    }

    pub fn candles(&self) -> &[Candle] {
        self.candles.candles()
    }

    pub fn series(&self) -> &CandleSeries {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn column(&self, indicator: Indicator) -> Option<&[Option<f64>]> {
        self.columns.get(&indicator).map(Vec::as_slice)
    }

    /// Value of `indicator` at row `at`; `None` when missing or out of range.
    pub fn value(&self, indicator: Indicator, at: usize) -> Option<f64> {
        self.columns
            .get(&indicator)
            .and_then(|c| c.get(at).copied().flatten())
            .filter(|v| v.is_finite())
    }

    pub fn latest(&self, indicator: Indicator) -> Option<f64> {
        self.len().checked_sub(1).and_then(|at| self.value(indicator, at))
    }

    /// View of row `at` (and its predecessor) for strategy evaluation.
    pub fn snapshot(&self, at: usize) -> Option<Snapshot<'_>> {
        (at < self.len()).then_some(Snapshot { frame: self, at })
    }

    pub fn latest_snapshot(&self) -> Option<Snapshot<'_>> {
        self.len().checked_sub(1).and_then(|at| self.snapshot(at))
    }
}

/// Indicator values at one row, with access to the prior row for crossovers.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    frame: &'a IndicatorFrame,
    at: usize,
}

impl<'a> Snapshot<'a> {
    pub fn index(&self) -> usize {
        self.at
    }

    pub fn frame(&self) -> &'a IndicatorFrame {
        self.frame
    }

    pub fn candle(&self) -> &'a Candle {
        &self.frame.candles()[self.at]
    }

    pub fn prev_candle(&self) -> Option<&'a Candle> {
        self.at.checked_sub(1).map(|i| &self.frame.candles()[i])
    }

    pub fn get(&self, indicator: Indicator) -> Option<f64> {
        self.frame.value(indicator, self.at)
    }

    pub fn prev(&self, indicator: Indicator) -> Option<f64> {
        self.at.checked_sub(1).and_then(|i| self.frame.value(indicator, i))
    }

    /// Value `back` rows before this one.
    pub fn lookback(&self, indicator: Indicator, back: usize) -> Option<f64> {
        self.at.checked_sub(back).and_then(|i| self.frame.value(indicator, i))
    }
}

/// Compute the full indicator battery over `candles`.
///
/// Groups run in order trend, momentum, volatility, volume, custom, since the
/// custom group reads the trend group's SMA.
pub fn compute_indicators(candles: &CandleSeries, config: &IndicatorConfig) -> IndicatorFrame {
    let mut frame = IndicatorFrame::new(candles.clone());
    trend::add(&mut frame, config);
    momentum::add(&mut frame, config);
    volatility::add(&mut frame, config);
    volume::add(&mut frame);
    custom::add(&mut frame);
    frame
}

#[cfg(test)]
pub(crate) mod testutil {
    use chrono::{Duration, TimeZone, Utc};
    use common::{Candle, CandleSeries};

    /// Candles from close prices with a fixed 1% high/low spread.
    pub fn series_from_closes(closes: &[f64]) -> CandleSeries {
        series_with_volume(closes, &vec![100.0; closes.len()])
    }

    pub fn series_with_volume(closes: &[f64], volumes: &[f64]) -> CandleSeries {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let candles = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&c, &v))| Candle {
                timestamp: start + Duration::minutes(15 * i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: v,
            })
            .collect();
        CandleSeries::new(candles).unwrap()
    }

    pub fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 10.0 * (i as f64 / 7.0).sin() + i as f64 * 0.05)
            .collect()
    }
}
