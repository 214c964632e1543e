use common::Candle;

use super::math::{self, lift};
use super::trend::true_range;
use super::{Indicator, IndicatorError, IndicatorFrame, Series};
use crate::config::{BollingerParams, IndicatorConfig};

pub const ATR_PERIOD: usize = 14;

pub(crate) fn add(frame: &mut IndicatorFrame, config: &IndicatorConfig) {
    let closes = lift(&frame.series().closes());

    match bollinger(&closes, &config.bollinger) {
        Ok(bb) => {
            frame.insert(Indicator::BbUpper, bb.upper);
            frame.insert(Indicator::BbMiddle, bb.middle);
            frame.insert(Indicator::BbLower, bb.lower);
            frame.insert(Indicator::BbWidth, bb.width);
            frame.insert(Indicator::BbPercent, bb.percent);
        }
        Err(e) => {
            for ind in [
                Indicator::BbUpper,
                Indicator::BbMiddle,
                Indicator::BbLower,
                Indicator::BbWidth,
                Indicator::BbPercent,
            ] {
                frame.absorb(ind, Err(e.clone()));
            }
        }
    }

    frame.absorb(Indicator::Atr, atr(frame.candles(), ATR_PERIOD));
}

#[derive(Debug, Clone)]
pub struct BollingerColumns {
    pub upper: Series,
    pub middle: Series,
    pub lower: Series,
    /// Band width as a percentage of the middle band.
    pub width: Series,
    /// Position of the close inside the band (0 = lower, 1 = upper).
    pub percent: Series,
}

/// Bollinger Bands: SMA ± k × population standard deviation.
pub fn bollinger(
    closes: &[Option<f64>],
    params: &BollingerParams,
) -> Result<BollingerColumns, IndicatorError> {
    let middle = math::sma(closes, params.period)?;
    let std = math::rolling(closes, params.period, math::population_std)?;

    let n = closes.len();
    let mut out = BollingerColumns {
        upper: Vec::with_capacity(n),
        middle: middle.clone(),
        lower: Vec::with_capacity(n),
        width: Vec::with_capacity(n),
        percent: Vec::with_capacity(n),
    };

    for i in 0..n {
        let (Some(m), Some(s), Some(c)) = (middle[i], std[i], closes[i]) else {
            out.upper.push(None);
            out.lower.push(None);
            out.width.push(None);
            out.percent.push(None);
            continue;
        };
        let upper = m + params.std_dev * s;
        let lower = m - params.std_dev * s;
        out.upper.push(Some(upper));
        out.lower.push(Some(lower));
        out.width.push((m != 0.0).then(|| (upper - lower) / m * 100.0));
        out.percent.push((upper > lower).then(|| (c - lower) / (upper - lower)));
    }
    Ok(out)
}

/// Average True Range with Wilder smoothing.
pub fn atr(candles: &[Candle], period: usize) -> Result<Series, IndicatorError> {
    math::check(candles.len(), period)?;
    let tr: Series = candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            Some(match i.checked_sub(1) {
                Some(p) => true_range(c, candles[p].close),
                None => c.high - c.low,
            })
        })
        .collect();
    math::wilder(&tr, period)
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;

    #[test]
    fn bands_bracket_the_middle() {
        let closes = lift(&wave(50));
        let bb = bollinger(&closes, &BollingerParams::default()).unwrap();
        for i in 19..50 {
            let (u, m, l) = (bb.upper[i].unwrap(), bb.middle[i].unwrap(), bb.lower[i].unwrap());
            assert!(u > m && m > l);
            let expected_width = (u - l) / m * 100.0;
            assert!((bb.width[i].unwrap() - expected_width).abs() < 1e-9);
        }
        assert!(bb.upper[18].is_none());
    }

    #[test]
    fn percent_b_is_half_at_the_mean() {
        // the last close equals the window mean
        let closes = lift(&[1.0, 5.0, 2.0, 4.0, 3.0]);
        let bb = bollinger(&closes, &BollingerParams { period: 5, std_dev: 2.0 }).unwrap();
        assert!((bb.percent[4].unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn flat_prices_have_no_percent_b() {
        let bb = bollinger(&lift(&[10.0; 25]), &BollingerParams::default()).unwrap();
        assert_eq!(bb.width[24], Some(0.0));
        assert_eq!(bb.percent[24], None);
    }

    #[test]
    fn atr_of_constant_spread() {
        // high-low = 2% of a flat 100 close
        let series = series_from_closes(&[100.0; 20]);
        let a = atr(series.candles(), ATR_PERIOD).unwrap();
        assert!((a[19].unwrap() - 2.0).abs() < 1e-9);
        assert!(a[12].is_none());
    }
}
