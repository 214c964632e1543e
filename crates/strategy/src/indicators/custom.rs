use super::math::{self, lift, zip_with};
use super::{Indicator, IndicatorError, IndicatorFrame, Series};

pub const SUPPORT_RESISTANCE_WINDOW: usize = 20;
pub const VOLATILITY_WINDOW: usize = 20;

pub(crate) fn add(frame: &mut IndicatorFrame) {
    let closes = frame.series().closes();

    for (indicator, lag) in [
        (Indicator::Momentum5, 5),
        (Indicator::Momentum10, 10),
        (Indicator::Momentum20, 20),
    ] {
        frame.absorb(indicator, math::pct_change(&closes, lag));
    }

    frame.absorb(Indicator::Volatility20, volatility(&closes, VOLATILITY_WINDOW));

    let (higher_high, lower_low) = extremes(frame);
    frame.absorb(Indicator::HigherHigh, higher_high);
    frame.absorb(Indicator::LowerLow, lower_low);

    let highs = lift(&frame.candles().iter().map(|c| c.high).collect::<Vec<_>>());
    let lows = lift(&frame.candles().iter().map(|c| c.low).collect::<Vec<_>>());
    frame.absorb(Indicator::Support, math::rolling_min(&lows, SUPPORT_RESISTANCE_WINDOW));
    frame.absorb(Indicator::Resistance, math::rolling_max(&highs, SUPPORT_RESISTANCE_WINDOW));

    let strength = frame
        .column(Indicator::Sma20)
        .map(|sma| trend_strength(&lift(&closes), sma))
        .ok_or(IndicatorError::InsufficientHistory { needed: 20, available: closes.len() });
    frame.absorb(Indicator::TrendStrength, strength);
}

/// Sample standard deviation of one-step returns over `window` rows.
pub fn volatility(closes: &[f64], window: usize) -> Result<Series, IndicatorError> {
    let returns = math::pct_change(closes, 1)?;
    math::rolling(&returns, window, math::sample_std)
}

/// `|close − sma| / sma × 100`.
pub fn trend_strength(closes: &[Option<f64>], sma: &[Option<f64>]) -> Series {
    zip_with(closes, sma, |c, s| (s != 0.0).then(|| (c - s).abs() / s * 100.0))
}

/// 1/0 flags for a high above the previous high and a low below the previous low.
fn extremes(frame: &IndicatorFrame) -> (Result<Series, IndicatorError>, Result<Series, IndicatorError>) {
    let candles = frame.candles();
    if candles.len() < 2 {
        let e = IndicatorError::InsufficientHistory { needed: 2, available: candles.len() };
        return (Err(e.clone()), Err(e));
    }
    let flag = |b: bool| Some(if b { 1.0 } else { 0.0 });
    let mut hh = vec![None];
    let mut ll = vec![None];
    for w in candles.windows(2) {
        hh.push(flag(w[1].high > w[0].high));
        ll.push(flag(w[1].low < w[0].low));
    }
    (Ok(hh), Ok(ll))
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::super::{compute_indicators, Indicator};
    use super::*;
    use crate::IndicatorConfig;

    #[test]
    fn momentum_is_fractional_change() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let frame = compute_indicators(&series_from_closes(&closes), &IndicatorConfig::default());
        let m5 = frame.latest(Indicator::Momentum5).unwrap();
        assert!((m5 - (129.0 / 124.0 - 1.0)).abs() < 1e-12);
        assert!(frame.value(Indicator::Momentum20, 19).is_none());
    }

    #[test]
    fn trend_strength_measures_distance_from_sma() {
        let s = trend_strength(&[Some(110.0), Some(90.0)], &[Some(100.0), Some(100.0)]);
        assert_eq!(s, vec![Some(10.0), Some(10.0)]);
    }

    #[test]
    fn support_and_resistance_include_current_row() {
        let closes: Vec<f64> = (0..25).map(|i| 100.0 + i as f64).collect();
        let frame = compute_indicators(&series_from_closes(&closes), &IndicatorConfig::default());
        let last = frame.candles()[24];
        assert_eq!(frame.latest(Indicator::Resistance), Some(last.high));
        assert_eq!(frame.latest(Indicator::Support), Some(frame.candles()[5].low));
    }

    #[test]
    fn flags_mark_new_extremes() {
        let frame = compute_indicators(&series_from_closes(&[10.0, 11.0, 9.0]), &IndicatorConfig::default());
        assert_eq!(frame.value(Indicator::HigherHigh, 1), Some(1.0));
        assert_eq!(frame.value(Indicator::LowerLow, 1), Some(0.0));
        assert_eq!(frame.value(Indicator::LowerLow, 2), Some(1.0));
        assert_eq!(frame.value(Indicator::HigherHigh, 0), None);
    }
}
