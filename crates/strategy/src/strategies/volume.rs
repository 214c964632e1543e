use common::StrategySignal;

use crate::indicators::{Indicator, Snapshot};
use crate::signal::{fold_signals, RuleSignal};
use crate::Strategy;

pub const OBV_LOOKBACK: usize = 20;

/// OBV trend agreeing with price, and price crossing VWAP.
#[derive(Debug, Clone, Default)]
pub struct VolumeConfirmation;

impl Strategy for VolumeConfirmation {
    fn name(&self) -> &str {
        "Volume Analysis"
    }

    fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignal {
        let mut signals = Vec::new();
        let close = snap.candle().close;
        let prev_close = snap.prev_candle().map(|c| c.close);

        if let (Some(now), Some(then), Some(prev_close)) = (
            snap.get(Indicator::Obv),
            snap.lookback(Indicator::Obv, OBV_LOOKBACK - 1),
            prev_close,
        ) {
            let slope = (now - then) / OBV_LOOKBACK as f64;
            if slope > 0.0 && close > prev_close {
                signals.push(RuleSignal::buy(0.7, "rising OBV with price"));
            } else if slope < 0.0 && close < prev_close {
                signals.push(RuleSignal::sell(0.7, "falling OBV with price"));
            }
        }

        if let (Some(vwap), Some(prev_vwap), Some(prev_close)) =
            (snap.get(Indicator::Vwap), snap.prev(Indicator::Vwap), prev_close)
        {
            if close > vwap && prev_close <= prev_vwap {
                signals.push(RuleSignal::buy(0.6, "price crossed above VWAP"));
            } else if close < vwap && prev_close >= prev_vwap {
                signals.push(RuleSignal::sell(0.6, "price crossed below VWAP"));
            }
        }

        fold_signals(self.name(), &signals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::frame_with_candles;
    use common::Direction;

    fn obv_column(first: f64, last: f64) -> Vec<Option<f64>> {
        let mut col = vec![Some(first); OBV_LOOKBACK];
        col[OBV_LOOKBACK - 1] = Some(last);
        col
    }

    fn rising_closes() -> Vec<f64> {
        (0..OBV_LOOKBACK).map(|i| 100.0 + i as f64).collect()
    }

    #[test]
    fn rising_obv_and_price_buys() {
        let closes = rising_closes();
        let frame = frame_with_candles(
            &closes,
            &vec![10.0; closes.len()],
            &[(Indicator::Obv, obv_column(0.0, 500.0))],
        );
        let s = VolumeConfirmation.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.direction, Direction::Buy);
        assert!((s.strength - 0.7).abs() < 1e-12);
    }

    #[test]
    fn obv_against_price_is_silent() {
        let closes = rising_closes();
        let frame = frame_with_candles(
            &closes,
            &vec![10.0; closes.len()],
            &[(Indicator::Obv, obv_column(500.0, 0.0))],
        );
        let s = VolumeConfirmation.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.strength, 0.0);
    }

    #[test]
    fn vwap_cross_down_sells() {
        let frame = frame_with_candles(
            &[101.0, 98.0],
            &[10.0, 10.0],
            &[(Indicator::Vwap, vec![Some(100.0), Some(100.0)])],
        );
        let s = VolumeConfirmation.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.direction, Direction::Sell);
        assert!((s.strength - 0.6).abs() < 1e-12);
    }

    #[test]
    fn first_row_has_no_signal() {
        let frame = frame_with_candles(&[101.0], &[10.0], &[(Indicator::Vwap, vec![Some(100.0)])]);
        let s = VolumeConfirmation.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.strength, 0.0);
    }
}
