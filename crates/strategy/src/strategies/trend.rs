use common::StrategySignal;

use crate::indicators::{Indicator, Snapshot};
use crate::signal::{fold_signals, RuleSignal};
use crate::Strategy;

pub const ADX_STRONG_TREND: f64 = 25.0;

/// EMA 9/21 and MACD crossovers, confirmed by ADX trend strength.
#[derive(Debug, Clone, Default)]
pub struct TrendFollowing;

impl Strategy for TrendFollowing {
    fn name(&self) -> &str {
        "Trend Following"
    }

    fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignal {
        let mut signals = Vec::new();

        match crossover(snap, Indicator::Ema9, Indicator::Ema21) {
            Some(Cross::Up) => signals.push(RuleSignal::buy(0.8, "EMA 9/21 golden cross")),
            Some(Cross::Down) => signals.push(RuleSignal::sell(0.8, "EMA 9/21 death cross")),
            None => {}
        }

        match crossover(snap, Indicator::Macd, Indicator::MacdSignal) {
            Some(Cross::Up) => signals.push(RuleSignal::buy(0.7, "MACD bullish crossover")),
            Some(Cross::Down) => signals.push(RuleSignal::sell(0.7, "MACD bearish crossover")),
            None => {}
        }

        if let (Some(adx), Some(pos), Some(neg)) = (
            snap.get(Indicator::Adx),
            snap.get(Indicator::AdxPos),
            snap.get(Indicator::AdxNeg),
        ) {
            if adx > ADX_STRONG_TREND {
                if pos > neg {
                    signals.push(RuleSignal::buy(0.6, "strong uptrend (ADX)"));
                } else {
                    signals.push(RuleSignal::sell(0.6, "strong downtrend (ADX)"));
                }
            }
        }

        fold_signals(self.name(), &signals)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cross {
    Up,
    Down,
}

/// Whether `fast` crossed `slow` between the previous row and this one.
pub(crate) fn crossover(snap: &Snapshot<'_>, fast: Indicator, slow: Indicator) -> Option<Cross> {
    let (f, s) = (snap.get(fast)?, snap.get(slow)?);
    let (pf, ps) = (snap.prev(fast)?, snap.prev(slow)?);
    if f > s && pf <= ps {
        Some(Cross::Up)
    } else if f < s && pf >= ps {
        Some(Cross::Down)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::testutil::frame_with;
    use common::Direction;

    #[test]
    fn golden_cross_with_strong_uptrend_buys() {
        let frame = frame_with(
            2,
            &[
                (Indicator::Ema9, vec![Some(99.0), Some(101.0)]),
                (Indicator::Ema21, vec![Some(100.0), Some(100.0)]),
                (Indicator::Adx, vec![None, Some(30.0)]),
                (Indicator::AdxPos, vec![None, Some(28.0)]),
                (Indicator::AdxNeg, vec![None, Some(12.0)]),
            ],
        );
        let s = TrendFollowing.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.direction, Direction::Buy);
        // (0.8 + 0.6) / 2
        assert!((s.strength - 0.7).abs() < 1e-12);
        assert_eq!(s.reasons.len(), 2);
    }

    #[test]
    fn death_cross_against_adx_uptrend_is_conflicting() {
        let frame = frame_with(
            2,
            &[
                (Indicator::Ema9, vec![Some(101.0), Some(99.0)]),
                (Indicator::Ema21, vec![Some(100.0), Some(100.0)]),
                (Indicator::Adx, vec![None, Some(40.0)]),
                (Indicator::AdxPos, vec![None, Some(30.0)]),
                (Indicator::AdxNeg, vec![None, Some(10.0)]),
            ],
        );
        let s = TrendFollowing.evaluate(&frame.latest_snapshot().unwrap());
        // sell 0.4 vs buy 0.3
        assert_eq!(s.direction, Direction::Hold);
        assert!((s.strength - 0.9).abs() < 1e-12);
    }

    #[test]
    fn missing_indicators_mean_no_signal() {
        let frame = frame_with(2, &[]);
        let s = TrendFollowing.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.direction, Direction::Hold);
        assert_eq!(s.strength, 0.0);
    }

    #[test]
    fn weak_adx_is_ignored() {
        let frame = frame_with(
            1,
            &[
                (Indicator::Adx, vec![Some(20.0)]),
                (Indicator::AdxPos, vec![Some(30.0)]),
                (Indicator::AdxNeg, vec![Some(10.0)]),
            ],
        );
        let s = TrendFollowing.evaluate(&frame.latest_snapshot().unwrap());
        assert_eq!(s.strength, 0.0);
    }
}
