use common::StrategySignal;

use crate::indicators::{Indicator, Snapshot};
use crate::signal::{fold_signals, RuleSignal};
use crate::Strategy;

/// Volume must reach this multiple of its 20-period average to confirm.
pub const VOLUME_SPIKE_RATIO: f64 = 1.5;
pub const MOMENTUM_THRESHOLD: f64 = 0.03;

/// Breaks of the prior 20-candle range, and sharp 5-candle moves, both
/// confirmed by a volume spike.
#[derive(Debug, Clone, Default)]
pub struct Breakout;

impl Strategy for Breakout {
    fn name(&self) -> &str {
        "Breakout"
    }

    fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignal {
        let mut signals = Vec::new();
        let candle = snap.candle();

        let volume_spike = snap
            .get(Indicator::VolumeSma)
            .is_some_and(|avg| avg > 0.0 && candle.volume >= avg * VOLUME_SPIKE_RATIO);
        if !volume_spike {
            return fold_signals(self.name(), &signals);
        }

        // The range ending on the previous candle; the current candle's own
        // high/low cannot be broken by its close.
        let resistance = snap.prev(Indicator::Resistance);
        let support = snap.prev(Indicator::Support);
        if resistance.is_some_and(|r| candle.close > r) {
            signals.push(RuleSignal::buy(0.9, "resistance breakout with volume"));
        } else if support.is_some_and(|s| candle.close < s) {
            signals.push(RuleSignal::sell(0.9, "support breakdown with volume"));
        }

        if let Some(m) = snap.get(Indicator::Momentum5) {
            if m > MOMENTUM_THRESHOLD {
                signals.push(RuleSignal::buy(0.7, "strong upward momentum"));
            } else if m < -MOMENTUM_THRESHOLD {
                signals.push(RuleSignal::sell(0.7, "strong downward momentum"));
            }
        }

        fold_signals(self.name(), &signals)
    }
}
