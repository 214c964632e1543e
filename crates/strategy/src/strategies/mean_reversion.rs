use common::StrategySignal;

use crate::config::RsiParams;
use crate::indicators::{Indicator, Snapshot};
use crate::signal::{fold_signals, RuleSignal};
use crate::Strategy;

/// Bets on a return to the mean after Bollinger, RSI, stochastic or
/// Williams %R extremes.
#[derive(Debug, Clone)]
pub struct MeanReversion {
    overbought: f64,
    oversold: f64,
}

impl MeanReversion {
    pub fn new(rsi: &RsiParams) -> Self {
        Self { overbought: rsi.overbought, oversold: rsi.oversold }
    }
}

impl Default for MeanReversion {
    fn default() -> Self {
        Self::new(&RsiParams::default())
    }
}

impl Strategy for MeanReversion {
    fn name(&self) -> &str {
        "Mean Reversion"
    }

    fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignal {
        let mut signals = Vec::new();
        let close = snap.candle().close;

        if let (Some(upper), Some(lower)) = (snap.get(Indicator::BbUpper), snap.get(Indicator::BbLower)) {
            if close < lower && lower > 0.0 {
                let beyond = (lower - close) / lower;
                signals.push(RuleSignal::buy((0.5 + beyond).min(0.9), "price below lower Bollinger band"));
            } else if close > upper && upper > 0.0 {
                let beyond = (close - upper) / upper;
                signals.push(RuleSignal::sell((0.5 + beyond).min(0.9), "price above upper Bollinger band"));
            }
        }

        if let Some(rsi) = snap.get(Indicator::Rsi) {
            if rsi < self.oversold {
                signals.push(RuleSignal::buy(0.8, "RSI oversold"));
            } else if rsi > self.overbought {
                signals.push(RuleSignal::sell(0.8, "RSI overbought"));
            }
        }

        if let (Some(k), Some(d)) = (snap.get(Indicator::StochK), snap.get(Indicator::StochD)) {
            if k < 20.0 && d < 20.0 {
                signals.push(RuleSignal::buy(0.7, "stochastic oversold"));
            } else if k > 80.0 && d > 80.0 {
                signals.push(RuleSignal::sell(0.7, "stochastic overbought"));
            }
        }

        if let Some(wr) = snap.get(Indicator::WilliamsR) {
            if wr < -80.0 {
                signals.push(RuleSignal::buy(0.6, "Williams %R oversold"));
            } else if wr > -20.0 {
                signals.push(RuleSignal::sell(0.6, "Williams %R overbought"));
            }
        }

        fold_signals(self.name(), &signals)
    }
}
