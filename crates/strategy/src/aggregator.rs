use serde::{Deserialize, Serialize};

use common::{Decision, DecisionComponents, Direction, Prediction, SignalKind, StrategySignal};

use crate::signal::DECISION_MARGIN;
use crate::strategies::StrategySignals;

/// Fixed per-source weights of the final decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatorWeights {
    pub trend: f64,
    pub mean_reversion: f64,
    pub breakout: f64,
    pub volume: f64,
    pub predictor: f64,
    pub margin: f64,
}

impl Default for AggregatorWeights {
    fn default() -> Self {
        Self {
            trend: 0.3,
            mean_reversion: 0.25,
            breakout: 0.25,
            volume: 0.2,
            predictor: 0.4,
            margin: DECISION_MARGIN,
        }
    }
}

/// Fuses the strategy outputs and the predictor estimate into one decision.
///
/// Pure and order-independent: identical inputs give identical decisions,
/// which is what keeps backtests and live runs in step.
#[derive(Debug, Clone, Default)]
pub struct SignalAggregator {
    weights: AggregatorWeights,
}

impl SignalAggregator {
    pub fn new(weights: AggregatorWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &AggregatorWeights {
        &self.weights
    }

    pub fn aggregate(&self, signals: StrategySignals, prediction: Prediction) -> Decision {
        let w = &self.weights;
        let mut buy = 0.0;
        let mut sell = 0.0;

        let mut add = |signal: &StrategySignal, weight: f64| match signal.direction {
            Direction::Buy => buy += signal.strength * weight,
            Direction::Sell => sell += signal.strength * weight,
            Direction::Hold => {}
        };
        add(&signals.trend, w.trend);
        add(&signals.mean_reversion, w.mean_reversion);
        add(&signals.breakout, w.breakout);
        add(&signals.volume, w.volume);

        let p = prediction.probability;
        let predictor_term = 2.0 * (p - 0.5).abs() * prediction.confidence * w.predictor;
        if p > 0.5 {
            buy += predictor_term;
        } else {
            sell += predictor_term;
        }

        let (signal, confidence) = if buy > sell + w.margin {
            (SignalKind::Buy, buy)
        } else if sell > buy + w.margin {
            (SignalKind::Sell, sell)
        } else {
            (SignalKind::Hold, 1.0 - (buy - sell).abs())
        };

        Decision {
            signal,
            confidence: confidence.clamp(0.0, 1.0),
            buy_score: buy,
            sell_score: sell,
            components: Some(DecisionComponents {
                trend: signals.trend,
                mean_reversion: signals.mean_reversion,
                breakout: signals.breakout,
                volume: signals.volume,
                prediction,
            }),
        }
    }
}
