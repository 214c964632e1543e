pub mod aggregator;
pub mod config;
pub mod indicators;
pub mod signal;
pub mod strategies;

pub use aggregator::{AggregatorWeights, SignalAggregator};
pub use config::IndicatorConfig;
pub use indicators::{compute_indicators, Indicator, IndicatorFrame, Snapshot, WARMUP_CANDLES};
pub use signal::{fold_signals, RuleSignal};
pub use strategies::{StrategySignals, StrategySuite};

use common::StrategySignal;

/// All strategy implementations must satisfy this trait.
///
/// Evaluation is a pure function of the snapshot. Missing indicator values
/// mean "no signal from this rule", never an error.
pub trait Strategy: Send + Sync {
    /// Human-readable name, also stamped on the produced signal.
    fn name(&self) -> &str;

    /// Evaluate the row the snapshot points at.
    fn evaluate(&self, snap: &Snapshot<'_>) -> StrategySignal;
}
