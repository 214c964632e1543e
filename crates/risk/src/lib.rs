pub mod manager;
pub mod sizing;
pub mod stats;

pub use manager::{GateDecision, PortfolioSummary, RiskConfig, RiskManager};
pub use sizing::{size_position, KellyParams, PositionSize, MAX_CAPITAL_FRACTION, MIN_POSITION_FRACTION};
pub use stats::PerformanceStats;
