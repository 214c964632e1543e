pub mod analysis;
pub mod backtest;
pub mod binance;
pub mod cycle;
pub mod executor;
pub mod lifecycle;

pub use analysis::{Analyzer, ModelRegistry};
pub use backtest::{BacktestReport, Backtester, EquityPoint};
pub use binance::BinanceClient;
pub use cycle::{CycleReport, TradingCycle};
pub use executor::OrderExecutor;
pub use lifecycle::{Engine, EngineHandle};
