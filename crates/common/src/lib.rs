pub mod config;
pub mod error;
pub mod exchange;
pub mod types;

pub use config::{Config, SizingMethod};
pub use error::{Error, Result};
pub use exchange::{MarketData, OrderExecution};
pub use types::*;
