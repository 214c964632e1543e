use async_trait::async_trait;

use crate::{Balance, CandleSeries, OrderOutcome, OrderSide};

/// Read side of the exchange connection.
///
/// Implementations retry transient failures a bounded number of times and
/// then report absence: an empty series or `None`. Nothing here returns an
/// error to the trading core.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Most recent `limit` candles for `symbol` at `timeframe` (e.g. "15m"), oldest first.
    async fn get_candles(&self, symbol: &str, timeframe: &str, limit: usize) -> CandleSeries;

    /// Last traded price.
    async fn get_current_price(&self, symbol: &str) -> Option<f64>;

    async fn get_account_balance(&self, currency: &str) -> Option<Balance>;
}

/// Write side of the exchange connection.
///
/// `BinanceClient` implements this for live trading.
/// `PaperClient` implements this for simulation.
///
/// Only `OrderExecutor` in `crates/engine` should hold a reference to a
/// `dyn OrderExecution`. Entries reach it only after the risk gate passed.
#[async_trait]
pub trait OrderExecution: Send + Sync {
    /// Place a market order for `amount` units of the base asset.
    async fn place_market_order(&self, symbol: &str, side: OrderSide, amount: f64) -> OrderOutcome;
}
