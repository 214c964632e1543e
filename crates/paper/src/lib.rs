use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use common::{
    Balance, Candle, CandleSeries, Fill, MarketData, OrderErrorKind, OrderExecution, OrderOutcome, OrderSide,
};

/// Fills kept for inspection; older ones are dropped.
pub const RECENT_FILLS: usize = 100;

/// Simulated order execution for paper trading.
///
/// Fills are simulated at the latest market price with configurable slippage.
/// No real orders are ever sent to the exchange.
pub struct PaperClient {
    market: Arc<dyn MarketData>,
    /// Slippage in basis points applied to all fills.
    slippage_bps: f64,
    fills: Arc<RwLock<VecDeque<(String, OrderSide, Fill)>>>,
}

impl PaperClient {
    pub fn new(market: Arc<dyn MarketData>, slippage_bps: f64) -> Self {
        info!(slippage_bps, "PaperClient initialized");
        Self { market, slippage_bps, fills: Arc::new(RwLock::new(VecDeque::with_capacity(RECENT_FILLS))) }
    }

    /// The last `RECENT_FILLS` simulated fills, oldest first.
    pub async fn recent_fills(&self) -> Vec<(String, OrderSide, Fill)> {
        self.fills.read().await.iter().cloned().collect()
    }

    fn fill_price(&self, side: OrderSide, mid: f64) -> f64 {
        // buys pay more, sells receive less
        match side {
            OrderSide::Buy => mid * (1.0 + self.slippage_bps / 10_000.0),
            OrderSide::Sell => mid * (1.0 - self.slippage_bps / 10_000.0),
        }
    }
}

#[async_trait]
impl OrderExecution for PaperClient {
    async fn place_market_order(&self, symbol: &str, side: OrderSide, amount: f64) -> OrderOutcome {
        let Some(mid) = self.market.get_current_price(symbol).await else {
            warn!(%symbol, "PaperClient has no price, rejecting order");
            return OrderOutcome::Failed {
                kind: OrderErrorKind::Network,
                message: format!("no price available for {symbol}"),
            };
        };

        let fill = Fill {
            order_id: uuid::Uuid::new_v4().to_string(),
            filled_amount: amount,
            average_price: self.fill_price(side, mid),
        };
        debug!(%symbol, %side, mid, fill = fill.average_price, qty = amount, "Paper fill simulated");
        let mut fills = self.fills.write().await;
        if fills.len() == RECENT_FILLS {
            fills.pop_front();
        }
        fills.push_back((symbol.to_string(), side, fill.clone()));
        drop(fills);
        OrderOutcome::Filled(fill)
    }
}

/// Scripted in-memory market. Candles and prices are set by the caller;
/// a symbol with nothing set behaves like an unreachable exchange.
#[derive(Default)]
pub struct SimulatedMarket {
    candles: RwLock<HashMap<String, Vec<Candle>>>,
    prices: RwLock<HashMap<String, f64>>,
    balances: RwLock<HashMap<String, Balance>>,
}

impl SimulatedMarket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the candle history for `symbol`. The last close also becomes
    /// the current price.
    pub async fn set_candles(&self, symbol: &str, series: &CandleSeries) {
        if let Some(last) = series.last() {
            self.prices.write().await.insert(symbol.to_string(), last.close);
        }
        self.candles.write().await.insert(symbol.to_string(), series.candles().to_vec());
    }

    pub async fn set_price(&self, symbol: &str, price: f64) {
        self.prices.write().await.insert(symbol.to_string(), price);
    }

    pub async fn clear_price(&self, symbol: &str) {
        self.prices.write().await.remove(symbol);
    }

    pub async fn set_balance(&self, balance: Balance) {
        self.balances.write().await.insert(balance.currency.clone(), balance);
    }
}

#[async_trait]
impl MarketData for SimulatedMarket {
    async fn get_candles(&self, symbol: &str, _timeframe: &str, limit: usize) -> CandleSeries {
        let candles = self.candles.read().await;
        let Some(all) = candles.get(symbol) else {
            return CandleSeries::empty();
        };
        let tail = all[all.len().saturating_sub(limit)..].to_vec();
        CandleSeries::new(tail).unwrap_or_else(|_| CandleSeries::empty())
    }

    async fn get_current_price(&self, symbol: &str) -> Option<f64> {
        self.prices.read().await.get(symbol).copied()
    }

    async fn get_account_balance(&self, currency: &str) -> Option<Balance> {
        self.balances.read().await.get(currency).cloned()
    }
}
