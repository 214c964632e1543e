use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use common::{
    ClosedTrade, Config, Decision, Error, MarketData, OrderOutcome, PositionSnapshot, Result,
};
use risk::{PortfolioSummary, PositionSize, RiskConfig, RiskManager};

use crate::analysis::{Analyzer, ModelRegistry};
use crate::executor::OrderExecutor;

/// Candles fetched on the primary timeframe for each decision.
pub const PRIMARY_CANDLE_LIMIT: usize = 500;
/// Candles fetched on the training timeframe when a model is (re)trained.
pub const TRAINING_CANDLE_LIMIT: usize = 1000;

/// What one pass did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub closed: Vec<ClosedTrade>,
    pub opened: Vec<PositionSnapshot>,
    /// Symbols whose analysis was abandoned this pass.
    pub skipped: Vec<String>,
    pub summary: PortfolioSummary,
}

/// One discrete trading pass: monitor exits, look for entries, summarize.
///
/// The cycle owns the only mutable path into the [`RiskManager`]; everyone
/// else gets the shared lock through [`TradingCycle::risk`] and reads.
pub struct TradingCycle {
    pairs: Vec<String>,
    primary_timeframe: String,
    training_timeframe: String,
    market: Arc<dyn MarketData>,
    executor: OrderExecutor,
    analyzer: Analyzer,
    models: ModelRegistry,
    risk: Arc<RwLock<RiskManager>>,
}

impl TradingCycle {
    pub fn new(
        config: &Config,
        market: Arc<dyn MarketData>,
        executor: OrderExecutor,
        analyzer: Analyzer,
        models: ModelRegistry,
    ) -> Self {
        Self {
            pairs: config.trading_pairs.clone(),
            primary_timeframe: config.primary_timeframe.clone(),
            training_timeframe: config.training_timeframe.clone(),
            market,
            executor,
            analyzer,
            models,
            risk: Arc::new(RwLock::new(RiskManager::new(RiskConfig::from_config(config)))),
        }
    }

    pub fn risk(&self) -> Arc<RwLock<RiskManager>> {
        self.risk.clone()
    }

    pub async fn run_once(&mut self) -> CycleReport {
        let now = Utc::now();
        info!(pairs = self.pairs.len(), mode = %self.executor.mode(), "Trading cycle started");

        let closed = self.monitor_positions(now).await;

        let mut opened = Vec::new();
        let mut skipped = Vec::new();
        for symbol in self.pairs.clone() {
            if self.risk.read().await.has_position(&symbol) {
                debug!(%symbol, "Position already open, skipping analysis");
                continue;
            }
            match self.analyze_symbol(&symbol, now).await {
                Ok(Some(position)) => opened.push(position),
                Ok(None) => {}
                Err(e) => {
                    warn!(%symbol, error = %e, "Symbol skipped this cycle");
                    skipped.push(symbol);
                }
            }
        }

        let summary = self.risk.read().await.portfolio_summary();
        info!(
            open = summary.open_positions,
            unrealized_pnl = summary.unrealized_pnl,
            daily_pnl = summary.daily_pnl,
            risk_score = summary.risk_score,
            equity = summary.equity,
            "Trading cycle complete"
        );
        CycleReport { closed, opened, skipped, summary }
    }

    /// Refresh every open position and close the ones whose exit fired.
    /// A failed closing order leaves the position open for the next pass.
    async fn monitor_positions(&mut self, now: DateTime<Utc>) -> Vec<ClosedTrade> {
        let open: Vec<(String, String)> = self
            .risk
            .read()
            .await
            .positions()
            .map(|p| (p.id().to_string(), p.symbol().to_string()))
            .collect();

        let mut closed = Vec::new();
        for (id, symbol) in open {
            let Some(price) = self.market.get_current_price(&symbol).await else {
                warn!(%symbol, %id, "No price for open position, monitoring skipped");
                continue;
            };

            let exit = {
                let mut risk = self.risk.write().await;
                risk.update_position_pnl(&id, price).and_then(|_| risk.check_exit(&id, price, now))
            };
            let reason = match exit {
                Ok(Some(reason)) => reason,
                Ok(None) => continue,
                Err(e) => {
                    error!(%id, error = %e, "Exit check failed");
                    continue;
                }
            };

            let Some(position) = self.risk.read().await.position(&id).cloned() else {
                continue;
            };
            info!(%symbol, %id, %reason, price, "Exit triggered");

            match self.executor.close(&position).await {
                OrderOutcome::Filled(fill) => {
                    match self.risk.write().await.close_position(&id, fill.average_price, reason, now) {
                        Ok(trade) => closed.push(trade),
                        Err(e) => error!(%id, error = %e, "Closing fill could not be recorded"),
                    }
                }
                OrderOutcome::Failed { kind, message } => {
                    warn!(%symbol, %id, %kind, error = %message, "Closing order failed, will retry next cycle");
                }
            }
        }
        closed
    }

    async fn analyze_symbol(&mut self, symbol: &str, now: DateTime<Utc>) -> Result<Option<PositionSnapshot>> {
        self.prepare_model(symbol, now).await;

        let candles = self.market.get_candles(symbol, &self.primary_timeframe, PRIMARY_CANDLE_LIMIT).await;
        let Some(last_close) = candles.last().map(|c| c.close) else {
            return Err(Error::Exchange(format!("no {} candles for {symbol}", self.primary_timeframe)));
        };

        let frame = self.analyzer.frame(&candles);
        let decision = self.analyzer.decide_latest(&frame, self.models.get(symbol))?;
        info!(
            %symbol,
            signal = %decision.signal,
            confidence = decision.confidence,
            "Analysis complete"
        );

        let price = self.market.get_current_price(symbol).await.unwrap_or(last_close);
        self.try_enter(symbol, &decision, price, now).await
    }

    /// Make sure `symbol` has a fresh model: reuse the stored one when it is
    /// young enough, otherwise train on the training timeframe. Failures
    /// leave the symbol on the neutral prediction.
    async fn prepare_model(&mut self, symbol: &str, now: DateTime<Utc>) {
        if !self.models.needs_training(symbol, now) {
            return;
        }
        if self.models.ensure_loaded(symbol) && !self.models.needs_training(symbol, now) {
            return;
        }

        let candles = self.market.get_candles(symbol, &self.training_timeframe, TRAINING_CANDLE_LIMIT).await;
        if candles.is_empty() {
            warn!(%symbol, timeframe = %self.training_timeframe, "No training candles, predictor stays neutral");
            return;
        }
        let frame = self.analyzer.frame(&candles);
        if let Err(e) = self.models.train(symbol, &frame, now) {
            warn!(%symbol, error = %e, "Model training failed, predictor stays neutral");
        }
    }

    /// Gate, size and place an entry for `decision`. No position is recorded
    /// unless the order fills.
    pub(crate) async fn try_enter(
        &mut self,
        symbol: &str,
        decision: &Decision,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Option<PositionSnapshot>> {
        let gate = self.risk.write().await.should_enter_trade(decision, now);
        if !gate.can_trade {
            return Ok(None);
        }
        let Some(side) = decision.signal.side() else {
            return Ok(None);
        };
        let Some(size) = self.risk.read().await.size_position(side, price, decision.confidence) else {
            info!(%symbol, price, confidence = decision.confidence, "Position too small, entry skipped");
            return Ok(None);
        };

        match self.executor.open(symbol, side, size.quantity).await {
            OrderOutcome::Filled(fill) => {
                let filled = PositionSize { quantity: fill.filled_amount, ..size };
                let position = self.risk.write().await.open_position(symbol, side, fill.average_price, &filled, now)?;
                Ok(Some(position.snapshot()))
            }
            OrderOutcome::Failed { kind, message } => {
                warn!(%symbol, %kind, error = %message, "Entry order failed, no position opened");
                Ok(None)
            }
        }
    }
}
