use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{
    ClosedTrade, Config, Decision, Error, ExitReason, OrderSide, Position, PositionSnapshot, RejectionReason, Result,
    SignalKind, SizingMethod,
};

use crate::sizing::{size_position, KellyParams, PositionSize};
use crate::stats::PerformanceStats;

/// Risk limits and sizing parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub initial_capital: f64,
    /// Realized loss for the day at which new entries stop.
    pub max_daily_loss: f64,
    pub max_open_positions: usize,
    /// Share of capital that may be lost on one stopped-out position.
    pub max_portfolio_risk: f64,
    pub confidence_threshold: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub position_size_pct: f64,
    pub sizing_method: SizingMethod,
    pub max_holding_hours: i64,
    pub kelly: KellyParams,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl RiskConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            initial_capital: config.initial_capital,
            max_daily_loss: config.max_daily_loss,
            max_open_positions: config.max_open_positions,
            max_portfolio_risk: config.max_portfolio_risk,
            confidence_threshold: config.prediction_confidence_threshold,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            position_size_pct: config.position_size_pct,
            sizing_method: config.sizing_method,
            max_holding_hours: config.max_holding_hours,
            kelly: KellyParams::default(),
        }
    }
}

/// Outcome of the entry gate. Every failing check is listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub can_trade: bool,
    pub reasons: Vec<RejectionReason>,
    pub daily_pnl: f64,
    pub open_positions: usize,
    pub risk_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub open_positions: usize,
    /// Market value of open positions at their last mark.
    pub total_value: f64,
    pub unrealized_pnl: f64,
    pub daily_pnl: f64,
    pub total_trades: usize,
    pub risk_score: f64,
    pub available_capital: f64,
    pub equity: f64,
}

/// Owns capital, open positions and trade history.
///
/// Capital is debited by a position's notional when it opens and credited
/// with notional plus realized P&L when it closes, so
/// `capital + Σ notional + Σ unrealized` is always the account equity.
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: RiskConfig,
    capital: f64,
    daily_pnl: f64,
    last_reset: Option<NaiveDate>,
    positions: BTreeMap<String, Position>,
    history: Vec<ClosedTrade>,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            capital: config.initial_capital,
            config,
            daily_pnl: 0.0,
            last_reset: None,
            positions: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Reset daily metrics when `now` falls on a later local calendar date.
    fn roll_day(&mut self, now: DateTime<Utc>) {
        let today = now.with_timezone(&Local).date_naive();
        match self.last_reset {
            Some(day) if day == today => {}
            Some(_) => {
                info!(previous_daily_pnl = self.daily_pnl, date = %today, "Daily metrics reset");
                self.daily_pnl = 0.0;
                self.last_reset = Some(today);
            }
            None => self.last_reset = Some(today),
        }
    }

    // ── Entry ───────────────────────────────────────────────────────────────

    pub fn should_enter_trade(&mut self, decision: &Decision, now: DateTime<Utc>) -> GateDecision {
        self.roll_day(now);
        let mut reasons = Vec::new();

        if self.daily_pnl < 0.0 && -self.daily_pnl >= self.config.max_daily_loss {
            reasons.push(RejectionReason::DailyLossLimit { daily_pnl: self.daily_pnl, limit: self.config.max_daily_loss });
        }
        if self.positions.len() >= self.config.max_open_positions {
            reasons.push(RejectionReason::MaxOpenPositions {
                open: self.positions.len(),
                max: self.config.max_open_positions,
            });
        }
        if decision.signal == SignalKind::Hold {
            reasons.push(RejectionReason::HoldSignal);
        }
        if decision.confidence < self.config.confidence_threshold {
            reasons.push(RejectionReason::LowConfidence {
                confidence: decision.confidence,
                threshold: self.config.confidence_threshold,
            });
        }

        for reason in &reasons {
            warn!(reason = %reason, "Trade blocked");
        }
        GateDecision {
            can_trade: reasons.is_empty(),
            reasons,
            daily_pnl: self.daily_pnl,
            open_positions: self.positions.len(),
            risk_score: self.risk_score(),
        }
    }

    pub fn size_position(&self, side: OrderSide, price: f64, confidence: f64) -> Option<PositionSize> {
        size_position(&self.config, self.capital, side, price, confidence)
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.values().any(|p| p.symbol() == symbol)
    }

    /// Record a filled entry. `size.quantity` is the filled amount and
    /// `entry_price` the fill price.
    pub fn open_position(
        &mut self,
        symbol: &str,
        side: OrderSide,
        entry_price: f64,
        size: &PositionSize,
        now: DateTime<Utc>,
    ) -> Result<Position> {
        if self.has_position(symbol) {
            return Err(Error::DuplicatePosition(symbol.to_string()));
        }
        let mut micros = now.timestamp_micros();
        let mut id = format!("{symbol}_{micros}");
        while self.positions.contains_key(&id) {
            micros += 1;
            id = format!("{symbol}_{micros}");
        }

        let position = Position::open(
            id.clone(),
            symbol,
            side,
            entry_price,
            size.quantity,
            size.stop_loss,
            size.take_profit,
            now,
        )?;
        let notional = position.notional();
        if notional > self.capital {
            return Err(Error::Other(format!(
                "insufficient capital for {symbol}: need {notional:.2}, have {:.2}",
                self.capital
            )));
        }

        self.capital -= notional;
        info!(
            %symbol,
            side = %side,
            entry_price,
            quantity = size.quantity,
            stop_loss = size.stop_loss,
            take_profit = size.take_profit,
            capital = self.capital,
            "Opened position"
        );
        self.positions.insert(id, position.clone());
        Ok(position)
    }

    // ── Monitoring ──────────────────────────────────────────────────────────

    /// Mark a position to `price` and return its running P&L.
    pub fn update_position_pnl(&mut self, id: &str, price: f64) -> Result<f64> {
        let position = self.positions.get_mut(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        position.mark(price);
        Ok(position.pnl())
    }

    /// The highest-priority exit condition met at `price`, if any.
    pub fn check_exit(&self, id: &str, price: f64, now: DateTime<Utc>) -> Result<Option<ExitReason>> {
        let position = self.positions.get(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        let (stopped, target) = match position.side() {
            OrderSide::Buy => (price <= position.stop_loss(), price >= position.take_profit()),
            OrderSide::Sell => (price >= position.stop_loss(), price <= position.take_profit()),
        };
        let held = now.signed_duration_since(position.entry_time());

        Ok(if stopped {
            Some(ExitReason::StopLoss)
        } else if target {
            Some(ExitReason::TakeProfit)
        } else if held > chrono::Duration::hours(self.config.max_holding_hours) {
            Some(ExitReason::TimeLimit)
        } else if position.exit_requested() {
            Some(ExitReason::Manual)
        } else {
            None
        })
    }

    /// Flag a position for exit on the next monitoring pass.
    pub fn request_exit(&mut self, id: &str) -> Result<()> {
        let position = self.positions.get_mut(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        position.request_exit();
        info!(id, "Exit requested");
        Ok(())
    }

    pub fn close_position(
        &mut self,
        id: &str,
        exit_price: f64,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<ClosedTrade> {
        let position = self.positions.remove(id).ok_or_else(|| Error::PositionNotFound(id.to_string()))?;
        self.roll_day(now);

        let pnl = position.pnl_at(exit_price);
        self.capital += position.notional() + pnl;
        self.daily_pnl += pnl;

        let trade = ClosedTrade {
            position_id: position.id().to_string(),
            symbol: position.symbol().to_string(),
            side: position.side(),
            entry_price: position.entry_price(),
            exit_price,
            quantity: position.quantity(),
            pnl,
            entry_time: position.entry_time(),
            exit_time: now,
            duration_hours: now.signed_duration_since(position.entry_time()).num_seconds() as f64 / 3600.0,
            exit_reason: reason,
        };
        info!(
            symbol = %trade.symbol,
            reason = %reason,
            exit_price,
            pnl,
            daily_pnl = self.daily_pnl,
            "Closed position"
        );
        self.history.push(trade.clone());
        Ok(trade)
    }

    // ── Views ───────────────────────────────────────────────────────────────

    pub fn capital(&self) -> f64 {
        self.capital
    }

    pub fn daily_pnl(&self) -> f64 {
        self.daily_pnl
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn position(&self, id: &str) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn position_snapshots(&self) -> Vec<PositionSnapshot> {
        self.positions.values().map(Position::snapshot).collect()
    }

    pub fn trade_history(&self) -> &[ClosedTrade] {
        &self.history
    }

    /// The last `n` closed trades, newest first.
    pub fn recent_trades(&self, n: usize) -> Vec<ClosedTrade> {
        self.history.iter().rev().take(n).cloned().collect()
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.positions.values().map(Position::pnl).sum()
    }

    pub fn equity(&self) -> f64 {
        self.capital + self.positions.values().map(|p| p.notional() + p.pnl()).sum::<f64>()
    }

    /// 0–100: up to 50 from today's realized loss against the limit, up to
    /// 30 from position-slot usage.
    pub fn risk_score(&self) -> f64 {
        let loss = (-self.daily_pnl).max(0.0);
        let loss_part = if self.config.max_daily_loss > 0.0 {
            (loss / self.config.max_daily_loss * 50.0).min(50.0)
        } else {
            0.0
        };
        let slot_part = if self.config.max_open_positions > 0 {
            self.positions.len() as f64 / self.config.max_open_positions as f64 * 30.0
        } else {
            0.0
        };
        (loss_part + slot_part).min(100.0)
    }

    pub fn portfolio_summary(&self) -> PortfolioSummary {
        PortfolioSummary {
            open_positions: self.positions.len(),
            total_value: self.positions.values().map(|p| p.current_price() * p.quantity()).sum(),
            unrealized_pnl: self.unrealized_pnl(),
            daily_pnl: self.daily_pnl,
            total_trades: self.history.len(),
            risk_score: self.risk_score(),
            available_capital: self.capital,
            equity: self.equity(),
        }
    }

    pub fn performance(&self) -> PerformanceStats {
        PerformanceStats::from_trades(&self.history)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
