use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One OHLCV bucket as returned by the market data port.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered candle history. Timestamps are strictly increasing and the
/// series is never mutated after construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandleSeries(Vec<Candle>);

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Result<Self> {
        if let Some(w) = candles.windows(2).find(|w| w[1].timestamp <= w[0].timestamp) {
            return Err(Error::Other(format!(
                "candle timestamps must be strictly increasing ({} then {})",
                w[0].timestamp, w[1].timestamp
            )));
        }
        Ok(Self(candles))
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn candles(&self) -> &[Candle] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.0.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.0.iter().map(|c| c.close).collect()
    }
}

/// Side of a trade. `Buy` opens a long, `Sell` opens a short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Direction declared by a single strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "BUY"),
            Direction::Sell => write!(f, "SELL"),
            Direction::Hold => write!(f, "HOLD"),
        }
    }
}

/// Five-level signal used by the predictor and the aggregated decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalKind {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl SignalKind {
    /// The order side an actionable signal maps to; `None` for HOLD.
    pub fn side(self) -> Option<OrderSide> {
        match self {
            SignalKind::StrongBuy | SignalKind::Buy => Some(OrderSide::Buy),
            SignalKind::StrongSell | SignalKind::Sell => Some(OrderSide::Sell),
            SignalKind::Hold => None,
        }
    }
}

impl From<Direction> for SignalKind {
    fn from(d: Direction) -> Self {
        match d {
            Direction::Buy => SignalKind::Buy,
            Direction::Sell => SignalKind::Sell,
            Direction::Hold => SignalKind::Hold,
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::StrongBuy => write!(f, "STRONG_BUY"),
            SignalKind::Buy => write!(f, "BUY"),
            SignalKind::Hold => write!(f, "HOLD"),
            SignalKind::Sell => write!(f, "SELL"),
            SignalKind::StrongSell => write!(f, "STRONG_SELL"),
        }
    }
}

/// Output of one rule-based strategy after folding its internal rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub strategy: String,
    pub direction: Direction,
    /// In [0, 1]. For HOLD this measures how balanced the evidence was.
    pub strength: f64,
    pub reasons: Vec<String>,
    pub buy_strength: f64,
    pub sell_strength: f64,
}

impl StrategySignal {
    /// HOLD with zero strength: no rule fired.
    pub fn silent(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            direction: Direction::Hold,
            strength: 0.0,
            reasons: Vec::new(),
            buy_strength: 0.0,
            sell_strength: 0.0,
        }
    }
}

/// Probability estimate from the predictor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Probability that the next close is higher than the current one.
    pub probability: f64,
    /// Agreement between ensemble members, in [0, 1].
    pub confidence: f64,
    pub signal: SignalKind,
    pub member_probabilities: Vec<f64>,
}

impl Prediction {
    pub fn neutral() -> Self {
        Self {
            probability: 0.5,
            confidence: 0.0,
            signal: SignalKind::Hold,
            member_probabilities: Vec::new(),
        }
    }
}

/// Per-source inputs that produced an aggregated decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionComponents {
    pub trend: StrategySignal,
    pub mean_reversion: StrategySignal,
    pub breakout: StrategySignal,
    pub volume: StrategySignal,
    pub prediction: Prediction,
}

/// Final trading decision for one symbol at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: SignalKind,
    pub confidence: f64,
    pub buy_score: f64,
    pub sell_score: f64,
    pub components: Option<DecisionComponents>,
}

impl Decision {
    pub fn hold() -> Self {
        Self {
            signal: SignalKind::Hold,
            confidence: 0.0,
            buy_score: 0.0,
            sell_score: 0.0,
            components: None,
        }
    }
}

/// An open position owned by the risk manager.
///
/// `entry_price` and `quantity` are fixed at construction; only the mark
/// (current price and running P&L) and the exit flag change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    id: String,
    symbol: String,
    side: OrderSide,
    entry_price: f64,
    quantity: f64,
    stop_loss: f64,
    take_profit: f64,
    entry_time: DateTime<Utc>,
    current_price: f64,
    pnl: f64,
    exit_requested: bool,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        entry_price: f64,
        quantity: f64,
        stop_loss: f64,
        take_profit: f64,
        entry_time: DateTime<Utc>,
    ) -> Result<Self> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(Error::Other(format!("invalid entry price {entry_price}")));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(Error::Other(format!("invalid quantity {quantity}")));
        }
        Ok(Self {
            id: id.into(),
            symbol: symbol.into(),
            side,
            entry_price,
            quantity,
            stop_loss,
            take_profit,
            entry_time,
            current_price: entry_price,
            pnl: 0.0,
            exit_requested: false,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn side(&self) -> OrderSide {
        self.side
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn quantity(&self) -> f64 {
        self.quantity
    }

    pub fn stop_loss(&self) -> f64 {
        self.stop_loss
    }

    pub fn take_profit(&self) -> f64 {
        self.take_profit
    }

    pub fn entry_time(&self) -> DateTime<Utc> {
        self.entry_time
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn pnl(&self) -> f64 {
        self.pnl
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Capital reserved when the position was opened.
    pub fn notional(&self) -> f64 {
        self.entry_price * self.quantity
    }

    /// Signed P&L if the position were closed at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.side {
            OrderSide::Buy => (price - self.entry_price) * self.quantity,
            OrderSide::Sell => (self.entry_price - price) * self.quantity,
        }
    }

    /// Mark to market.
    pub fn mark(&mut self, price: f64) {
        self.current_price = price;
        self.pnl = self.pnl_at(price);
    }

    pub fn request_exit(&mut self) {
        self.exit_requested = true;
    }

    pub fn snapshot(&self) -> PositionSnapshot {
        PositionSnapshot {
            id: self.id.clone(),
            symbol: self.symbol.clone(),
            side: self.side,
            entry_price: self.entry_price,
            current_price: self.current_price,
            quantity: self.quantity,
            pnl: self.pnl,
            pnl_pct: if self.notional() > 0.0 { self.pnl / self.notional() * 100.0 } else { 0.0 },
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            entry_time: self.entry_time,
        }
    }
}

/// Read-only view of an open position for the host surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub current_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub entry_time: DateTime<Utc>,
}

/// Why a position was closed. Declaration order is evaluation priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    TimeLimit,
    Manual,
    BacktestEnd,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop loss hit"),
            ExitReason::TakeProfit => write!(f, "take profit hit"),
            ExitReason::TimeLimit => write!(f, "time limit reached"),
            ExitReason::Manual => write!(f, "manual exit"),
            ExitReason::BacktestEnd => write!(f, "backtest end"),
        }
    }
}

/// A position after it left the open set. Append-only history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub position_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub entry_price: f64,
    pub exit_price: f64,
    pub quantity: f64,
    pub pnl: f64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub duration_hours: f64,
    pub exit_reason: ExitReason,
}

/// Why the entry gate refused a trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectionReason {
    DailyLossLimit { daily_pnl: f64, limit: f64 },
    MaxOpenPositions { open: usize, max: usize },
    HoldSignal,
    LowConfidence { confidence: f64, threshold: f64 },
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::DailyLossLimit { daily_pnl, limit } => {
                write!(f, "daily loss limit reached: {daily_pnl:.2} (limit {limit:.2})")
            }
            RejectionReason::MaxOpenPositions { open, max } => {
                write!(f, "max open positions reached: {open}/{max}")
            }
            RejectionReason::HoldSignal => write!(f, "signal is HOLD"),
            RejectionReason::LowConfidence { confidence, threshold } => write!(
                f,
                "confidence too low: {:.2}% < {:.2}%",
                confidence * 100.0,
                threshold * 100.0
            ),
        }
    }
}

/// Whether the bot is running against the real exchange or simulating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradingMode {
    Live,
    Paper,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Current state of the trading worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    /// Flag a position for exit on the next monitoring pass.
    ClosePosition(String),
}

/// Status exposed to the host surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotStatus {
    pub running: bool,
    pub mode: TradingMode,
    pub capital: f64,
    pub total_value: f64,
    pub unrealized_pnl: f64,
    pub daily_pnl: f64,
    pub open_position_count: usize,
    pub total_trade_count: usize,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub is_healthy: bool,
}

/// Account balance for one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub total: f64,
    pub free: f64,
    pub used: f64,
}

/// Confirmation of a filled market order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    pub filled_amount: f64,
    pub average_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderErrorKind {
    InsufficientFunds,
    InvalidOrder,
    Network,
    Unknown,
}

impl std::fmt::Display for OrderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderErrorKind::InsufficientFunds => write!(f, "insufficient_funds"),
            OrderErrorKind::InvalidOrder => write!(f, "invalid_order"),
            OrderErrorKind::Network => write!(f, "network"),
            OrderErrorKind::Unknown => write!(f, "unknown"),
        }
    }
}

/// Result of an order placement. Failures are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderOutcome {
    Filled(Fill),
    Failed { kind: OrderErrorKind, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn candle(minute: i64, close: f64) -> Candle {
        Candle {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn series_rejects_non_increasing_timestamps() {
        assert!(CandleSeries::new(vec![candle(0, 1.0), candle(1, 2.0)]).is_ok());
        assert!(CandleSeries::new(vec![candle(1, 1.0), candle(1, 2.0)]).is_err());
        assert!(CandleSeries::new(vec![candle(2, 1.0), candle(1, 2.0)]).is_err());
    }

    #[test]
    fn position_pnl_is_signed_by_side() {
        let now = Utc::now();
        let mut long = Position::open("a", "BTC/USDT", OrderSide::Buy, 100.0, 2.0, 95.0, 110.0, now).unwrap();
        let mut short = Position::open("b", "BTC/USDT", OrderSide::Sell, 100.0, 2.0, 105.0, 90.0, now).unwrap();
        long.mark(103.0);
        short.mark(103.0);
        assert!((long.pnl() - 6.0).abs() < 1e-9);
        assert!((short.pnl() + 6.0).abs() < 1e-9);
        assert_eq!(long.current_price(), 103.0);
    }

    #[test]
    fn position_rejects_invalid_quantity() {
        let now = Utc::now();
        assert!(Position::open("a", "X", OrderSide::Buy, 100.0, 0.0, 1.0, 2.0, now).is_err());
        assert!(Position::open("a", "X", OrderSide::Buy, f64::NAN, 1.0, 1.0, 2.0, now).is_err());
    }

    #[test]
    fn signal_kind_maps_to_side() {
        assert_eq!(SignalKind::StrongBuy.side(), Some(OrderSide::Buy));
        assert_eq!(SignalKind::Sell.side(), Some(OrderSide::Sell));
        assert_eq!(SignalKind::Hold.side(), None);
    }
}
