use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{Error, Result, TradingMode};

/// How the risk manager turns a decision into a position size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizingMethod {
    /// Dampened Kelly fraction bounded by the per-trade risk budget.
    Kelly,
    /// Constant fraction of available capital.
    Fixed,
}

impl FromStr for SizingMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "kelly" => Ok(SizingMethod::Kelly),
            "fixed" => Ok(SizingMethod::Fixed),
            other => Err(Error::Config(format!(
                "SIZING_METHOD must be 'kelly' or 'fixed', got: '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for SizingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SizingMethod::Kelly => write!(f, "kelly"),
            SizingMethod::Fixed => write!(f, "fixed"),
        }
    }
}

/// All runtime configuration, read once at startup.
///
/// Every field has a default. Unparseable values fall back to the default
/// with a warning; `validate` reports the combinations the bot cannot run with.
#[derive(Debug, Clone)]
pub struct Config {
    // Trading
    pub trading_mode: TradingMode,
    pub trading_pairs: Vec<String>,
    pub initial_capital: f64,
    pub position_size_pct: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub max_open_positions: usize,
    pub trading_cycle_minutes: u64,
    pub paper_slippage_bps: f64,

    // Risk
    pub max_daily_loss: f64,
    pub max_portfolio_risk: f64,
    pub prediction_confidence_threshold: f64,
    pub sizing_method: SizingMethod,
    pub max_holding_hours: i64,

    // Worker
    pub cycle_timeout_secs: u64,
    pub heartbeat_stale_secs: i64,

    // Data and models
    pub primary_timeframe: String,
    pub training_timeframe: String,
    pub model_retrain_hours: i64,
    pub model_dir: String,
    pub strategy_config_path: Option<String>,

    // Exchange credentials (live mode only)
    pub binance_api_key: Option<String>,
    pub binance_secret: Option<String>,

    // Dashboard
    pub dashboard_port: u16,
    pub dashboard_token: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            trading_mode: TradingMode::Paper,
            trading_pairs: vec!["BTC/USDT".to_string(), "ETH/USDT".to_string()],
            initial_capital: 10_000.0,
            position_size_pct: 0.15,
            stop_loss_pct: 0.015,
            take_profit_pct: 0.04,
            max_open_positions: 2,
            trading_cycle_minutes: 30,
            paper_slippage_bps: 10.0,
            max_daily_loss: 500.0,
            max_portfolio_risk: 0.015,
            prediction_confidence_threshold: 0.55,
            sizing_method: SizingMethod::Kelly,
            max_holding_hours: 24,
            cycle_timeout_secs: 300,
            heartbeat_stale_secs: 600,
            primary_timeframe: "15m".to_string(),
            training_timeframe: "1h".to_string(),
            model_retrain_hours: 24,
            model_dir: "models".to_string(),
            strategy_config_path: None,
            binance_api_key: None,
            binance_secret: None,
            dashboard_port: 8080,
            dashboard_token: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    /// Loads `.env` if present.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Missing keys keep their default.
    pub fn from_source<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let trading_mode = match get("TRADING_MODE").map(|v| v.to_lowercase()) {
            None => defaults.trading_mode,
            Some(v) if v == "paper" => TradingMode::Paper,
            Some(v) if v == "live" => TradingMode::Live,
            Some(other) => {
                warn!(value = %other, "TRADING_MODE must be 'paper' or 'live', using paper");
                TradingMode::Paper
            }
        };

        let trading_pairs = match get("TRADING_PAIRS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.trading_pairs.clone(),
        };

        let sizing_method = match get("SIZING_METHOD") {
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                warn!(error = %e, "falling back to kelly sizing");
                defaults.sizing_method
            }),
            None => defaults.sizing_method,
        };

        Config {
            trading_mode,
            trading_pairs,
            initial_capital: parsed(&get, "INITIAL_CAPITAL", defaults.initial_capital),
            position_size_pct: parsed(&get, "POSITION_SIZE_PCT", defaults.position_size_pct),
            stop_loss_pct: parsed(&get, "STOP_LOSS_PCT", defaults.stop_loss_pct),
            take_profit_pct: parsed(&get, "TAKE_PROFIT_PCT", defaults.take_profit_pct),
            max_open_positions: parsed(&get, "MAX_OPEN_POSITIONS", defaults.max_open_positions),
            trading_cycle_minutes: parsed(&get, "TRADING_CYCLE_MINUTES", defaults.trading_cycle_minutes),
            paper_slippage_bps: parsed(&get, "PAPER_SLIPPAGE_BPS", defaults.paper_slippage_bps),
            max_daily_loss: parsed(&get, "MAX_DAILY_LOSS", defaults.max_daily_loss),
            max_portfolio_risk: parsed(&get, "MAX_PORTFOLIO_RISK", defaults.max_portfolio_risk),
            prediction_confidence_threshold: parsed(
                &get,
                "PREDICTION_CONFIDENCE_THRESHOLD",
                defaults.prediction_confidence_threshold,
            ),
            sizing_method,
            max_holding_hours: parsed(&get, "MAX_HOLDING_HOURS", defaults.max_holding_hours),
            cycle_timeout_secs: parsed(&get, "CYCLE_TIMEOUT_SECS", defaults.cycle_timeout_secs),
            heartbeat_stale_secs: parsed(&get, "HEARTBEAT_STALE_SECS", defaults.heartbeat_stale_secs),
            primary_timeframe: get("PRIMARY_TIMEFRAME").unwrap_or(defaults.primary_timeframe),
            training_timeframe: get("TRAINING_TIMEFRAME").unwrap_or(defaults.training_timeframe),
            model_retrain_hours: parsed(&get, "MODEL_RETRAIN_HOURS", defaults.model_retrain_hours),
            model_dir: get("MODEL_DIR").unwrap_or(defaults.model_dir),
            strategy_config_path: get("STRATEGY_CONFIG_PATH"),
            binance_api_key: get("BINANCE_API_KEY"),
            binance_secret: get("BINANCE_SECRET"),
            dashboard_port: parsed(&get, "DASHBOARD_PORT", defaults.dashboard_port),
            dashboard_token: get("DASHBOARD_TOKEN"),
        }
    }

    /// Check for configurations the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.trading_pairs.is_empty() {
            return Err(Error::Config("no trading pairs configured".into()));
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(Error::Config(format!(
                "INITIAL_CAPITAL must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.max_open_positions == 0 {
            return Err(Error::Config("MAX_OPEN_POSITIONS must be at least 1".into()));
        }
        if !(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0) {
            return Err(Error::Config(format!(
                "STOP_LOSS_PCT must be in (0, 1), got {}",
                self.stop_loss_pct
            )));
        }
        if self.trading_cycle_minutes == 0 {
            return Err(Error::Config("TRADING_CYCLE_MINUTES must be at least 1".into()));
        }
        if self.trading_mode == TradingMode::Live
            && (self.binance_api_key.is_none() || self.binance_secret.is_none())
        {
            return Err(Error::Config(
                "live mode requires BINANCE_API_KEY and BINANCE_SECRET".into(),
            ));
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.trading_cycle_minutes * 60)
    }

    pub fn cycle_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cycle_timeout_secs)
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "invalid value, using default");
            default
        }),
        None => default,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
