use thiserror::Error;

use crate::OrderErrorKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Insufficient history: need {needed} candles, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Position not found: {0}")]
    PositionNotFound(String),

    #[error("Symbol already has an open position: {0}")]
    DuplicatePosition(String),

    #[error("Order failed ({kind}): {message}")]
    OrderFailed { kind: OrderErrorKind, message: String },

    #[error("Trading cycle exceeded {0}s budget")]
    CycleTimeout(u64),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
