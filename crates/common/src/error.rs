use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::PositionState;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Out-of-order interval: {timestamp} is not after series tail {tail}")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        tail: DateTime<Utc>,
    },

    #[error("Missing sample: {0}")]
    MissingSample(String),

    #[error("Inconsistent position on {symbol}: internal {internal}, exchange quantity {external_quantity}")]
    InconsistentPosition {
        symbol: String,
        internal: PositionState,
        external_quantity: f64,
    },

    #[error("Indicator underflow: {available} intervals, largest window needs {required}")]
    IndicatorUnderflow { required: usize, available: usize },

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
