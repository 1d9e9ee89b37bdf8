//! Error types for the divergence signals strategy

use thiserror::Error;

/// Failures while pulling candles from the market data source.
///
/// All variants are transient from the engine's point of view: the cycle is
/// abandoned, EngineState is left untouched and the driver backs off.
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Exchange returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed candle data: {message}")]
    Malformed { message: String },

    #[error("Invalid candle series: {0}")]
    Series(#[from] SeriesError),

    #[error("Market data unavailable: {message}")]
    Unavailable { message: String },
}

/// Ordering violations found while building a candle series
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeriesError {
    #[error("candle {index} open_time {open_time} is not after previous {previous}")]
    OutOfOrder {
        index: usize,
        open_time: i64,
        previous: i64,
    },
}

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Delivery rejected: {message}")]
    Delivery { message: String },
}

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Market data error: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Insufficient history for {indicator}: need {required} candles, have {available}")]
    InsufficientHistory {
        indicator: String,
        required: usize,
        available: usize,
    },
}

impl EngineError {
    pub(crate) fn insufficient(indicator: &str, required: usize, available: usize) -> Self {
        Self::InsufficientHistory {
            indicator: indicator.to_string(),
            required,
            available,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
