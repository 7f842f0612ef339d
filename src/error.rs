//! Sink error types
//!
//! Two layers of failure exist: encoding a batch into SQL text (pure,
//! synchronous) and executing that text against CrateDB (I/O).

use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while turning metric values into SQL text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// The value has no SQL literal form in CrateDB's grammar
    #[error("Unsupported type: {type_name}")]
    UnsupportedType { type_name: String },

    /// An INSERT with zero rows is not valid SQL
    #[error("Empty batch: cannot build an INSERT statement without rows")]
    EmptyBatch,

    /// NaN and infinities have no numeric literal
    #[error("Non-finite number: {0}")]
    NonFiniteNumber(String),

    /// Two object keys are identical once the key separator is applied
    #[error("Duplicate object key: {0}")]
    DuplicateKey(String),

    /// The year has no four-digit rendering
    #[error("Timestamp out of range: {0}")]
    TimestampOutOfRange(String),
}

impl EncodeError {
    pub fn unsupported(type_name: impl Into<String>) -> Self {
        EncodeError::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}

/// Result type alias for encoding operations
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Errors surfaced by the sink lifecycle
#[derive(Error, Debug)]
pub enum SinkError {
    /// Statement could not be built
    #[error("Encoding error: {0}")]
    Encode(#[from] EncodeError),

    /// CrateDB rejected the statement, or the request failed in flight
    #[error("Execution error{}: {}", status_suffix(.status), .message)]
    Execution {
        status: Option<u16>,
        message: String,
    },

    /// Statement did not complete within the deadline
    #[error("Statement timed out after {0:?}")]
    Timeout(Duration),

    /// The datastore could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// Invalid sink configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl SinkError {
    /// Whether the failure happened before the statement reached CrateDB
    pub fn is_encoding(&self) -> bool {
        matches!(self, SinkError::Encode(_))
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

/// Result type alias for sink operations
pub type SinkResult<T> = Result<T, SinkError>;
