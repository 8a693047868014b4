//! Error types for the pure partitioning and merge logic

use arrow::error::ArrowError;
use thiserror::Error;

/// Errors raised while validating inputs or merging partition contents
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced column is missing, or the temporal key is not date-like
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// Invalid granularity or other caller-supplied setting
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Arrow kernel failure while slicing, sorting or concatenating rows
    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl CoreError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Result type alias for CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
