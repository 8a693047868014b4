//! Error types for the dataset writer crate

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;
use upsert2parquet_core::CoreError;

/// Error codes for programmatic handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// E001: Batch or column selection does not fit the dataset schema
    E001SchemaMismatch,
    /// E002: Granularity, write mode or other setting invalid for this dataset
    E002InvalidConfig,
    /// E003: Filesystem operation failed
    E003Io,
    /// E004: Parquet encoding or decoding failed
    E004Parquet,
    /// E005: Arrow kernel failed
    E005Arrow,
    /// E006: Dataset summary could not be read or written
    E006Summary,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::E001SchemaMismatch => "E001",
            Self::E002InvalidConfig => "E002",
            Self::E003Io => "E003",
            Self::E004Parquet => "E004",
            Self::E005Arrow => "E005",
            Self::E006Summary => "E006",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while merging into a dataset
#[derive(Debug, Error)]
pub enum WriterError {
    /// Missing column, non-temporal key, or batch incompatible with stored partitions
    #[error("[{code}] Schema error: {message}")]
    Schema { code: &'static str, message: String },

    /// Invalid granularity, conflicting dataset settings, or invalid write mode
    #[error("[{code}] Configuration error: {message}")]
    Configuration { code: &'static str, message: String },

    /// Reading, writing or renaming a file failed
    #[error("[{code}] I/O error on '{path}': {source}")]
    Io {
        code: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Parquet encoding or decoding failed
    #[error("[{code}] Parquet error on '{path}': {source}")]
    Parquet {
        code: &'static str,
        path: String,
        #[source]
        source: ParquetError,
    },

    #[error("[{code}] Arrow error: {source}")]
    Arrow {
        code: &'static str,
        #[source]
        source: ArrowError,
    },

    /// Dataset summary file is unreadable or could not be produced
    #[error("[{code}] Dataset summary error for '{path}': {message}")]
    Summary {
        code: &'static str,
        path: String,
        message: String,
    },
}

impl WriterError {
    /// Create a schema error with error code
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            code: ErrorCode::E001SchemaMismatch.as_str(),
            message: message.into(),
        }
    }

    /// Create a configuration error with error code
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            code: ErrorCode::E002InvalidConfig.as_str(),
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::Io {
            code: ErrorCode::E003Io.as_str(),
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn parquet(path: impl AsRef<std::path::Path>, source: ParquetError) -> Self {
        Self::Parquet {
            code: ErrorCode::E004Parquet.as_str(),
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn summary(path: impl AsRef<std::path::Path>, message: impl Into<String>) -> Self {
        Self::Summary {
            code: ErrorCode::E006Summary.as_str(),
            path: path.as_ref().display().to_string(),
            message: message.into(),
        }
    }

    /// Stable code of this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Schema { .. } => ErrorCode::E001SchemaMismatch,
            Self::Configuration { .. } => ErrorCode::E002InvalidConfig,
            Self::Io { .. } => ErrorCode::E003Io,
            Self::Parquet { .. } => ErrorCode::E004Parquet,
            Self::Arrow { .. } => ErrorCode::E005Arrow,
            Self::Summary { .. } => ErrorCode::E006Summary,
        }
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, Self::Schema { .. })
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

impl From<ArrowError> for WriterError {
    fn from(source: ArrowError) -> Self {
        Self::Arrow {
            code: ErrorCode::E005Arrow.as_str(),
            source,
        }
    }
}

impl From<CoreError> for WriterError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Schema { message } => Self::schema(message),
            CoreError::Configuration { message } => Self::configuration(message),
            CoreError::Arrow(source) => source.into(),
        }
    }
}

/// Result type alias for WriterError
pub type Result<T> = std::result::Result<T, WriterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_kind() {
        let err: WriterError = CoreError::schema("grouping column 'ts' not found").into();
        assert!(err.is_schema());
        assert_eq!(err.code(), ErrorCode::E001SchemaMismatch);
        assert!(err.to_string().starts_with("[E001] Schema error"));

        let err: WriterError = CoreError::configuration("bad granularity").into();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("bad granularity"));
    }

    #[test]
    fn test_io_error_names_path() {
        let err = WriterError::io(
            "/data/part.0.parquet",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code().as_str(), "E003");
        assert!(err.to_string().contains("/data/part.0.parquet"));
    }
}
