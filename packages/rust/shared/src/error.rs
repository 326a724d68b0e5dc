//! Error types for catalogwriter.
//!
//! Library crates use [`CatalogWriterError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all catalogwriter operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogWriterError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The payload is not a valid serialized graph.
    #[error("deserialization error at line {line}: {message}")]
    Deserialization { line: usize, message: String },

    /// The graph could not be mapped onto a catalog envelope.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// No catalog account is available to build the conversion context.
    #[error("no catalog account available")]
    MissingCredential,

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP error talking to the catalog.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CatalogWriterError>;

impl CatalogWriterError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a conversion error from any displayable message.
    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error only means "nothing to do yet" rather than a fault.
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Self::MissingCredential)
    }
}
