//! Error types for the J-Book toolkit.
//!
//! Library crates use [`JbookError`] via `thiserror`.
//! App crates (cli/dashboard) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all J-Book operations.
#[derive(Debug, thiserror::Error)]
pub enum JbookError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Structured-table or narrative text parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Workbook could not be opened or read.
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    /// PDF could not be loaded or an object was malformed.
    #[error("pdf error: {0}")]
    Pdf(String),

    /// LLM request, transport, or response error.
    #[error("llm error: {0}")]
    Llm(String),

    /// Tag cache / run log storage error.
    #[error("storage error: {0}")]
    Storage(String),

    /// CSV read or write error.
    #[error("csv error: {0}")]
    Csv(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (no inputs, bad arguments, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, JbookError>;

impl JbookError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
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
}
