//! Error types for litscreen.
//!
//! Library crates use [`LitScreenError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all litscreen operations.
///
/// Only conditions that must halt a stage end up here. Per-batch and
/// per-item classification failures are recorded in the Record Store instead.
#[derive(Debug, thiserror::Error)]
pub enum LitScreenError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed or unreadable tabular file.
    #[error("CSV error in {path:?}: {message}")]
    Csv { path: PathBuf, message: String },

    /// Record Store misuse (unknown column, row out of range).
    #[error("record store error: {0}")]
    Store(String),

    /// Data validation error (missing columns, bad arguments, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LitScreenError>;

impl LitScreenError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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

    /// Create a CSV error for the given file.
    pub fn csv(path: impl Into<PathBuf>, msg: impl std::fmt::Display) -> Self {
        Self::Csv {
            path: path.into(),
            message: msg.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LitScreenError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = LitScreenError::validation("column 'Abstract' not found");
        assert!(err.to_string().contains("'Abstract'"));

        let err = LitScreenError::csv("/tmp/in.csv", "unequal lengths");
        assert!(err.to_string().contains("in.csv"));
        assert!(err.to_string().contains("unequal lengths"));
    }
}
