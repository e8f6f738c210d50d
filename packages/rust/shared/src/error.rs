//! Error types for Maqam.
//!
//! Library crates use [`MaqamError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Maqam operations.
#[derive(Debug, thiserror::Error)]
pub enum MaqamError {
    /// Configuration loading or validation error. Fatal at startup.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport or HTTP error talking to the video platform.
    #[error("network error: {0}")]
    Network(String),

    /// The requested playlist, channel, or video does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A duration that cannot be classified (negative seconds).
    #[error("invalid duration: {seconds}s")]
    InvalidDuration { seconds: i64 },

    /// A review action carried a malformed or missing manual original.
    #[error("invalid override: {message}")]
    InvalidOverride { message: String },

    /// Scoring a single candidate failed.
    #[error("scoring error: {message}")]
    Scoring { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (broken record invariant, bad input shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Dataset export error.
    #[error("export error: {0}")]
    Export(String),

    /// The batch was cancelled before every retrieval completed.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, MaqamError>;

impl MaqamError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-override error from any displayable message.
    pub fn invalid_override(msg: impl Into<String>) -> Self {
        Self::InvalidOverride {
            message: msg.into(),
        }
    }

    /// Create a scoring error from any displayable message.
    pub fn scoring(msg: impl Into<String>) -> Self {
        Self::Scoring {
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

    /// Whether a collaborator failure should degrade to "no candidates"
    /// instead of aborting a batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::NotFound(_))
    }
}
