//! Error types for GrantScout.
//!
//! Library crates use [`GrantScoutError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all GrantScout operations.
#[derive(Debug, thiserror::Error)]
pub enum GrantScoutError {
    /// Configuration loading or validation error (missing credentials included).
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an external collaborator.
    #[error("network error: {0}")]
    Network(String),

    /// Structured inference failed (API error or output not matching the schema).
    #[error("inference error: {0}")]
    Inference(String),

    /// A search provider call failed.
    #[error("search error ({provider}): {message}")]
    Search { provider: String, message: String },

    /// Reading or parsing an RSS/Atom feed failed.
    #[error("feed error ({url}): {message}")]
    Feed { url: String, message: String },

    /// Fetching or converting a page failed.
    #[error("fetch error ({url}): {message}")]
    Fetch { url: String, message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Checkpoint file could not be read or written.
    #[error("checkpoint error: {message}")]
    Checkpoint { message: String },

    /// An operation exceeded its time budget.
    #[error("timed out after {secs}s: {operation}")]
    Timeout { operation: String, secs: u64 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, GrantScoutError>;

impl GrantScoutError {
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

    /// Create a checkpoint error from any displayable message.
    pub fn checkpoint(msg: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: msg.into(),
        }
    }

    /// Create a search error attributed to a provider.
    pub fn search(provider: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Search {
            provider: provider.into(),
            message: msg.into(),
        }
    }

    /// Create a feed error attributed to a feed URL.
    pub fn feed(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Feed {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a fetch error attributed to a page URL.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Fetch {
            url: url.into(),
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

    /// Whether this error belongs to the class that aborts a whole run.
    ///
    /// Only configuration problems are fatal on their own; an inference failure
    /// is fatal when it comes out of query expansion, which the pipeline decides.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }
}
