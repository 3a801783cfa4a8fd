//! Error types for insight_core operations.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for insight_core operations.
#[derive(Error, Debug)]
pub enum InsightError {
    /// Backend returned a non-success HTTP status.
    #[error("backend returned HTTP {status}: {body}")]
    Transport {
        /// HTTP status code
        status: u16,
        /// Response body (possibly truncated)
        body: String,
    },

    /// Backend response body was empty or undecodable.
    #[error("backend returned an empty or undecodable response")]
    EmptyResponse,

    /// Backend reported an error in its response payload.
    #[error("backend error: {message}")]
    Backend {
        /// Error message from the backend
        message: String,
        /// Backend error type, when reported
        kind: Option<String>,
    },

    /// HTTP client error (connection, TLS, request timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Relevance crawl exceeded the caller's deadline.
    #[error("relevance crawl timed out after {timeout_ms}ms: {path}")]
    CrawlTimeout {
        /// Source file whose crawl timed out
        path: String,
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Operation was cancelled cooperatively.
    ///
    /// Distinct from failure: callers surface a cancellation notification,
    /// never an error report.
    #[error("operation cancelled")]
    Cancelled,

    /// Element handle became invalid between discovery and use.
    #[error("stale element: {key}")]
    StaleElement {
        /// Key of the invalidated element
        key: String,
    },

    /// No inspection exists under the given id.
    #[error("inspection not found: {0}")]
    InspectionNotFound(String),

    /// Invalid inspection state transition.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state
        from: String,
        /// Target state
        to: String,
    },

    /// A persisted snapshot is corrupted or has an unsupported schema.
    #[error("corrupted snapshot at {}: {}", path.display(), reason)]
    SnapshotCorrupt {
        /// Path to the corrupted snapshot
        path: PathBuf,
        /// Description of the corruption
        reason: String,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Project is locked by another process.
    #[error("project locked by another process")]
    ProjectLocked,

    /// The worker pool rejected a job (shut down).
    #[error("worker pool unavailable: {0}")]
    PoolUnavailable(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl InsightError {
    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Transport { .. } | Self::EmptyResponse | Self::Backend { .. } => {
                Some("Check backend availability and the configured base_url, then retry.")
            }
            Self::Http(_) => {
                Some("Check network connectivity and the backend base_url in .insight/config.toml.")
            }
            Self::CrawlTimeout { .. } => {
                Some("Retry the analysis, or raise crawler.timeout_ms in .insight/config.toml.")
            }
            Self::SnapshotCorrupt { .. } => {
                Some("Remove the corrupted snapshot under .insight/ and re-run 'insight index'.")
            }
            Self::ProjectLocked => {
                Some("Wait for the other process to finish, or remove .insight/LOCK if it is dead.")
            }
            Self::ConfigError(_) => {
                Some("Fix .insight/config.toml, or delete it to fall back to defaults.")
            }
            Self::InspectionNotFound(_) => {
                Some("List current inspections with 'insight inspections list'.")
            }
            _ => None,
        }
    }

    /// True when the error represents cooperative cancellation rather than failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Convenience Result type for insight_core operations.
pub type Result<T> = std::result::Result<T, InsightError>;
