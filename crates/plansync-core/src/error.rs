//! Error types for plansync-core
//!
//! Every variant knows whether a job that failed with it may be attempted
//! again. Retryable errors go back to the queue with backoff; the rest land
//! in the failed-job record on the first attempt.

use thiserror::Error;

/// Core error type for plansync operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The plan lock could not be taken within the retry budget
    #[error("lock on '{resource}' not acquired after {attempts} attempts")]
    LockNotAcquired { resource: String, attempts: u32 },

    /// Lock ownership was lost before the write could be persisted
    #[error("lock on '{resource}' was lost before the write")]
    LockLost { resource: String },

    /// Remote document store fetch/update failed
    #[error("Remote store error: {0}")]
    RemoteStore(String),

    /// Queue or lock storage failed
    #[error("Database error: {0}")]
    Database(String),

    /// Input to the merge step was malformed
    #[error("Merge invariant violated: {0}")]
    MergeInvariantViolation(String),

    /// A document returned by the store could not be interpreted
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Submission rejected before enqueueing
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration value is invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Parsing failed (config files, payloads, stored rows)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Filesystem access failed
    #[error("IO error: {0}")]
    Io(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Stable machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::LockNotAcquired { .. } => "LOCK_NOT_ACQUIRED",
            Self::LockLost { .. } => "LOCK_LOST",
            Self::RemoteStore(_) => "REMOTE_STORE_FAILURE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::MergeInvariantViolation(_) => "MERGE_INVARIANT_VIOLATION",
            Self::MalformedDocument(_) => "MALFORMED_DOCUMENT",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
        }
    }

    /// Whether a job failing with this error may be attempted again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockNotAcquired { .. }
                | Self::LockLost { .. }
                | Self::RemoteStore(_)
                | Self::Database(_)
        )
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

/// Result type alias for plansync-core operations
pub type Result<T> = std::result::Result<T, Error>;
