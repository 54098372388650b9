//! Error types for the processio-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].
//! "Not found" is deliberately absent: missing variables are reported as
//! a sentinel record and missing rows on delete are a successful no-op.

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Reading or writing a document snapshot failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// Query parameters could not be parsed or validated.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The configured backend name is not recognised.
    #[error("unknown database: {0}")]
    UnknownBackend(String),

    /// A stored document does not have the expected shape.
    #[error("malformed document: {0}")]
    MalformedDocument(String),

    /// The backend did not answer within the configured deadline.
    #[error("{operation} timed out after {after_ms} ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    /// A shared lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Whether the error was caused by caller input rather than the backend.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidQuery(_))
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}
