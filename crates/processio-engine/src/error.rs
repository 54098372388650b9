//! Error types for the processio-engine crate.
//!
//! Validation failures are rejected before storage is touched; storage
//! failures are passed through with the name of the failing operation.

use processio_store::StoreError;
use thiserror::Error;

/// Alias for `Result<T, EngineError>`.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by the variable engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Caller input is malformed (empty key, empty id, ...).
    #[error("validation error: {0}")]
    Validation(String),

    /// The key lies in the read-only computed namespace.
    #[error("key {key} is reserved for computed variables and cannot be written")]
    ReservedKey { key: String },

    /// A computed key names a function the resolver does not know.
    #[error("unknown computed function: {name}")]
    UnknownFunction { name: String },

    /// A computed function rejected its argument.
    #[error("invalid argument for {function}: {message}")]
    InvalidArgument { function: String, message: String },

    /// The storage backend failed.
    #[error("{operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: StoreError,
    },
}

impl EngineError {
    pub(crate) fn storage(operation: &'static str, source: StoreError) -> Self {
        // Query validation surfaces from the store crate; keep it a client error.
        if source.is_validation() {
            return Self::Validation(source.to_string());
        }
        Self::Storage { operation, source }
    }

    /// Whether the caller is at fault (maps to a client-error signal).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage { .. })
    }
}
