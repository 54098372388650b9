//! The storage contract every backend implements.
//!
//! Both adapters ([`SqliteVariableStore`](crate::SqliteVariableStore) and
//! [`DocumentVariableStore`](crate::DocumentVariableStore)) must behave
//! identically for every operation; the shared suite in
//! `tests/backend_parity.rs` pins that down.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::model::{StoredVariable, VariableWithTimestamp};
use crate::query::VariableQuery;

/// Persistence operations for user-scoped variables.
///
/// Implementations must be safe to call concurrently. Concurrent writes to
/// the same `(user_id, key)` resolve as last-write-wins.
#[async_trait]
pub trait VariableBackend: Send + Sync {
    /// Fetch one variable.
    ///
    /// Returns [`StoredVariable::not_found`] when the user never wrote
    /// `key`; errors only on a genuine storage failure.
    async fn get_variable(&self, user_id: &str, key: &str) -> StoreResult<StoredVariable>;

    /// Insert or fully replace the record keyed by `(user_id, key)`.
    async fn set_variable(&self, variable: StoredVariable) -> StoreResult<()>;

    /// Remove one variable. Removing an absent key succeeds.
    async fn delete_variable(&self, user_id: &str, key: &str) -> StoreResult<()>;

    /// Filter, sort and page the user's variables.
    ///
    /// Returns an empty vector when nothing matches.
    async fn list_variables(
        &self,
        user_id: &str,
        query: &VariableQuery,
    ) -> StoreResult<Vec<VariableWithTimestamp>>;

    /// Count the user's variables matching the query filters.
    ///
    /// Sort, limit and offset are ignored.
    async fn count_variables(&self, user_id: &str, query: &VariableQuery) -> StoreResult<u64>;

    /// Remove every variable tagged with `definition_id`, across all users.
    ///
    /// Returns how many records were removed.
    async fn delete_variables_of_process_definition(&self, definition_id: &str)
    -> StoreResult<u64>;

    /// Remove every variable tagged with `instance_id`, across all users.
    ///
    /// Returns how many records were removed.
    async fn delete_variables_of_process_instance(&self, instance_id: &str) -> StoreResult<u64>;
}

/// Which storage technology backs the variable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relational store on SQLite.
    #[default]
    Sqlite,
    /// Embedded document collection.
    Document,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => write!(f, "sqlite"),
            Self::Document => write!(f, "document"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> StoreResult<Self> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "document" => Ok(Self::Document),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_roundtrips_through_strings() {
        for kind in [BackendKind::Sqlite, BackendKind::Document] {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
        assert!("mongodb".parse::<BackendKind>().is_err());
    }
}
