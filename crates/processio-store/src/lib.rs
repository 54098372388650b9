//! # processio-store
//!
//! Storage layer for the processio variable store.
//!
//! Defines the variable model, validated query options, and the
//! [`VariableBackend`] contract, with two interchangeable implementations
//! that must behave identically:
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  VariableBackend (async trait)                │
//! ├──────────────────────┬───────────────────────┤
//! │ SqliteVariableStore  │ DocumentVariableStore │
//! │  SQL + REGEXP fn     │  filter documents     │
//! ├──────────────────────┼───────────────────────┤
//! │ Database (rusqlite)  │ DocumentStore         │
//! │ Migrations           │ Collection + indexes  │
//! └──────────────────────┴───────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use processio_store::{Database, SqliteVariableStore, VariableQuery};
//!
//! let db = Database::open_and_migrate("data/processio.db").await?;
//! let backend = SqliteVariableStore::new(db);
//! let vars = backend.list_variables("user-1", &VariableQuery::new()).await?;
//! ```

pub mod backend;
pub mod db;
pub mod document;
pub mod error;
pub mod migration;
pub mod model;
pub mod query;
pub mod sqlite;

// ── re-exports ───────────────────────────────────────────────────────

pub use backend::{BackendKind, VariableBackend};
pub use db::Database;
pub use document::{DocumentStore, DocumentVariableStore};
pub use error::{StoreError, StoreResult};
pub use model::{BulkRequest, BulkResponse, Count, StoredVariable, Variable, VariableWithTimestamp};
pub use query::{Sort, SortDirection, SortField, VariableQuery};
pub use sqlite::SqliteVariableStore;
