//! Variable records shared by every storage backend.
//!
//! A [`Variable`] is what callers write. The engine stamps it with a
//! write time ([`VariableWithTimestamp`]) and the backend additionally
//! records the owner ([`StoredVariable`]).

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A user-scoped value, optionally tagged with process identifiers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Identifies the value; unique per user.
    pub key: String,
    /// Arbitrary JSON value. No schema is enforced.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Process definition this variable belongs to; empty means none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process_definition_id: String,
    /// Process instance this variable belongs to; empty means none.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub process_instance_id: String,
}

impl Variable {
    /// Create an untagged variable.
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            ..Self::default()
        }
    }

    /// Tag the variable with a process definition id.
    pub fn with_process_definition(mut self, definition_id: impl Into<String>) -> Self {
        self.process_definition_id = definition_id.into();
        self
    }

    /// Tag the variable with a process instance id.
    pub fn with_process_instance(mut self, instance_id: impl Into<String>) -> Self {
        self.process_instance_id = instance_id.into();
        self
    }
}

/// A variable together with its last-write time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableWithTimestamp {
    #[serde(flatten)]
    pub variable: Variable,
    /// Seconds since the Unix epoch; `0` for never-written keys.
    #[serde(default)]
    pub unix_timestamp_in_s: i64,
}

/// The persisted form of a variable: owner plus timestamped variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredVariable {
    #[serde(flatten)]
    pub inner: VariableWithTimestamp,
    /// The user owning this variable.
    pub user_id: String,
}

impl StoredVariable {
    /// Build a stored record from its parts.
    pub fn new(user_id: impl Into<String>, variable: Variable, unix_timestamp_in_s: i64) -> Self {
        Self {
            inner: VariableWithTimestamp {
                variable,
                unix_timestamp_in_s,
            },
            user_id: user_id.into(),
        }
    }

    /// The record returned for a key that was never written by `user_id`.
    ///
    /// Absence is not an error: value is `null` and the timestamp is `0`.
    pub fn not_found(user_id: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(user_id, Variable::new(key, serde_json::Value::Null), 0)
    }

    /// Whether this record is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        self.inner.unix_timestamp_in_s == 0 && self.inner.variable.value.is_null()
    }

    pub fn key(&self) -> &str {
        &self.inner.variable.key
    }

    /// Drop the owner, keeping the timestamped variable.
    pub fn into_timestamped(self) -> VariableWithTimestamp {
        self.inner
    }
}

/// A batch of independent get and set sub-operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkRequest {
    /// Keys to read, answered in this order.
    #[serde(default)]
    pub get: Vec<String>,
    /// Variables to write, applied in this order before any read.
    #[serde(default)]
    pub set: Vec<Variable>,
}

/// One entry per requested get key, in request order.
pub type BulkResponse = Vec<VariableWithTimestamp>;

/// Wire shape of a count result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Count {
    pub count: u64,
}

// ── tests ────────────────────────────────────────────────────────────
