//! The variable store engine.
//!
//! Routes reads between the [`ComputedResolver`] and the storage backend,
//! owns write timestamps, runs bulk batches, and bounds every backend call
//! with a fixed timeout. The engine holds no per-request state; clones
//! share the backend and can serve requests in parallel.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use processio_store::{
    BulkRequest, BulkResponse, StoreError, StoredVariable, Variable, VariableBackend,
    VariableQuery, VariableWithTimestamp,
};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, EngineResult};
use crate::resolver::{ComputedResolver, is_computed};

/// Deadline applied to each individual backend call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Orchestrates variable reads, writes and queries for callers.
#[derive(Clone)]
pub struct VariableEngine {
    backend: Arc<dyn VariableBackend>,
    resolver: ComputedResolver,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl VariableEngine {
    /// Create an engine on `backend` with the system clock and default timeout.
    pub fn new(backend: Arc<dyn VariableBackend>) -> Self {
        Self {
            backend,
            resolver: ComputedResolver::new(),
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_STORAGE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // ── variables ────────────────────────────────────────────────────

    /// Read one variable.
    ///
    /// Computed keys are resolved and stamped with the current time; all
    /// other keys come from storage. Unknown keys yield the not-found
    /// sentinel, not an error.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: &str, key: &str) -> EngineResult<VariableWithTimestamp> {
        require("user_id", user_id)?;
        require("key", key)?;

        if is_computed(key) {
            let now = self.clock.now();
            let value = self.resolver.resolve(key, now)?;
            return Ok(VariableWithTimestamp {
                variable: Variable::new(key, value),
                unix_timestamp_in_s: now.timestamp(),
            });
        }

        let stored = self
            .guarded("get", self.backend.get_variable(user_id, key))
            .await?;
        Ok(stored.into_timestamped())
    }

    /// Write one variable, replacing any previous value under the same key.
    #[instrument(skip(self, variable), fields(key = %variable.key))]
    pub async fn set(&self, user_id: &str, variable: Variable) -> EngineResult<()> {
        require("user_id", user_id)?;
        require("key", &variable.key)?;
        if is_computed(&variable.key) {
            return Err(EngineError::ReservedKey { key: variable.key });
        }

        let stamped = StoredVariable::new(user_id, variable, self.clock.now().timestamp());
        self.guarded("set", self.backend.set_variable(stamped)).await?;
        debug!("variable set");
        Ok(())
    }

    /// Delete one variable. Absent keys are a successful no-op.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: &str, key: &str) -> EngineResult<()> {
        require("user_id", user_id)?;
        require("key", key)?;
        self.guarded("delete", self.backend.delete_variable(user_id, key))
            .await
    }

    /// List the caller's variables. Never returns `null`-like results:
    /// no matches is an empty vector.
    #[instrument(skip(self, query))]
    pub async fn list(
        &self,
        user_id: &str,
        query: &VariableQuery,
    ) -> EngineResult<Vec<VariableWithTimestamp>> {
        require("user_id", user_id)?;
        query
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        self.guarded("list", self.backend.list_variables(user_id, query))
            .await
    }

    /// Count the caller's variables matching the query filters.
    #[instrument(skip(self, query))]
    pub async fn count(&self, user_id: &str, query: &VariableQuery) -> EngineResult<u64> {
        require("user_id", user_id)?;
        query
            .validate()
            .map_err(|e| EngineError::Validation(e.to_string()))?;
        self.guarded("count", self.backend.count_variables(user_id, query))
            .await
    }

    /// Apply all sets in order, then answer all gets in order.
    ///
    /// Not transactional: the first failing sub-operation aborts the batch
    /// and earlier sets stay applied.
    #[instrument(skip(self, request), fields(sets = request.set.len(), gets = request.get.len()))]
    pub async fn bulk(&self, user_id: &str, request: BulkRequest) -> EngineResult<BulkResponse> {
        let BulkRequest { get, set } = request;

        for (index, variable) in set.into_iter().enumerate() {
            if let Err(err) = self.set(user_id, variable).await {
                warn!(index, error = %err, "bulk set failed, aborting batch");
                return Err(err);
            }
        }

        let mut response = Vec::with_capacity(get.len());
        for (index, key) in get.iter().enumerate() {
            match self.get(user_id, key).await {
                Ok(variable) => response.push(variable),
                Err(err) => {
                    warn!(index, key = %key, error = %err, "bulk get failed, aborting batch");
                    return Err(err);
                }
            }
        }
        Ok(response)
    }

    // ── values ───────────────────────────────────────────────────────

    /// The bare value stored (or computed) under `key`; `null` if absent.
    pub async fn get_value(&self, user_id: &str, key: &str) -> EngineResult<Value> {
        Ok(self.get(user_id, key).await?.variable.value)
    }

    /// Store an untagged value.
    pub async fn set_value(&self, user_id: &str, key: &str, value: Value) -> EngineResult<()> {
        self.set(user_id, Variable::new(key, value)).await
    }

    /// Store a value tagged with a process definition.
    pub async fn set_definition_value(
        &self,
        user_id: &str,
        definition_id: &str,
        key: &str,
        value: Value,
    ) -> EngineResult<()> {
        require("definition_id", definition_id)?;
        self.set(
            user_id,
            Variable::new(key, value).with_process_definition(definition_id),
        )
        .await
    }

    /// Store a value tagged with a process definition and instance.
    pub async fn set_instance_value(
        &self,
        user_id: &str,
        definition_id: &str,
        instance_id: &str,
        key: &str,
        value: Value,
    ) -> EngineResult<()> {
        require("definition_id", definition_id)?;
        require("instance_id", instance_id)?;
        self.set(
            user_id,
            Variable::new(key, value)
                .with_process_definition(definition_id)
                .with_process_instance(instance_id),
        )
        .await
    }

    // ── cascading deletes ────────────────────────────────────────────

    /// Remove every variable of a process definition, for all users.
    ///
    /// Privileged; the caller is responsible for authorization.
    #[instrument(skip(self))]
    pub async fn delete_process_definition(&self, definition_id: &str) -> EngineResult<()> {
        require("definition_id", definition_id)?;
        let removed = self
            .guarded(
                "delete_process_definition",
                self.backend
                    .delete_variables_of_process_definition(definition_id),
            )
            .await?;
        info!(removed, "process definition variables deleted");
        Ok(())
    }

    /// Remove every variable of a process instance, for all users.
    ///
    /// Privileged; the caller is responsible for authorization.
    #[instrument(skip(self))]
    pub async fn delete_process_instance(&self, instance_id: &str) -> EngineResult<()> {
        require("instance_id", instance_id)?;
        let removed = self
            .guarded(
                "delete_process_instance",
                self.backend.delete_variables_of_process_instance(instance_id),
            )
            .await?;
        info!(removed, "process instance variables deleted");
        Ok(())
    }

    // ── internals ────────────────────────────────────────────────────

    /// Run a backend call under the storage deadline.
    async fn guarded<T, F>(&self, operation: &'static str, call: F) -> EngineResult<T>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| EngineError::storage(operation, e)),
            Err(_) => Err(EngineError::storage(
                operation,
                StoreError::Timeout {
                    operation,
                    after_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                },
            )),
        }
    }
}

fn require(field: &str, value: &str) -> EngineResult<()> {
    if value.is_empty() {
        return Err(EngineError::Validation(format!("missing {field}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use processio_store::StoreResult;

    /// A backend whose every call hangs forever.
    struct StalledBackend;

    #[async_trait]
    impl VariableBackend for StalledBackend {
        async fn get_variable(&self, _: &str, _: &str) -> StoreResult<StoredVariable> {
            std::future::pending().await
        }
        async fn set_variable(&self, _: StoredVariable) -> StoreResult<()> {
            std::future::pending().await
        }
        async fn delete_variable(&self, _: &str, _: &str) -> StoreResult<()> {
            std::future::pending().await
        }
        async fn list_variables(
            &self,
            _: &str,
            _: &VariableQuery,
        ) -> StoreResult<Vec<VariableWithTimestamp>> {
            std::future::pending().await
        }
        async fn count_variables(&self, _: &str, _: &VariableQuery) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn delete_variables_of_process_definition(&self, _: &str) -> StoreResult<u64> {
            std::future::pending().await
        }
        async fn delete_variables_of_process_instance(&self, _: &str) -> StoreResult<u64> {
            std::future::pending().await
        }
    }

    fn stalled() -> VariableEngine {
        VariableEngine::new(Arc::new(StalledBackend)).with_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn backend_calls_time_out_as_storage_errors() {
        let err = stalled().get("u", "k").await.unwrap_err();
        match &err {
            EngineError::Storage {
                operation,
                source: StoreError::Timeout { after_ms, .. },
            } => {
                assert_eq!(*operation, "get");
                assert_eq!(*after_ms, 20);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn computed_reads_never_reach_the_backend() {
        let v = stalled()
            .get("u", "calculate_UtcOffset_Asia/Hong_Kong")
            .await
            .unwrap();
        assert_eq!(v.variable.value, serde_json::json!(480));
    }

    #[tokio::test]
    async fn validation_happens_before_storage() {
        let engine = stalled();
        assert!(matches!(
            engine.get("", "k").await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.delete("u", "").await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine.delete_process_instance("").await,
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            engine
                .list("u", &VariableQuery::new().with_key_regex("("))
                .await,
            Err(EngineError::Validation(_))
        ));
    }
}
