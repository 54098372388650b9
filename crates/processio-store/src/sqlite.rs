//! Relational variable backend on SQLite.
//!
//! Variables live in the `variables` table, one row per
//! `(user_id, variable_key)`. Values are stored as JSON text. Listing
//! builds its `WHERE` clause dynamically from the query options with
//! positional parameters; key search uses the `REGEXP` function installed
//! by [`Database`].

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use tracing::{debug, instrument};

use crate::backend::VariableBackend;
use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::model::{StoredVariable, Variable, VariableWithTimestamp};
use crate::query::{SortDirection, SortField, VariableQuery};

const SELECT_COLUMNS: &str =
    "variable_key, process_definition_id, process_instance_id, unix_timestamp_in_s, variable_value";

/// [`VariableBackend`] backed by a SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteVariableStore {
    db: Database,
}

impl SqliteVariableStore {
    /// Wrap an already migrated database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

/// Physical column for a logical sort field.
pub fn sort_column(field: SortField) -> &'static str {
    match field {
        SortField::Key => "variable_key",
        SortField::ProcessDefinitionId => "process_definition_id",
        SortField::ProcessInstanceId => "process_instance_id",
        SortField::UnixTimestampInS => "unix_timestamp_in_s",
    }
}

fn sort_keyword(direction: SortDirection) -> &'static str {
    match direction {
        SortDirection::Asc => "ASC",
        SortDirection::Desc => "DESC",
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug)]
struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    /// `SELECT <columns> FROM variables WHERE <filters>`.
    fn filtered(columns: &str, user_id: &str, query: &VariableQuery) -> Self {
        let mut params = vec![SqlValue::Text(user_id.to_string())];
        let mut conditions = vec!["user_id = ?1".to_string()];

        if !query.process_definition_id.is_empty() {
            params.push(SqlValue::Text(query.process_definition_id.clone()));
            conditions.push(format!("process_definition_id = ?{}", params.len()));
        }
        if !query.process_instance_id.is_empty() {
            params.push(SqlValue::Text(query.process_instance_id.clone()));
            conditions.push(format!("process_instance_id = ?{}", params.len()));
        }
        if !query.key_regex.is_empty() {
            params.push(SqlValue::Text(query.key_regex.clone()));
            conditions.push(format!("variable_key REGEXP ?{}", params.len()));
        }

        Self {
            sql: format!(
                "SELECT {columns} FROM variables WHERE {}",
                conditions.join(" AND ")
            ),
            params,
        }
    }

    /// Full listing statement: filters, ordering, then paging.
    fn list(user_id: &str, query: &VariableQuery) -> Self {
        let mut stmt = Self::filtered(SELECT_COLUMNS, user_id, query);
        stmt.sql.push_str(&format!(
            " ORDER BY {} {}",
            sort_column(query.sort.field),
            sort_keyword(query.sort.direction)
        ));

        // SQLite requires a LIMIT before OFFSET; -1 means unbounded.
        if query.limit > 0 || query.offset > 0 {
            let limit = if query.limit > 0 { to_sql_int(query.limit) } else { -1 };
            stmt.params.push(SqlValue::Integer(limit));
            stmt.params.push(SqlValue::Integer(to_sql_int(query.offset)));
            stmt.sql.push_str(&format!(
                " LIMIT ?{} OFFSET ?{}",
                stmt.params.len() - 1,
                stmt.params.len()
            ));
        }
        stmt
    }

    fn count(user_id: &str, query: &VariableQuery) -> Self {
        Self::filtered("COUNT(*)", user_id, query)
    }
}

fn to_sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[async_trait]
impl VariableBackend for SqliteVariableStore {
    #[instrument(skip(self))]
    async fn get_variable(&self, user_id: &str, key: &str) -> StoreResult<StoredVariable> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM variables WHERE user_id = ?1 AND variable_key = ?2"
                    ),
                    rusqlite::params![user_id, key],
                    VariableRow::from_row,
                );
                match result {
                    Ok(row) => Ok(StoredVariable {
                        inner: row.into_timestamped()?,
                        user_id,
                    }),
                    Err(rusqlite::Error::QueryReturnedNoRows) => {
                        Ok(StoredVariable::not_found(user_id, key))
                    }
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    #[instrument(skip(self, variable), fields(user_id = %variable.user_id, key = %variable.key()))]
    async fn set_variable(&self, variable: StoredVariable) -> StoreResult<()> {
        let value_json = serde_json::to_string(&variable.inner.variable.value)?;
        let StoredVariable { inner, user_id } = variable;
        let VariableWithTimestamp {
            variable,
            unix_timestamp_in_s,
        } = inner;

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO variables (user_id, variable_key, process_definition_id, process_instance_id, unix_timestamp_in_s, variable_value) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT (user_id, variable_key) DO UPDATE \
                     SET process_definition_id = excluded.process_definition_id, \
                         process_instance_id = excluded.process_instance_id, \
                         unix_timestamp_in_s = excluded.unix_timestamp_in_s, \
                         variable_value = excluded.variable_value",
                    rusqlite::params![
                        user_id,
                        variable.key,
                        variable.process_definition_id,
                        variable.process_instance_id,
                        unix_timestamp_in_s,
                        value_json
                    ],
                )?;
                Ok(())
            })
            .await?;

        debug!("variable stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_variable(&self, user_id: &str, key: &str) -> StoreResult<()> {
        let user_id = user_id.to_string();
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM variables WHERE user_id = ?1 AND variable_key = ?2",
                    rusqlite::params![user_id, key],
                )?;
                debug!(deleted, "variable delete executed");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, query))]
    async fn list_variables(
        &self,
        user_id: &str,
        query: &VariableQuery,
    ) -> StoreResult<Vec<VariableWithTimestamp>> {
        let stmt = Statement::list(user_id, query);
        debug!(sql = %stmt.sql, "listing variables");

        self.db
            .execute(move |conn| {
                let mut prepared = conn.prepare(&stmt.sql)?;
                let rows = prepared
                    .query_map(
                        rusqlite::params_from_iter(stmt.params.iter()),
                        VariableRow::from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;

                rows.into_iter().map(VariableRow::into_timestamped).collect()
            })
            .await
    }

    #[instrument(skip(self, query))]
    async fn count_variables(&self, user_id: &str, query: &VariableQuery) -> StoreResult<u64> {
        let stmt = Statement::count(user_id, query);
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    &stmt.sql,
                    rusqlite::params_from_iter(stmt.params.iter()),
                    |row| row.get(0),
                )?;
                Ok(u64::try_from(count).unwrap_or(0))
            })
            .await
    }

    #[instrument(skip(self))]
    async fn delete_variables_of_process_definition(
        &self,
        definition_id: &str,
    ) -> StoreResult<u64> {
        let definition_id = definition_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM variables WHERE process_definition_id = ?1",
                    rusqlite::params![definition_id],
                )?;
                Ok(deleted as u64)
            })
            .await
    }

    #[instrument(skip(self))]
    async fn delete_variables_of_process_instance(&self, instance_id: &str) -> StoreResult<u64> {
        let instance_id = instance_id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM variables WHERE process_instance_id = ?1",
                    rusqlite::params![instance_id],
                )?;
                Ok(deleted as u64)
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal row mapping
// ═══════════════════════════════════════════════════════════════════════

/// Raw row data from SQLite before JSON deserialization.
///
/// Keeps the `rusqlite` row-mapping closure infallible with respect to
/// JSON, then converts in a second step that can return `StoreError::Json`.
struct VariableRow {
    key: String,
    process_definition_id: String,
    process_instance_id: String,
    unix_timestamp_in_s: i64,
    value: String,
}

impl VariableRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            process_definition_id: row.get(1)?,
            process_instance_id: row.get(2)?,
            unix_timestamp_in_s: row.get(3)?,
            value: row.get(4)?,
        })
    }

    fn into_timestamped(self) -> StoreResult<VariableWithTimestamp> {
        Ok(VariableWithTimestamp {
            variable: Variable {
                key: self.key,
                value: serde_json::from_str(&self.value)?,
                process_definition_id: self.process_definition_id,
                process_instance_id: self.process_instance_id,
            },
            unix_timestamp_in_s: self.unix_timestamp_in_s,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Sort;
    use serde_json::json;

    async fn setup_store() -> SqliteVariableStore {
        SqliteVariableStore::new(Database::open_in_memory_and_migrate().await.unwrap())
    }

    #[test]
    fn list_statement_numbers_parameters_in_order() {
        let query = VariableQuery::new()
            .with_process_definition("d1")
            .with_process_instance("i1")
            .with_key_regex("foo")
            .with_limit(2)
            .with_offset(4);
        let stmt = Statement::list("u", &query);
        assert_eq!(
            stmt.sql,
            "SELECT variable_key, process_definition_id, process_instance_id, unix_timestamp_in_s, variable_value \
             FROM variables WHERE user_id = ?1 AND process_definition_id = ?2 AND process_instance_id = ?3 \
             AND variable_key REGEXP ?4 ORDER BY variable_key ASC LIMIT ?5 OFFSET ?6"
        );
        assert_eq!(stmt.params.len(), 6);
        assert_eq!(stmt.params[4], SqlValue::Integer(2));
        assert_eq!(stmt.params[5], SqlValue::Integer(4));
    }

    #[test]
    fn offset_without_limit_is_unbounded() {
        let stmt = Statement::list("u", &VariableQuery::new().with_offset(3));
        assert!(stmt.sql.ends_with("LIMIT ?2 OFFSET ?3"));
        assert_eq!(stmt.params[1], SqlValue::Integer(-1));
    }

    #[test]
    fn count_statement_ignores_sort_and_paging() {
        let query = VariableQuery::new()
            .with_sort("key.desc".parse::<Sort>().unwrap())
            .with_limit(1);
        let stmt = Statement::count("u", &query);
        assert_eq!(stmt.sql, "SELECT COUNT(*) FROM variables WHERE user_id = ?1");
    }

    #[tokio::test]
    async fn value_shapes_survive_storage() {
        let store = setup_store().await;
        let shapes = [
            json!(null),
            json!(3.5),
            json!("text"),
            json!(true),
            json!({"nested": {"list": [1, "two", null]}}),
        ];
        for (i, value) in shapes.iter().enumerate() {
            let key = format!("k{i}");
            store
                .set_variable(StoredVariable::new("u", Variable::new(&key, value.clone()), 10))
                .await
                .unwrap();
            let fetched = store.get_variable("u", &key).await.unwrap();
            assert_eq!(&fetched.inner.variable.value, value);
        }
    }

    #[tokio::test]
    async fn upsert_replaces_process_tags() {
        let store = setup_store().await;
        store
            .set_variable(StoredVariable::new(
                "u",
                Variable::new("k", json!(1))
                    .with_process_definition("d1")
                    .with_process_instance("i1"),
                1,
            ))
            .await
            .unwrap();
        store
            .set_variable(StoredVariable::new("u", Variable::new("k", json!(2)), 2))
            .await
            .unwrap();

        let fetched = store.get_variable("u", "k").await.unwrap();
        assert_eq!(fetched.inner.variable.value, json!(2));
        assert_eq!(fetched.inner.variable.process_definition_id, "");
        assert_eq!(fetched.inner.variable.process_instance_id, "");
        assert_eq!(fetched.inner.unix_timestamp_in_s, 2);
    }
}
