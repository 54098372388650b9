//! Variable backend on the embedded document store.
//!
//! Each variable is one document carrying every field explicitly (empty
//! process ids are stored as `""`, never omitted) so equality filters and
//! sorting behave exactly like the relational columns.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::collection::{FindOptions, IndexSpec, SortOrder};
use super::filter::Filter;
use super::{Document, DocumentStore};
use crate::backend::VariableBackend;
use crate::error::{StoreError, StoreResult};
use crate::model::{StoredVariable, Variable, VariableWithTimestamp};
use crate::query::{SortDirection, SortField, VariableQuery};

/// Document field names.
mod fields {
    pub const USER_ID: &str = "user_id";
    pub const KEY: &str = "key";
    pub const VALUE: &str = "value";
    pub const PROCESS_DEFINITION_ID: &str = "process_definition_id";
    pub const PROCESS_INSTANCE_ID: &str = "process_instance_id";
    pub const UNIX_TIMESTAMP_IN_S: &str = "unix_timestamp_in_s";
}

const INDEXES: &[IndexSpec] = &[
    IndexSpec {
        name: "variables_user_key_index",
        fields: &[fields::USER_ID, fields::KEY],
        unique: true,
    },
    IndexSpec {
        name: "variables_user_index",
        fields: &[fields::USER_ID],
        unique: false,
    },
    IndexSpec {
        name: "variables_p_instance_index",
        fields: &[fields::PROCESS_INSTANCE_ID],
        unique: false,
    },
    IndexSpec {
        name: "variables_p_definition_index",
        fields: &[fields::PROCESS_DEFINITION_ID],
        unique: false,
    },
];

/// Document field for a logical sort field.
pub fn sort_field(field: SortField) -> &'static str {
    match field {
        SortField::Key => fields::KEY,
        SortField::ProcessDefinitionId => fields::PROCESS_DEFINITION_ID,
        SortField::ProcessInstanceId => fields::PROCESS_INSTANCE_ID,
        SortField::UnixTimestampInS => fields::UNIX_TIMESTAMP_IN_S,
    }
}

/// [`VariableBackend`] backed by a [`DocumentStore`].
#[derive(Clone)]
pub struct DocumentVariableStore {
    store: DocumentStore,
}

impl DocumentVariableStore {
    /// Wrap `store`, creating the variable indexes if missing.
    pub async fn new(store: DocumentStore) -> StoreResult<Self> {
        store
            .execute_mut(|collection| {
                for spec in INDEXES {
                    collection.ensure_index(*spec)?;
                }
                Ok(())
            })
            .await?;
        info!("document variable indexes ensured");
        Ok(Self { store })
    }

    /// Fresh in-memory backend.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::new(DocumentStore::open_in_memory("variables")).await
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }
}

/// Translate query filters into a filter document.
fn query_filter(user_id: &str, query: &VariableQuery) -> StoreResult<Filter> {
    let mut filter = Filter::all().eq(fields::USER_ID, user_id);
    if !query.process_definition_id.is_empty() {
        filter = filter.eq(fields::PROCESS_DEFINITION_ID, query.process_definition_id.as_str());
    }
    if !query.process_instance_id.is_empty() {
        filter = filter.eq(fields::PROCESS_INSTANCE_ID, query.process_instance_id.as_str());
    }
    if let Some(pattern) = query.key_pattern()? {
        filter = filter.regex(fields::KEY, pattern);
    }
    Ok(filter)
}

fn find_options(query: &VariableQuery) -> FindOptions {
    let order = match query.sort.direction {
        SortDirection::Asc => SortOrder::Ascending,
        SortDirection::Desc => SortOrder::Descending,
    };
    FindOptions {
        sort: Some((sort_field(query.sort.field).to_string(), order)),
        skip: query.offset,
        limit: query.limit,
    }
}

fn user_key_filter(user_id: &str, key: &str) -> Filter {
    Filter::all()
        .eq(fields::USER_ID, user_id)
        .eq(fields::KEY, key)
}

fn to_document(stored: StoredVariable) -> Document {
    let StoredVariable { inner, user_id } = stored;
    let mut doc = Document::new();
    doc.insert(fields::USER_ID.into(), Value::String(user_id));
    doc.insert(fields::KEY.into(), Value::String(inner.variable.key));
    doc.insert(fields::VALUE.into(), inner.variable.value);
    doc.insert(
        fields::PROCESS_DEFINITION_ID.into(),
        Value::String(inner.variable.process_definition_id),
    );
    doc.insert(
        fields::PROCESS_INSTANCE_ID.into(),
        Value::String(inner.variable.process_instance_id),
    );
    doc.insert(
        fields::UNIX_TIMESTAMP_IN_S.into(),
        Value::from(inner.unix_timestamp_in_s),
    );
    doc
}

fn from_document(mut doc: Document) -> StoreResult<StoredVariable> {
    fn take_string(doc: &mut Document, field: &str) -> StoreResult<String> {
        match doc.remove(field) {
            Some(Value::String(s)) => Ok(s),
            Some(Value::Null) | None => Ok(String::new()),
            Some(other) => Err(StoreError::MalformedDocument(format!(
                "field {field} is not a string: {other}"
            ))),
        }
    }

    let unix_timestamp_in_s = match doc.get(fields::UNIX_TIMESTAMP_IN_S) {
        Some(value) => value.as_i64().ok_or_else(|| {
            StoreError::MalformedDocument(format!("{} is not an integer", fields::UNIX_TIMESTAMP_IN_S))
        })?,
        None => 0,
    };

    Ok(StoredVariable {
        user_id: take_string(&mut doc, fields::USER_ID)?,
        inner: VariableWithTimestamp {
            variable: Variable {
                key: take_string(&mut doc, fields::KEY)?,
                value: doc.remove(fields::VALUE).unwrap_or(Value::Null),
                process_definition_id: take_string(&mut doc, fields::PROCESS_DEFINITION_ID)?,
                process_instance_id: take_string(&mut doc, fields::PROCESS_INSTANCE_ID)?,
            },
            unix_timestamp_in_s,
        },
    })
}

#[async_trait]
impl VariableBackend for DocumentVariableStore {
    #[instrument(skip(self))]
    async fn get_variable(&self, user_id: &str, key: &str) -> StoreResult<StoredVariable> {
        let filter = user_key_filter(user_id, key);
        let found = self
            .store
            .execute(move |collection| Ok(collection.find_one(&filter)))
            .await?;
        match found {
            Some(doc) => from_document(doc),
            None => Ok(StoredVariable::not_found(user_id, key)),
        }
    }

    #[instrument(skip(self, variable), fields(user_id = %variable.user_id, key = %variable.key()))]
    async fn set_variable(&self, variable: StoredVariable) -> StoreResult<()> {
        let filter = user_key_filter(&variable.user_id, variable.key());
        let doc = to_document(variable);
        let result = self
            .store
            .execute_mut(move |collection| collection.replace_one(&filter, doc, true))
            .await?;
        debug!(upserted = result.upserted, "variable stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_variable(&self, user_id: &str, key: &str) -> StoreResult<()> {
        let filter = user_key_filter(user_id, key);
        let deleted = self
            .store
            .execute_mut(move |collection| Ok(collection.delete_many(&filter)))
            .await?;
        debug!(deleted, "variable delete executed");
        Ok(())
    }

    #[instrument(skip(self, query))]
    async fn list_variables(
        &self,
        user_id: &str,
        query: &VariableQuery,
    ) -> StoreResult<Vec<VariableWithTimestamp>> {
        let filter = query_filter(user_id, query)?;
        let options = find_options(query);
        let docs = self
            .store
            .execute(move |collection| Ok(collection.find(&filter, &options)))
            .await?;
        docs.into_iter()
            .map(|doc| from_document(doc).map(StoredVariable::into_timestamped))
            .collect()
    }

    #[instrument(skip(self, query))]
    async fn count_variables(&self, user_id: &str, query: &VariableQuery) -> StoreResult<u64> {
        let filter = query_filter(user_id, query)?;
        self.store
            .execute(move |collection| Ok(collection.count_documents(&filter)))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_variables_of_process_definition(
        &self,
        definition_id: &str,
    ) -> StoreResult<u64> {
        let filter = Filter::all().eq(fields::PROCESS_DEFINITION_ID, definition_id);
        self.store
            .execute_mut(move |collection| Ok(collection.delete_many(&filter)))
            .await
    }

    #[instrument(skip(self))]
    async fn delete_variables_of_process_instance(&self, instance_id: &str) -> StoreResult<u64> {
        let filter = Filter::all().eq(fields::PROCESS_INSTANCE_ID, instance_id);
        self.store
            .execute_mut(move |collection| Ok(collection.delete_many(&filter)))
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn all_indexes_are_created() {
        let backend = DocumentVariableStore::in_memory().await.unwrap();
        let names = backend
            .store()
            .execute(|c| Ok(c.index_names()))
            .await
            .unwrap();
        assert_eq!(
            names,
            vec![
                "variables_user_key_index",
                "variables_user_index",
                "variables_p_instance_index",
                "variables_p_definition_index",
            ]
        );
    }

    #[test]
    fn documents_carry_every_field() {
        let doc = to_document(StoredVariable::new("u", Variable::new("k", json!([1])), 5));
        assert_eq!(doc[fields::PROCESS_DEFINITION_ID], json!(""));
        assert_eq!(doc[fields::PROCESS_INSTANCE_ID], json!(""));
        assert_eq!(doc[fields::UNIX_TIMESTAMP_IN_S], json!(5));

        let back = from_document(doc).unwrap();
        assert_eq!(back.user_id, "u");
        assert_eq!(back.inner.variable.value, json!([1]));
    }

    #[test]
    fn malformed_documents_are_reported() {
        let doc = json!({"user_id": "u", "key": 3, "unix_timestamp_in_s": 1})
            .as_object()
            .cloned()
            .unwrap();
        let err = from_document(doc).unwrap_err();
        assert!(matches!(err, StoreError::MalformedDocument(_)));
    }

    #[test]
    fn query_translates_to_filter_document() {
        let query = VariableQuery::new()
            .with_process_instance("i1")
            .with_key_regex("^f");
        let filter = query_filter("u", &query).unwrap();
        assert_eq!(filter.equality(fields::USER_ID), Some(&json!("u")));
        assert_eq!(filter.equality(fields::PROCESS_INSTANCE_ID), Some(&json!("i1")));
        assert_eq!(filter.equality(fields::PROCESS_DEFINITION_ID), None);

        let doc = to_document(StoredVariable::new(
            "u",
            Variable::new("foo", json!(1)).with_process_instance("i1"),
            1,
        ));
        assert!(filter.matches(&doc));
    }
}
