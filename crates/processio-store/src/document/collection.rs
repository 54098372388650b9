//! An in-process collection of JSON documents with secondary indexes.
//!
//! Documents get an internal id on insert; ids increase monotonically so
//! iterating `documents` yields insertion order. Indexes map the rendered
//! values of their fields to the ids holding them and are kept in step
//! with every mutation. `find` picks the most selective index whose fields
//! are all pinned by equality terms in the filter, then evaluates the full
//! filter over the candidates.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use super::Document;
use super::filter::Filter;
use crate::error::{StoreError, StoreResult};

/// Declarative index definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub unique: bool,
}

#[derive(Debug, Clone)]
struct Index {
    spec: IndexSpec,
    entries: BTreeMap<Vec<String>, BTreeSet<u64>>,
}

impl Index {
    fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    fn key_of(&self, doc: &Document) -> Vec<String> {
        self.spec
            .fields
            .iter()
            .map(|field| render(doc.get(*field).unwrap_or(&Value::Null)))
            .collect()
    }

    /// Index key pinned by `filter`, if every indexed field has an equality term.
    fn key_for(&self, filter: &Filter) -> Option<Vec<String>> {
        self.spec
            .fields
            .iter()
            .map(|field| filter.equality(field).map(render))
            .collect()
    }

    fn insert(&mut self, id: u64, doc: &Document) {
        let key = self.key_of(doc);
        self.entries.entry(key).or_default().insert(id);
    }

    fn remove(&mut self, id: u64, doc: &Document) {
        let key = self.key_of(doc);
        if let Some(ids) = self.entries.get_mut(&key) {
            ids.remove(&id);
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Id of another document that would collide with `doc` on a unique index.
    fn conflict(&self, doc: &Document, replacing: Option<u64>) -> Option<u64> {
        if !self.spec.unique {
            return None;
        }
        self.entries
            .get(&self.key_of(doc))
            .and_then(|ids| ids.iter().copied().find(|id| Some(*id) != replacing))
    }
}

/// Index values are rendered to strings; strings map to themselves.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Sort order for [`FindOptions`]: `1` ascending, `-1` descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort, skip and limit applied by [`Collection::find`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub skip: u64,
    /// `0` means unlimited.
    pub limit: u64,
}

/// Outcome of [`Collection::replace_one`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceResult {
    pub matched: u64,
    pub upserted: bool,
}

/// A named set of documents plus their indexes.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    next_id: u64,
    documents: BTreeMap<u64, Document>,
    indexes: Vec<Index>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_id: 1,
            documents: BTreeMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Build a collection from previously snapshotted documents.
    pub fn from_documents(name: impl Into<String>, documents: Vec<Document>) -> Self {
        let mut collection = Self::new(name);
        for doc in documents {
            let id = collection.next_id;
            collection.next_id += 1;
            collection.documents.insert(id, doc);
        }
        collection
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents in insertion order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.documents.values()
    }

    pub fn index_names(&self) -> Vec<&'static str> {
        self.indexes.iter().map(|i| i.spec.name).collect()
    }

    /// Create an index unless one with the same name exists.
    ///
    /// Existing documents are indexed immediately; a unique index fails if
    /// they already collide.
    pub fn ensure_index(&mut self, spec: IndexSpec) -> StoreResult<()> {
        if self.indexes.iter().any(|i| i.spec.name == spec.name) {
            return Ok(());
        }
        let mut index = Index::new(spec);
        for (id, doc) in &self.documents {
            if index.conflict(doc, None).is_some() {
                return Err(StoreError::MalformedDocument(format!(
                    "duplicate key while building unique index {}",
                    spec.name
                )));
            }
            index.insert(*id, doc);
        }
        debug!(collection = %self.name, index = spec.name, "index ensured");
        self.indexes.push(index);
        Ok(())
    }

    pub fn find(&self, filter: &Filter, options: &FindOptions) -> Vec<Document> {
        let mut matched: Vec<&Document> = self
            .candidates(filter)
            .into_iter()
            .filter_map(|id| self.documents.get(&id))
            .filter(|doc| filter.matches(doc))
            .collect();

        if let Some((field, order)) = &options.sort {
            matched.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(field).unwrap_or(&Value::Null),
                    b.get(field).unwrap_or(&Value::Null),
                );
                match order {
                    SortOrder::Ascending => ordering,
                    SortOrder::Descending => ordering.reverse(),
                }
            });
        }

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = match options.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        matched.into_iter().skip(skip).take(limit).cloned().collect()
    }

    pub fn find_one(&self, filter: &Filter) -> Option<Document> {
        self.candidates(filter)
            .into_iter()
            .filter_map(|id| self.documents.get(&id))
            .find(|doc| filter.matches(doc))
            .cloned()
    }

    pub fn count_documents(&self, filter: &Filter) -> u64 {
        self.candidates(filter)
            .into_iter()
            .filter_map(|id| self.documents.get(&id))
            .filter(|doc| filter.matches(doc))
            .count() as u64
    }

    /// Replace the first document matching `filter` with `doc`.
    ///
    /// With `upsert`, inserts `doc` when nothing matches. The replacement
    /// keeps the matched document's internal id.
    pub fn replace_one(
        &mut self,
        filter: &Filter,
        doc: Document,
        upsert: bool,
    ) -> StoreResult<ReplaceResult> {
        let existing = self
            .candidates(filter)
            .into_iter()
            .find(|id| self.documents.get(id).is_some_and(|d| filter.matches(d)));

        match existing {
            Some(id) => {
                self.check_unique(&doc, Some(id))?;
                if let Some(old) = self.documents.remove(&id) {
                    self.unindex(id, &old);
                }
                self.index(id, &doc);
                self.documents.insert(id, doc);
                Ok(ReplaceResult {
                    matched: 1,
                    upserted: false,
                })
            }
            None if upsert => {
                self.insert_one(doc)?;
                Ok(ReplaceResult {
                    matched: 0,
                    upserted: true,
                })
            }
            None => Ok(ReplaceResult {
                matched: 0,
                upserted: false,
            }),
        }
    }

    pub fn insert_one(&mut self, doc: Document) -> StoreResult<u64> {
        self.check_unique(&doc, None)?;
        let id = self.next_id;
        self.next_id += 1;
        self.index(id, &doc);
        self.documents.insert(id, doc);
        Ok(id)
    }

    /// Remove every matching document, returning how many were removed.
    pub fn delete_many(&mut self, filter: &Filter) -> u64 {
        let doomed: Vec<u64> = self
            .candidates(filter)
            .into_iter()
            .filter(|id| self.documents.get(id).is_some_and(|d| filter.matches(d)))
            .collect();

        for id in &doomed {
            if let Some(old) = self.documents.remove(id) {
                self.unindex(*id, &old);
            }
        }
        doomed.len() as u64
    }

    // ── internals ────────────────────────────────────────────────────

    /// Ids worth evaluating `filter` against, in insertion order.
    fn candidates(&self, filter: &Filter) -> Vec<u64> {
        let best = self
            .indexes
            .iter()
            .filter_map(|index| index.key_for(filter).map(|key| (index, key)))
            .max_by_key(|(index, _)| (index.spec.unique, index.spec.fields.len()));

        match best {
            Some((index, key)) => index
                .entries
                .get(&key)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            None => self.documents.keys().copied().collect(),
        }
    }

    fn check_unique(&self, doc: &Document, replacing: Option<u64>) -> StoreResult<()> {
        for index in &self.indexes {
            if index.conflict(doc, replacing).is_some() {
                return Err(StoreError::MalformedDocument(format!(
                    "duplicate key for unique index {} in collection {}",
                    index.spec.name, self.name
                )));
            }
        }
        Ok(())
    }

    fn index(&mut self, id: u64, doc: &Document) {
        for index in &mut self.indexes {
            index.insert(id, doc);
        }
    }

    fn unindex(&mut self, id: u64, doc: &Document) {
        for index in &mut self.indexes {
            index.remove(id, doc);
        }
    }
}

/// Total order over JSON values used for sorting.
///
/// Types rank null < bool < number < string < array < object; values of
/// the same type compare naturally, strings by byte order.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x
                .as_f64()
                .unwrap_or(0.0)
                .total_cmp(&y.as_f64().unwrap_or(0.0)),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => match rank(a).cmp(&rank(b)) {
            Ordering::Equal => a.to_string().cmp(&b.to_string()),
            other => other,
        },
    }
}
