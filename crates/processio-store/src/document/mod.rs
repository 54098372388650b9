//! Embedded document store.
//!
//! A [`DocumentStore`] owns one [`Collection`] of JSON documents behind an
//! `Arc<RwLock<>>`. Like [`Database`](crate::Database), every access runs
//! on the blocking pool via `tokio::task::spawn_blocking`. When opened with
//! a path, the collection is loaded from a JSON snapshot and the snapshot
//! is rewritten atomically (temp file + rename) after every mutation.

pub mod collection;
pub mod filter;
mod variables;

use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

pub use collection::{Collection, FindOptions, IndexSpec, ReplaceResult, SortOrder};
pub use filter::Filter;
pub use variables::{DocumentVariableStore, sort_field};

/// A single stored document.
pub type Document = serde_json::Map<String, serde_json::Value>;

/// Thread-safe handle to a document collection.
#[derive(Clone)]
pub struct DocumentStore {
    collection: Arc<RwLock<Collection>>,
    snapshot: Option<Arc<PathBuf>>,
}

impl DocumentStore {
    /// Open (or create) a collection persisted at `path`.
    ///
    /// Blocks on file I/O; call during startup.
    pub fn open(name: &str, path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), collection = name, "opening document store");

        let documents: Vec<Document> = if path.exists() {
            let file = std::fs::File::open(path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            Vec::new()
        };
        debug!(documents = documents.len(), "document snapshot loaded");

        Ok(Self {
            collection: Arc::new(RwLock::new(Collection::from_documents(name, documents))),
            snapshot: Some(Arc::new(path.to_path_buf())),
        })
    }

    /// A collection that lives only in memory, useful for tests.
    pub fn open_in_memory(name: &str) -> Self {
        debug!(collection = name, "opening in-memory document store");
        Self {
            collection: Arc::new(RwLock::new(Collection::new(name))),
            snapshot: None,
        }
    }

    /// Run a read-only closure against the collection on the blocking pool.
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Collection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let collection = Arc::clone(&self.collection);
        tokio::task::spawn_blocking(move || {
            let collection = collection
                .read()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            f(&collection)
        })
        .await?
    }

    /// Run a mutating closure, then persist the snapshot if one is configured.
    ///
    /// With a snapshot the closure runs on a working copy that replaces the
    /// live collection only once the snapshot is on disk, so a failed write
    /// leaves both unchanged. The write lock is held throughout so
    /// snapshots never interleave.
    pub async fn execute_mut<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Collection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let collection = Arc::clone(&self.collection);
        let snapshot = self.snapshot.clone();
        tokio::task::spawn_blocking(move || {
            let mut collection = collection
                .write()
                .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
            match snapshot {
                Some(path) => {
                    let mut working = collection.clone();
                    let result = f(&mut working)?;
                    write_snapshot(&working, &path)?;
                    *collection = working;
                    Ok(result)
                }
                None => f(&mut collection),
            }
        })
        .await?
    }
}

fn write_snapshot(collection: &Collection, path: &Path) -> StoreResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        let documents: Vec<&Document> = collection.documents().collect();
        serde_json::to_writer(&mut writer, &documents)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    debug!(path = %path.display(), documents = collection.len(), "document snapshot written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");

        let store = DocumentStore::open("things", &path).unwrap();
        store
            .execute_mut(|c| {
                let doc = json!({"name": "a"}).as_object().cloned().unwrap_or_default();
                c.insert_one(doc)
            })
            .await
            .unwrap();
        drop(store);

        let reopened = DocumentStore::open("things", &path).unwrap();
        let count = reopened
            .execute(|c| Ok(c.count_documents(&Filter::all().eq("name", "a"))))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn failed_snapshot_discards_the_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");
        std::fs::create_dir(&data).unwrap();
        let store = DocumentStore::open("things", data.join("docs.json")).unwrap();
        std::fs::remove_dir(&data).unwrap();

        let result = store
            .execute_mut(|c| c.insert_one(json!({"name": "a"}).as_object().cloned().unwrap()))
            .await;
        assert!(matches!(result, Err(StoreError::Io(_))));

        let len = store.execute(|c| Ok(c.len())).await.unwrap();
        assert_eq!(len, 0);
    }

    #[tokio::test]
    async fn in_memory_store_writes_no_files() {
        let store = DocumentStore::open_in_memory("things");
        let len = store
            .execute_mut(|c| {
                c.insert_one(Document::new())?;
                Ok(c.len())
            })
            .await
            .unwrap();
        assert_eq!(len, 1);
    }
}
