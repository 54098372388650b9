//! Service configuration.
//!
//! Read from `config/default.toml` (or the `--config` path), then
//! overridden by `PROCESSIO_*` environment variables. A missing file means
//! defaults.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use processio_engine::DEFAULT_STORAGE_TIMEOUT;
use processio_store::{
    BackendKind, Database, DocumentStore, DocumentVariableStore, SqliteVariableStore,
    VariableBackend,
};
use serde::Deserialize;
use tracing::info;

/// Collection holding the variable documents.
const DOCUMENT_COLLECTION: &str = "variables";

/// Settings loaded from the `[store]` and `[logging]` sections.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Which backend to use: `sqlite` or `document`.
    pub database: BackendKind,
    pub sqlite_path: PathBuf,
    /// Snapshot file for the document backend; in-memory when unset.
    pub document_path: Option<PathBuf>,
    pub storage_timeout_ms: u64,
    /// Emit JSON log lines instead of the compact format.
    pub log_json: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database: BackendKind::Sqlite,
            sqlite_path: PathBuf::from("data/processio.db"),
            document_path: None,
            storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT.as_millis() as u64,
            log_json: false,
        }
    }
}

impl ServiceConfig {
    /// Load from `path`, then apply process environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Parse the TOML file at `path`; defaults if it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct File {
            store: ServiceConfig,
            logging: Logging,
        }
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Logging {
            json: bool,
        }

        let file: File = toml::from_str(content)?;
        Ok(Self {
            log_json: file.store.log_json || file.logging.json,
            ..file.store
        })
    }

    /// Apply `PROCESSIO_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PROCESSIO_DATABASE") {
            self.database = value.parse().context("PROCESSIO_DATABASE")?;
        }
        if let Some(value) = lookup("PROCESSIO_SQLITE_PATH") {
            self.sqlite_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("PROCESSIO_DOCUMENT_PATH") {
            self.document_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("PROCESSIO_TIMEOUT_MS") {
            self.storage_timeout_ms = value
                .parse()
                .with_context(|| format!("PROCESSIO_TIMEOUT_MS is not a number: {value}"))?;
        }
        Ok(())
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    /// Open the configured storage backend.
    pub async fn open_backend(&self) -> Result<Arc<dyn VariableBackend>> {
        match self.database {
            BackendKind::Sqlite => {
                ensure_parent_dir(&self.sqlite_path)?;
                let db = Database::open_and_migrate(self.sqlite_path.clone())
                    .await
                    .context("failed to open database")?;
                info!(path = %self.sqlite_path.display(), "sqlite backend ready");
                Ok(Arc::new(SqliteVariableStore::new(db)))
            }
            BackendKind::Document => {
                let store = match &self.document_path {
                    Some(path) => {
                        ensure_parent_dir(path)?;
                        DocumentStore::open(DOCUMENT_COLLECTION, path)
                            .context("failed to open document store")?
                    }
                    None => DocumentStore::open_in_memory(DOCUMENT_COLLECTION),
                };
                let backend = DocumentVariableStore::new(store)
                    .await
                    .context("failed to prepare document collection")?;
                info!(persistent = self.document_path.is_some(), "document backend ready");
                Ok(Arc::new(backend))
            }
        }
    }
}

/// Create the directory a data file lives in.
fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).context("failed to create data directory")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::from_file(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.storage_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn toml_sections_are_read() {
        let config = ServiceConfig::from_toml(
            r#"
            [store]
            database = "document"
            document_path = "data/vars.json"
            storage_timeout_ms = 2500

            [logging]
            json = true
            "#,
        )
        .unwrap();
        assert_eq!(config.database, BackendKind::Document);
        assert_eq!(config.document_path, Some(PathBuf::from("data/vars.json")));
        assert_eq!(config.storage_timeout_ms, 2500);
        assert_eq!(config.sqlite_path, PathBuf::from("data/processio.db"));
        assert!(config.log_json);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        assert!(ServiceConfig::from_toml("[store]\ndatabase = \"mongodb\"").is_err());
    }

    #[test]
    fn environment_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("PROCESSIO_DATABASE", "document"),
            ("PROCESSIO_DOCUMENT_PATH", "/tmp/v.json"),
            ("PROCESSIO_TIMEOUT_MS", "100"),
        ]
        .into();
        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database, BackendKind::Document);
        assert_eq!(config.document_path, Some(PathBuf::from("/tmp/v.json")));
        assert_eq!(config.storage_timeout(), Duration::from_millis(100));

        let mut config = ServiceConfig::default();
        let bad = config.apply_overrides(|name| {
            (name == "PROCESSIO_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(bad.is_err());
    }

    #[tokio::test]
    async fn both_backends_open() {
        let dir = tempfile::tempdir().unwrap();
        let sqlite = ServiceConfig {
            sqlite_path: dir.path().join("nested/vars.db"),
            ..ServiceConfig::default()
        };
        sqlite.open_backend().await.unwrap();
        assert!(dir.path().join("nested/vars.db").exists());

        let in_memory = ServiceConfig {
            database: BackendKind::Document,
            ..ServiceConfig::default()
        };
        in_memory.open_backend().await.unwrap();

        let snapshot = dir.path().join("docs/nested/variables.json");
        let document = ServiceConfig {
            database: BackendKind::Document,
            document_path: Some(snapshot.clone()),
            ..ServiceConfig::default()
        };
        document.open_backend().await.unwrap();
        assert!(snapshot.exists());
    }
}
