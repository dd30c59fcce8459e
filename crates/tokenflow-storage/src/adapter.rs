use crate::schema::{
    backup_key, backup_prefix, classify, project_key, LegacyTokenState, PersistedProjectStorage,
    StoredRecord, MAX_STORAGE_BYTES,
};
use crate::store::KeyValueStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokenflow_common::{Result, Token, TokenflowError};
use tokenflow_core::TokenProcessor;
use tracing::{debug, info, warn};

/// A stored backup of a legacy project record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupInfo {
    pub key: String,
    /// Unix milliseconds at which the backup was written
    pub timestamp: i64,
}

/// Versioned project persistence with one-way legacy migration
pub struct StorageAdapter {
    store: Arc<dyn KeyValueStore>,
    processor: Arc<TokenProcessor>,
    source: String,
    project_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl StorageAdapter {
    pub fn new(store: Arc<dyn KeyValueStore>, processor: Arc<TokenProcessor>) -> Self {
        Self {
            store,
            processor,
            source: "tokenflow".to_string(),
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Label written into `metadata.source` on save
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Load a project's tokens, migrating a legacy record in place.
    ///
    /// An absent record is an empty project. Loads of the same project are serialized so a
    /// legacy record is migrated exactly once.
    pub async fn load(&self, project_id: &str) -> Result<Vec<Token>> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let raw = self
            .store
            .get(&project_key(project_id))
            .await
            .map_err(store_error)?;

        let Some(raw) = raw else {
            debug!("No stored record for project {}", project_id);
            return Ok(Vec::new());
        };

        match classify(project_id, &raw)? {
            StoredRecord::Current(record) => {
                debug!("Loaded {} tokens for project {}", record.tokens.len(), project_id);
                Ok(record.tokens)
            }
            StoredRecord::Legacy(legacy) => self.migrate(project_id, &raw, legacy).await,
        }
    }

    /// Persist tokens under the current schema version.
    ///
    /// Records over [`MAX_STORAGE_BYTES`] are rejected without touching the stored record.
    pub async fn save(&self, project_id: &str, tokens: &[Token]) -> Result<()> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;
        self.persist(project_id, tokens).await
    }

    /// Copy a backup verbatim over the live project record
    pub async fn restore_from_backup(&self, project_id: &str, timestamp: i64) -> Result<()> {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let key = backup_key(project_id, timestamp);
        let raw = self
            .store
            .get(&key)
            .await
            .map_err(store_error)?
            .ok_or_else(|| TokenflowError::BackupNotFound(key.clone()))?;

        self.store
            .set(&project_key(project_id), &raw)
            .await
            .map_err(store_error)?;
        info!("Restored project {} from {}", project_id, key);
        Ok(())
    }

    /// Backups for a project, oldest first
    pub async fn list_backups(&self, project_id: &str) -> Result<Vec<BackupInfo>> {
        let prefix = backup_prefix(project_id);
        let keys = self
            .store
            .keys_with_prefix(&prefix)
            .await
            .map_err(store_error)?;

        let mut backups: Vec<BackupInfo> = keys
            .into_iter()
            .filter_map(|key| {
                let timestamp = key.strip_prefix(&prefix)?.parse::<i64>().ok()?;
                Some(BackupInfo { key, timestamp })
            })
            .collect();
        backups.sort_by_key(|b| b.timestamp);
        Ok(backups)
    }

    /// Delete all but the newest `keep` backups, returning how many were removed
    pub async fn prune_backups(&self, project_id: &str, keep: usize) -> Result<usize> {
        let backups = self.list_backups(project_id).await?;
        let excess = backups.len().saturating_sub(keep);

        for backup in backups.iter().take(excess) {
            self.store.delete(&backup.key).await.map_err(store_error)?;
            debug!("Pruned {}", backup.key);
        }

        if excess > 0 {
            info!("Pruned {} backups for project {}", excess, project_id);
        }
        Ok(excess)
    }

    async fn migrate(&self, project_id: &str, raw: &str, legacy: LegacyTokenState) -> Result<Vec<Token>> {
        let start = Instant::now();
        info!(
            "Migrating legacy record for project {} ({} files)",
            project_id,
            legacy.token_files.len()
        );

        let key = self
            .backup_legacy(project_id, raw)
            .await
            .map_err(|e| TokenflowError::BackupFailed {
                project_id: project_id.to_string(),
                reason: e.to_string(),
            })?;
        info!("Legacy record for project {} backed up at {}", project_id, key);

        let migration_failed = |reason: String| TokenflowError::MigrationFailed {
            project_id: project_id.to_string(),
            reason,
        };

        let census = legacy.census();
        // One id per path: a path defined by several files cannot survive as separate tokens
        if let Some((path, files)) = census.repeated_paths.iter().next() {
            return Err(migration_failed(format!(
                "token '{}' is defined in {} ({} conflicting paths in total)",
                path,
                files.join(", "),
                census.repeated_paths.len()
            )));
        }

        let tokens = if census.is_empty() {
            debug!("Legacy record for project {} holds no tokens", project_id);
            Vec::new()
        } else {
            let options = legacy.process_options(project_id);
            let tokens = self
                .processor
                .process_multiple_files(&legacy.files(), &options)
                .map_err(|e| migration_failed(e.to_string()))?;

            if tokens.len() != census.leaf_count {
                return Err(migration_failed(format!(
                    "legacy content holds {} tokens but migration produced {}",
                    census.leaf_count,
                    tokens.len()
                )));
            }
            tokens
        };

        self.persist(project_id, &tokens)
            .await
            .map_err(|e| migration_failed(e.to_string()))?;

        info!(
            "Migrated {} tokens for project {} in {:.2}s",
            tokens.len(),
            project_id,
            start.elapsed().as_secs_f64()
        );
        Ok(tokens)
    }

    /// Write the legacy blob under a fresh backup key, unless the newest backup already holds it
    async fn backup_legacy(&self, project_id: &str, raw: &str) -> Result<String> {
        if let Some(latest) = self.list_backups(project_id).await?.pop() {
            let existing = self.store.get(&latest.key).await.map_err(store_error)?;
            if existing.as_deref() == Some(raw) {
                debug!("Reusing {} for project {}", latest.key, project_id);
                return Ok(latest.key);
            }
        }

        let key = backup_key(project_id, Utc::now().timestamp_millis());
        self.store.set(&key, raw).await.map_err(store_error)?;
        Ok(key)
    }

    async fn persist(&self, project_id: &str, tokens: &[Token]) -> Result<()> {
        let record = PersistedProjectStorage::new(project_id, tokens.to_vec(), &self.source);
        let serialized = serde_json::to_string(&record)?;

        if serialized.len() > MAX_STORAGE_BYTES {
            warn!(
                "Refusing to save project {}: {} bytes over the storage limit",
                project_id,
                serialized.len()
            );
            return Err(TokenflowError::SizeLimitExceeded {
                size: serialized.len(),
                limit: MAX_STORAGE_BYTES,
            });
        }

        self.store
            .set(&project_key(project_id), &serialized)
            .await
            .map_err(store_error)?;
        debug!(
            "Saved {} tokens ({} bytes) for project {}",
            tokens.len(),
            serialized.len(),
            project_id
        );
        Ok(())
    }

    fn project_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .project_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Entries only the map still holds are idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(project_id.to_string()).or_default().clone()
    }
}

fn store_error(error: anyhow::Error) -> TokenflowError {
    TokenflowError::Store(format!("{:#}", error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::CURRENT_VERSION;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokenflow_core::ProcessOptions;

    /// Delegates to a memory store, failing writes under one key prefix
    struct FailingStore {
        inner: MemoryStore,
        fail_prefix: &'static str,
    }

    #[async_trait]
    impl KeyValueStore for FailingStore {
        async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            if key.starts_with(self.fail_prefix) {
                anyhow::bail!("quota exceeded");
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }

        async fn keys_with_prefix(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
            self.inner.keys_with_prefix(prefix).await
        }
    }

    fn adapter_with(store: Arc<dyn KeyValueStore>) -> StorageAdapter {
        StorageAdapter::new(store, Arc::new(TokenProcessor::with_defaults()))
    }

    fn legacy_record() -> Value {
        json!({
            "tokenFiles": {
                "primitives/colors.json": {
                    "color": {
                        "red": { "$value": "#ff0000", "$type": "color" },
                        "blue": { "$value": "#0000ff", "$type": "color" }
                    }
                },
                "semantic.json": "{\"brand\":{\"primary\":{\"value\":\"{color.red}\",\"type\":\"color\"}}}",
                "components/button.json": {
                    "button": {
                        "padding": { "value": "8px" },
                        "radius": { "value": "4px" }
                    }
                }
            },
            "tokenSource": "github",
            "githubConfig": { "owner": "acme", "repo": "tokens", "branch": "main" }
        })
    }

    async fn seed(store: &dyn KeyValueStore, project_id: &str, record: &Value) {
        store
            .set(&project_key(project_id), &record.to_string())
            .await
            .unwrap();
    }

    fn sample_tokens(project_id: &str) -> Vec<Token> {
        let processor = TokenProcessor::with_defaults();
        processor
            .process_token_data(
                &json!({ "space": { "sm": { "$value": "4px" }, "md": { "$value": "8px" } } }),
                &ProcessOptions::new(project_id),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_missing_project_is_empty() {
        let adapter = adapter_with(Arc::new(MemoryStore::new()));
        assert!(adapter.load("new-project").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        let tokens = sample_tokens("p1");

        adapter.save("p1", &tokens).await.unwrap();
        assert_eq!(adapter.load("p1").await.unwrap(), tokens);

        let raw = store.get("project:p1").await.unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["version"], CURRENT_VERSION);
        assert_eq!(stored["projectId"], "p1");
        assert_eq!(stored["metadata"]["source"], "tokenflow");
        assert_eq!(stored["metadata"]["importStats"]["totalTokens"], 2);
    }

    #[tokio::test]
    async fn test_legacy_migration_keeps_every_token() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        let legacy = legacy_record();
        seed(store.as_ref(), "p1", &legacy).await;

        let tokens = adapter.load("p1").await.unwrap();
        assert_eq!(tokens.len(), 5);

        let red = tokens.iter().find(|t| t.qualified_name == "color.red").unwrap();
        assert_eq!(red.collection, "primitives");
        assert_eq!(red.source.location, "acme/tokens/primitives/colors.json");
        assert_eq!(red.source.branch.as_deref(), Some("main"));

        let primary = tokens.iter().find(|t| t.qualified_name == "brand.primary").unwrap();
        assert_eq!(primary.alias_to.as_deref(), Some(red.id.as_str()));

        let backups = adapter.list_backups("p1").await.unwrap();
        assert_eq!(backups.len(), 1);
        let backup_raw = store.get(&backups[0].key).await.unwrap().unwrap();
        let backup: Value = serde_json::from_str(&backup_raw).unwrap();
        assert_eq!(backup, legacy);

        let migrated: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(migrated["version"], CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_migrated_record_loads_without_second_backup() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        seed(store.as_ref(), "p1", &legacy_record()).await;

        let first = adapter.load("p1").await.unwrap();
        let second = adapter.load("p1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(adapter.list_backups("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_loads_migrate_once() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        seed(store.as_ref(), "p1", &legacy_record()).await;

        let (a, b) = tokio::join!(adapter.load("p1"), adapter.load("p1"));
        assert_eq!(a.unwrap().len(), 5);
        assert_eq!(b.unwrap().len(), 5);
        assert_eq!(adapter.list_backups("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_backup_failure_aborts_before_migration() {
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
            fail_prefix: "backup:",
        });
        let adapter = adapter_with(store.clone());
        let legacy = legacy_record();
        seed(store.as_ref(), "p1", &legacy).await;

        let err = adapter.load("p1").await.unwrap_err();
        assert!(matches!(err, TokenflowError::BackupFailed { .. }));
        assert!(err.to_string().contains("backup"));

        let untouched: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(untouched, legacy);
    }

    #[tokio::test]
    async fn test_unparseable_legacy_fails_migration_and_keeps_record() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        let legacy = json!({ "tokenFiles": { "broken.json": "{ not json" } });
        seed(store.as_ref(), "p1", &legacy).await;

        for _ in 0..3 {
            let err = adapter.load("p1").await.unwrap_err();
            assert!(matches!(err, TokenflowError::MigrationFailed { .. }));
        }

        let untouched: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(untouched, legacy);
        assert_eq!(adapter.list_backups("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_themed_legacy_files_fail_without_losing_values() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        let legacy = json!({
            "tokenFiles": {
                "themes/light.json": { "bg": { "$value": "#fff" }, "fg": { "$value": "#111" } },
                "themes/dark.json": { "bg": { "$value": "#000" }, "fg": { "$value": "#eee" } }
            }
        });
        seed(store.as_ref(), "p1", &legacy).await;

        let err = adapter.load("p1").await.unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, TokenflowError::MigrationFailed { .. }));
        assert!(message.contains("'bg'"));
        assert!(message.contains("themes/light.json"));
        assert!(message.contains("themes/dark.json"));

        let untouched: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(untouched, legacy);
        let backups = adapter.list_backups("p1").await.unwrap();
        assert_eq!(backups.len(), 1);
        let backup: Value =
            serde_json::from_str(&store.get(&backups[0].key).await.unwrap().unwrap()).unwrap();
        assert_eq!(backup, legacy);
    }

    #[tokio::test]
    async fn test_tokenless_legacy_files_migrate_to_empty_project() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        seed(store.as_ref(), "p1", &json!({ "tokenFiles": { "placeholder.json": {} } })).await;

        assert!(adapter.load("p1").await.unwrap().is_empty());
        assert!(adapter.load("p1").await.unwrap().is_empty());

        let migrated: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(migrated["version"], CURRENT_VERSION);
        assert_eq!(adapter.list_backups("p1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_legacy_record_gets_new_backup() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        store
            .set(&backup_key("p1", 1), &json!({ "tokenFiles": { "old.json": "{" } }).to_string())
            .await
            .unwrap();
        seed(store.as_ref(), "p1", &legacy_record()).await;

        adapter.load("p1").await.unwrap();
        assert_eq!(adapter.list_backups("p1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_idle_project_locks_are_dropped() {
        let adapter = adapter_with(Arc::new(MemoryStore::new()));
        for project in ["a", "b", "c", "d"] {
            adapter.load(project).await.unwrap();
        }
        let held = adapter.project_locks.lock().unwrap().len();
        assert_eq!(held, 1);
    }

    #[tokio::test]
    async fn test_empty_legacy_migrates_to_empty_project() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        seed(store.as_ref(), "p1", &json!({ "tokenFiles": {} })).await;

        assert!(adapter.load("p1").await.unwrap().is_empty());
        let migrated: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(migrated["version"], CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_unknown_version_and_shape_are_rejected() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());

        seed(store.as_ref(), "future", &json!({ "version": "3.1", "tokens": [] })).await;
        let err = adapter.load("future").await.unwrap_err();
        assert!(err.to_string().contains("3.1"));

        seed(store.as_ref(), "odd", &json!({ "colors": [] })).await;
        assert!(matches!(
            adapter.load("odd").await.unwrap_err(),
            TokenflowError::UnsupportedFormat(_)
        ));
    }

    #[tokio::test]
    async fn test_oversized_save_leaves_previous_record() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        adapter.save("p1", &sample_tokens("p1")).await.unwrap();
        let before = store.get("project:p1").await.unwrap();

        let filler = "x".repeat(4000);
        let mut doc = serde_json::Map::new();
        for i in 0..200 {
            doc.insert(format!("t{}", i), json!({ "$value": filler.clone(), "$type": "fontFamily" }));
        }
        let huge = TokenProcessor::with_defaults()
            .process_token_data(&Value::Object(doc), &ProcessOptions::new("p1"))
            .unwrap();

        let err = adapter.save("p1", &huge).await.unwrap_err();
        assert!(matches!(err, TokenflowError::SizeLimitExceeded { limit, .. } if limit == MAX_STORAGE_BYTES));
        assert!(err.to_string().contains("1048576"));
        assert_eq!(store.get("project:p1").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_restore_from_backup() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        let legacy = legacy_record();
        seed(store.as_ref(), "p1", &legacy).await;
        adapter.load("p1").await.unwrap();

        let backup = adapter.list_backups("p1").await.unwrap().remove(0);
        adapter.restore_from_backup("p1", backup.timestamp).await.unwrap();
        let restored: Value =
            serde_json::from_str(&store.get("project:p1").await.unwrap().unwrap()).unwrap();
        assert_eq!(restored, legacy);

        let err = adapter.restore_from_backup("p1", 42).await.unwrap_err();
        assert!(matches!(err, TokenflowError::BackupNotFound(key) if key == "backup:p1:42"));
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let store = Arc::new(MemoryStore::new());
        let adapter = adapter_with(store.clone());
        for ts in [300, 100, 200] {
            store.set(&backup_key("p1", ts), "{}").await.unwrap();
        }
        store.set(&backup_key("p10", 50), "{}").await.unwrap();

        let listed: Vec<i64> = adapter
            .list_backups("p1")
            .await
            .unwrap()
            .iter()
            .map(|b| b.timestamp)
            .collect();
        assert_eq!(listed, vec![100, 200, 300]);

        assert_eq!(adapter.prune_backups("p1", 1).await.unwrap(), 2);
        let remaining = adapter.list_backups("p1").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp, 300);
        assert_eq!(adapter.list_backups("p10").await.unwrap().len(), 1);
    }
}
