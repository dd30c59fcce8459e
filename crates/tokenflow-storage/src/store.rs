use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Asynchronous string key/value persistence
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Keys starting with `prefix`, in ascending order
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Process-local store, used in tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await);
        assert_eq!(store.get("missing").await.unwrap(), None);

        store.set("project:a", "1").await.unwrap();
        store.set("project:a", "2").await.unwrap();
        assert_eq!(store.get("project:a").await.unwrap().as_deref(), Some("2"));

        store.delete("project:a").await.unwrap();
        assert_eq!(store.get("project:a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_prefix_scan() {
        let store = MemoryStore::new();
        for key in ["backup:a:2", "backup:a:1", "backup:ab:1", "project:a"] {
            store.set(key, "x").await.unwrap();
        }
        let keys = store.keys_with_prefix("backup:a:").await.unwrap();
        assert_eq!(keys, vec!["backup:a:1", "backup:a:2"]);
        assert_eq!(store.len().await, 4);
    }
}
