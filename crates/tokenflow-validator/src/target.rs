use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokenflow_common::ImportStats;
use tokio::sync::Mutex;
use tracing::debug;

/// One materialized object in a target system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub identity: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: Value,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl TargetRecord {
    pub fn new(identity: impl Into<String>, record_type: impl Into<String>, value: Value) -> Self {
        Self {
            identity: identity.into(),
            record_type: record_type.into(),
            value,
            scopes: Vec::new(),
        }
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// Saved target state that a later `restore` returns to
#[derive(Debug, Clone, PartialEq)]
pub struct Checkpoint {
    records: Vec<TargetRecord>,
}

impl Checkpoint {
    pub fn new(records: Vec<TargetRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TargetRecord] {
        &self.records
    }
}

/// External system that token pipelines write into
#[async_trait]
pub trait TargetSystem: Send + Sync {
    fn name(&self) -> &str;

    /// Current records, in the target's own order
    async fn snapshot(&self) -> Result<Vec<TargetRecord>>;

    /// Create or replace a record by identity
    async fn upsert(&self, record: TargetRecord) -> Result<()>;

    async fn delete(&self, identity: &str) -> Result<()>;

    async fn checkpoint(&self) -> Result<Checkpoint> {
        Ok(Checkpoint::new(self.snapshot().await?))
    }

    /// Return to a checkpoint by recreation: delete extras, rewrite changed or missing records.
    ///
    /// Targets with a native transaction or staging area should override this.
    async fn restore(&self, checkpoint: &Checkpoint) -> Result<()> {
        let current = self.snapshot().await?;
        let wanted: HashSet<&str> = checkpoint
            .records()
            .iter()
            .map(|r| r.identity.as_str())
            .collect();

        for record in &current {
            if !wanted.contains(record.identity.as_str()) {
                self.delete(&record.identity).await?;
            }
        }

        let existing: HashMap<&str, &TargetRecord> =
            current.iter().map(|r| (r.identity.as_str(), r)).collect();
        for record in checkpoint.records() {
            if existing.get(record.identity.as_str()) != Some(&record) {
                self.upsert(record.clone()).await?;
            }
        }

        debug!("Restored {} by recreation", self.name());
        Ok(())
    }
}

/// Write records into a target, counting added, updated and unchanged ones
pub async fn sync_records(target: &dyn TargetSystem, records: Vec<TargetRecord>) -> Result<ImportStats> {
    let existing: HashMap<String, TargetRecord> = target
        .snapshot()
        .await?
        .into_iter()
        .map(|r| (r.identity.clone(), r))
        .collect();

    let mut stats = ImportStats::default();
    for record in records {
        match existing.get(&record.identity) {
            Some(current) if *current == record => stats.skipped += 1,
            Some(_) => {
                target.upsert(record).await?;
                stats.updated += 1;
            }
            None => {
                target.upsert(record).await?;
                stats.added += 1;
            }
        }
    }
    Ok(stats)
}

/// In-process target system with exact, order-preserving restore
#[derive(Debug, Default)]
pub struct MemoryTarget {
    records: Mutex<Vec<TargetRecord>>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TargetRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }
}

#[async_trait]
impl TargetSystem for MemoryTarget {
    fn name(&self) -> &str {
        "memory"
    }

    async fn snapshot(&self) -> Result<Vec<TargetRecord>> {
        Ok(self.records.lock().await.clone())
    }

    async fn upsert(&self, record: TargetRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        match records.iter_mut().find(|r| r.identity == record.identity) {
            Some(slot) => *slot = record,
            None => records.push(record),
        }
        Ok(())
    }

    async fn delete(&self, identity: &str) -> Result<()> {
        self.records.lock().await.retain(|r| r.identity != identity);
        Ok(())
    }

    async fn restore(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.records.lock().await = checkpoint.records().to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Relies on the default recreate-style restore
    struct RecreatingTarget {
        inner: MemoryTarget,
    }

    #[async_trait]
    impl TargetSystem for RecreatingTarget {
        fn name(&self) -> &str {
            "recreating"
        }

        async fn snapshot(&self) -> Result<Vec<TargetRecord>> {
            self.inner.snapshot().await
        }

        async fn upsert(&self, record: TargetRecord) -> Result<()> {
            self.inner.upsert(record).await
        }

        async fn delete(&self, identity: &str) -> Result<()> {
            self.inner.delete(identity).await
        }
    }

    fn record(identity: &str, value: Value) -> TargetRecord {
        TargetRecord::new(identity, "color", value)
    }

    fn sorted(mut records: Vec<TargetRecord>) -> Vec<TargetRecord> {
        records.sort_by(|a, b| a.identity.cmp(&b.identity));
        records
    }

    #[tokio::test]
    async fn test_sync_counts() {
        let target = MemoryTarget::with_records(vec![
            record("a", json!("#000")),
            record("b", json!("#111")),
        ]);

        let stats = sync_records(
            &target,
            vec![
                record("a", json!("#000")),
                record("b", json!("#222")),
                record("c", json!("#333")),
            ],
        )
        .await
        .unwrap();

        assert_eq!(stats, ImportStats { added: 1, updated: 1, skipped: 1 });
        assert_eq!(target.snapshot().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_restore_is_exact() {
        let target = MemoryTarget::with_records(vec![record("a", json!(1)), record("b", json!(2))]);
        let checkpoint = target.checkpoint().await.unwrap();

        target.delete("a").await.unwrap();
        target.upsert(record("c", json!(3))).await.unwrap();
        target.upsert(record("a", json!(9))).await.unwrap();

        target.restore(&checkpoint).await.unwrap();
        assert_eq!(target.snapshot().await.unwrap(), checkpoint.records());
    }

    #[tokio::test]
    async fn test_default_restore_recreates() {
        let target = RecreatingTarget {
            inner: MemoryTarget::with_records(vec![record("a", json!(1)), record("b", json!(2))]),
        };
        let checkpoint = target.checkpoint().await.unwrap();

        target.delete("a").await.unwrap();
        target.upsert(record("b", json!(20))).await.unwrap();
        target.upsert(record("c", json!(3))).await.unwrap();

        target.restore(&checkpoint).await.unwrap();
        assert_eq!(
            sorted(target.snapshot().await.unwrap()),
            sorted(checkpoint.records().to_vec())
        );
    }
}
