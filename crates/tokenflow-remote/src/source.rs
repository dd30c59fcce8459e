use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokenflow_common::TokenFile;
use tokenflow_core::{BatchExecutor, BatchOptions, RetryOptions};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteEntryType {
    File,
    Dir,
    #[serde(other)]
    Other,
}

/// One entry of a remote file listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: RemoteEntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

/// JSON files are candidate token documents
pub fn is_token_document(file: &RemoteFile) -> bool {
    file.entry_type == RemoteEntryType::File && file.path.to_lowercase().ends_with(".json")
}

/// A remote origin of token documents.
///
/// Single calls return errors as-is. [`fetch_multiple_files`](Self::fetch_multiple_files) runs
/// through a [`BatchExecutor`] and retries failed paths per [`retry_options`](Self::retry_options).
#[async_trait]
pub trait RemoteFileSource: Send + Sync {
    type Config: Send + Sync;

    fn validate_config(&self, config: &Self::Config) -> bool;

    async fn fetch_file_list(&self, config: &Self::Config) -> Result<Vec<RemoteFile>>;

    async fn fetch_file_content(&self, config: &Self::Config, path: &str) -> Result<Value>;

    fn batch_options(&self) -> BatchOptions {
        BatchOptions::default()
    }

    /// No retries unless a source opts in
    fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            max_retries: 0,
            ..RetryOptions::default()
        }
    }

    /// Fetch several documents in bounded batches, in input order.
    ///
    /// A path that still fails after the last retry fails the whole call.
    async fn fetch_multiple_files(&self, config: &Self::Config, paths: &[String]) -> Result<Vec<TokenFile>> {
        let executor = BatchExecutor::new(self.batch_options());
        let result = executor
            .process_batch_with_retry(paths.to_vec(), &self.retry_options(), move |path: String, _| async move {
                let content = self.fetch_file_content(config, &path).await?;
                Ok::<_, anyhow::Error>(TokenFile::new(path, content))
            })
            .await;

        if let Some(first) = result.failures.first() {
            for failure in &result.failures {
                warn!(
                    "Giving up on {} after {} attempts: {}",
                    paths[failure.index], result.attempts[failure.index], failure.error
                );
            }
            anyhow::bail!(
                "{} of {} files failed to fetch, first: {}: {}",
                result.failure_count(),
                paths.len(),
                paths[first.index],
                first.error
            );
        }

        info!("Fetched {} files", result.success_count());
        Ok(result.successes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FixtureSource {
        documents: HashMap<String, Value>,
        /// Content requests that fail before the fixture starts answering
        outages: AtomicU32,
        retries: u32,
    }

    #[async_trait]
    impl RemoteFileSource for FixtureSource {
        type Config = ();

        fn validate_config(&self, _config: &()) -> bool {
            true
        }

        async fn fetch_file_list(&self, _config: &()) -> Result<Vec<RemoteFile>> {
            Ok(self
                .documents
                .keys()
                .map(|path| RemoteFile {
                    path: path.clone(),
                    entry_type: RemoteEntryType::File,
                    size: None,
                    sha: None,
                })
                .collect())
        }

        async fn fetch_file_content(&self, _config: &(), path: &str) -> Result<Value> {
            let outage = self
                .outages
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if outage {
                anyhow::bail!("503 for {}", path);
            }
            self.documents
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("404 for {}", path))
        }

        fn batch_options(&self) -> BatchOptions {
            BatchOptions {
                batch_size: 2,
                ..BatchOptions::default()
            }
        }

        fn retry_options(&self) -> RetryOptions {
            RetryOptions {
                max_retries: self.retries,
                base_delay: Duration::from_millis(1),
            }
        }
    }

    fn fixture() -> FixtureSource {
        let mut documents = HashMap::new();
        for name in ["a.json", "b.json", "c.json"] {
            documents.insert(name.to_string(), json!({ "x": { "$value": name } }));
        }
        FixtureSource {
            documents,
            outages: AtomicU32::new(0),
            retries: 0,
        }
    }

    #[tokio::test]
    async fn test_fetch_multiple_keeps_order() {
        let paths: Vec<String> = ["c.json", "a.json", "b.json"].iter().map(|s| s.to_string()).collect();
        let files = fixture().fetch_multiple_files(&(), &paths).await.unwrap();
        let fetched: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(fetched, vec!["c.json", "a.json", "b.json"]);
        assert_eq!(files[1].content["x"]["$value"], "a.json");
    }

    #[tokio::test]
    async fn test_fetch_multiple_surfaces_failures() {
        let paths = vec!["a.json".to_string(), "missing.json".to_string()];
        let err = fixture().fetch_multiple_files(&(), &paths).await.unwrap_err();
        assert!(err.to_string().contains("missing.json"));
    }

    #[tokio::test]
    async fn test_fetch_multiple_retries_transient_failures() {
        let paths = vec!["a.json".to_string(), "b.json".to_string()];
        let source = FixtureSource {
            outages: AtomicU32::new(3),
            retries: 2,
            ..fixture()
        };
        let files = source.fetch_multiple_files(&(), &paths).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].path, "b.json");
    }

    #[tokio::test]
    async fn test_fetch_multiple_without_retries_fails_fast() {
        let paths = vec!["a.json".to_string()];
        let source = FixtureSource {
            outages: AtomicU32::new(1),
            ..fixture()
        };
        let err = source.fetch_multiple_files(&(), &paths).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_listing_shape() {
        let entry: RemoteFile = serde_json::from_value(json!({
            "name": "colors.json",
            "path": "tokens/colors.json",
            "type": "file",
            "size": 120,
            "sha": "abc123"
        }))
        .unwrap();
        assert!(is_token_document(&entry));

        let link: RemoteFile =
            serde_json::from_value(json!({ "path": "tokens/link", "type": "symlink" })).unwrap();
        assert_eq!(link.entry_type, RemoteEntryType::Other);
        assert!(!is_token_document(&link));
    }
}
