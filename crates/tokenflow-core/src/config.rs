use crate::batch::{BatchOptions, RetryOptions};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration shared by the CLI and library consumers
#[derive(Debug, Clone)]
pub struct TokenflowConfig {
    pub batch: BatchOptions,
    pub retry: RetryOptions,
    pub db_path: PathBuf,
    /// Discrepancy rate above which the new pipeline's output is flagged
    pub discrepancy_threshold: f64,
    /// Operator opt-in to the new token model
    pub use_new_model: bool,
}

impl Default for TokenflowConfig {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            retry: RetryOptions::default(),
            db_path: PathBuf::from(".tokenflow/store.db"),
            discrepancy_threshold: 0.01,
            use_new_model: false,
        }
    }
}

impl TokenflowConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source, falling back to defaults for unset names
    pub fn from_lookup<L>(lookup: L) -> Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(size) = parse_var::<usize, _>(&lookup, "TOKENFLOW_BATCH_SIZE")? {
            if size == 0 {
                anyhow::bail!("TOKENFLOW_BATCH_SIZE must be at least 1");
            }
            config.batch.batch_size = size;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "TOKENFLOW_BATCH_DELAY_MS")? {
            config.batch.delay_between_batches = Duration::from_millis(ms);
        }
        if let Some(retries) = parse_var::<u32, _>(&lookup, "TOKENFLOW_MAX_RETRIES")? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "TOKENFLOW_RETRY_BASE_MS")? {
            config.retry.base_delay = Duration::from_millis(ms);
        }
        if let Some(path) = lookup("TOKENFLOW_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(threshold) = parse_var::<f64, _>(&lookup, "TOKENFLOW_DISCREPANCY_THRESHOLD")? {
            if !(0.0..=1.0).contains(&threshold) {
                anyhow::bail!("TOKENFLOW_DISCREPANCY_THRESHOLD must be between 0 and 1");
            }
            config.discrepancy_threshold = threshold;
        }
        if let Some(flag) = parse_var::<bool, _>(&lookup, "TOKENFLOW_USE_NEW_MODEL")? {
            config.use_new_model = flag;
        }

        Ok(config)
    }
}

fn parse_var<T, L>(lookup: &L, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    L: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("Invalid value for {}: {:?}", name, raw)),
        _ => Ok(None),
    }
}
