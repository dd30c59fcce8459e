use crate::target::{sync_records, TargetRecord, TargetSystem};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokenflow_common::{ImportStats, Token, TokenFile, TokenType};
use tokenflow_core::{decode_document, infer_collection, resolve_aliases, ProcessOptions, TokenProcessor};
use tokenflow_formats::{collect_leaves, extract_reference};
use tracing::{debug, warn};

/// Reference hops the raw-tree path follows before giving up
const MAX_REFERENCE_DEPTH: usize = 16;

/// A way of turning raw token files into target-system records
#[async_trait]
pub trait SyncPipeline: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, files: &[TokenFile], target: &dyn TargetSystem) -> Result<ImportStats>;
}

/// Target record for a canonical token, keyed by qualified name
pub fn token_record(token: &Token) -> TargetRecord {
    let value = token
        .resolved_value
        .clone()
        .unwrap_or_else(|| token.value.clone());
    TargetRecord::new(&token.qualified_name, token.token_type.as_str(), value)
        .with_scopes(vec![token.collection.clone()])
}

/// The pre-model path: reads leaves straight out of the raw trees and writes their values
#[derive(Debug, Default)]
pub struct RawTreePipeline;

impl RawTreePipeline {
    pub fn new() -> Self {
        Self
    }

    fn records(&self, files: &[TokenFile]) -> Vec<TargetRecord> {
        let mut order: Vec<String> = Vec::new();
        let mut entries: HashMap<String, (String, Value, String)> = HashMap::new();

        for file in files {
            let document = match decode_document(&file.content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Raw pipeline skipping {}: {}", file.path, e);
                    continue;
                }
            };
            let scope = infer_collection(&file.path);

            for leaf in collect_leaves(&document) {
                let Some(value) = leaf.node.get("$value").or_else(|| leaf.node.get("value")) else {
                    continue;
                };
                let record_type = declared_type(leaf.node)
                    .map(|marker| TokenType::from_marker(marker).as_str())
                    .unwrap_or(TokenType::Other.as_str());

                let name = leaf.qualified_name();
                if !entries.contains_key(&name) {
                    order.push(name.clone());
                }
                entries.insert(name, (record_type.to_string(), value.clone(), scope.clone()));
            }
        }

        let raw_values: HashMap<&str, &Value> = entries
            .iter()
            .map(|(name, (_, value, _))| (name.as_str(), value))
            .collect();

        order
            .iter()
            .filter_map(|name| {
                let (record_type, value, scope) = entries.get(name)?;
                Some(
                    TargetRecord::new(name, record_type, follow_references(value, &raw_values))
                        .with_scopes(vec![scope.clone()]),
                )
            })
            .collect()
    }
}

fn declared_type(node: &Map<String, Value>) -> Option<&str> {
    node.get("$type")
        .or_else(|| node.get("type"))
        .and_then(|t| t.as_str())
}

fn follow_references(value: &Value, raw_values: &HashMap<&str, &Value>) -> Value {
    let mut current = value;
    for _ in 0..MAX_REFERENCE_DEPTH {
        let Some(target) = extract_reference(current) else {
            return current.clone();
        };
        match raw_values.get(target.as_str()) {
            Some(next) => current = next,
            None => return current.clone(),
        }
    }
    value.clone()
}

#[async_trait]
impl SyncPipeline for RawTreePipeline {
    fn name(&self) -> &str {
        "raw-tree"
    }

    async fn apply(&self, files: &[TokenFile], target: &dyn TargetSystem) -> Result<ImportStats> {
        let records = self.records(files);
        debug!("Raw pipeline writing {} records to {}", records.len(), target.name());
        sync_records(target, records).await
    }
}

/// Processor, alias resolver, then model sync
pub struct TokenModelPipeline {
    processor: Arc<TokenProcessor>,
    options: ProcessOptions,
}

impl TokenModelPipeline {
    pub fn new(processor: Arc<TokenProcessor>, options: ProcessOptions) -> Self {
        Self { processor, options }
    }
}

#[async_trait]
impl SyncPipeline for TokenModelPipeline {
    fn name(&self) -> &str {
        "token-model"
    }

    async fn apply(&self, files: &[TokenFile], target: &dyn TargetSystem) -> Result<ImportStats> {
        let mut tokens = self.processor.process_multiple_files(files, &self.options)?;
        let report = resolve_aliases(&mut tokens);
        if !report.dangling.is_empty() || !report.cycles.is_empty() {
            warn!(
                "{} dangling and {} cyclic aliases left unresolved",
                report.dangling.len(),
                report.cycles.len()
            );
        }

        let records: Vec<TargetRecord> = tokens.iter().map(token_record).collect();
        debug!("Model pipeline writing {} records to {}", records.len(), target.name());
        sync_records(target, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::MemoryTarget;
    use serde_json::json;

    fn files() -> Vec<TokenFile> {
        vec![
            TokenFile::new(
                "core/colors.json",
                json!({
                    "color": {
                        "red": { "$value": "#ff0000", "$type": "color" },
                        "accent": { "$value": "{color.red}", "$type": "color" }
                    }
                }),
            ),
            TokenFile::new(
                "semantic.json",
                json!({ "text": { "danger": { "$value": "{color.accent}", "$type": "color" } } }),
            ),
        ]
    }

    #[tokio::test]
    async fn test_raw_pipeline_follows_references() {
        let target = MemoryTarget::new();
        let stats = RawTreePipeline::new().apply(&files(), &target).await.unwrap();
        assert_eq!(stats.added, 3);

        let records = target.snapshot().await.unwrap();
        let danger = records.iter().find(|r| r.identity == "text.danger").unwrap();
        assert_eq!(danger.value, json!("#ff0000"));
        assert_eq!(danger.record_type, "color");
        assert_eq!(danger.scopes, vec!["semantic"]);
    }

    #[tokio::test]
    async fn test_raw_pipeline_leaves_cycles_as_references() {
        let cyclic = vec![TokenFile::new(
            "loop.json",
            json!({ "a": { "$value": "{b}" }, "b": { "$value": "{a}" } }),
        )];
        let target = MemoryTarget::new();
        RawTreePipeline::new().apply(&cyclic, &target).await.unwrap();
        assert_eq!(target.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_model_pipeline_matches_raw_on_typed_input() {
        let raw_target = MemoryTarget::new();
        RawTreePipeline::new().apply(&files(), &raw_target).await.unwrap();

        let model_target = MemoryTarget::new();
        let pipeline = TokenModelPipeline::new(
            Arc::new(TokenProcessor::with_defaults()),
            ProcessOptions::new("p1"),
        );
        let stats = pipeline.apply(&files(), &model_target).await.unwrap();
        assert_eq!(stats.added, 3);

        assert_eq!(
            raw_target.snapshot().await.unwrap(),
            model_target.snapshot().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_second_apply_skips_unchanged() {
        let target = MemoryTarget::new();
        let pipeline = RawTreePipeline::new();
        pipeline.apply(&files(), &target).await.unwrap();
        let stats = pipeline.apply(&files(), &target).await.unwrap();
        assert_eq!(stats, ImportStats { added: 0, updated: 0, skipped: 3 });
    }
}
