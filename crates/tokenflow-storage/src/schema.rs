use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tokenflow_common::{Result, SourceType, Token, TokenFile, TokenflowError};
use tokenflow_core::{decode_document, ProcessOptions};
use tokenflow_formats::collect_leaves;

/// The only schema version this crate writes
pub const CURRENT_VERSION: &str = "2.0";

/// Hard ceiling on a serialized project record (1 MiB)
pub const MAX_STORAGE_BYTES: usize = 1024 * 1024;

pub fn project_key(project_id: &str) -> String {
    format!("project:{}", project_id)
}

pub fn backup_prefix(project_id: &str) -> String {
    format!("backup:{}:", project_id)
}

pub fn backup_key(project_id: &str, timestamp: i64) -> String {
    format!("{}{}", backup_prefix(project_id), timestamp)
}

/// Versioned project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedProjectStorage {
    pub version: String,
    pub project_id: String,
    pub tokens: Vec<Token>,
    pub metadata: StorageMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMetadata {
    pub last_sync: String,
    pub source: String,
    pub import_stats: ImportSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub total_tokens: usize,
    pub alias_count: usize,
    /// Token count per collection
    pub collections: BTreeMap<String, usize>,
}

impl ImportSummary {
    pub fn from_tokens(tokens: &[Token]) -> Self {
        let mut summary = Self {
            total_tokens: tokens.len(),
            ..Self::default()
        };
        for token in tokens {
            if token.is_alias() {
                summary.alias_count += 1;
            }
            *summary.collections.entry(token.collection.clone()).or_insert(0) += 1;
        }
        summary
    }
}

impl PersistedProjectStorage {
    pub fn new(project_id: &str, tokens: Vec<Token>, source: &str) -> Self {
        let import_stats = ImportSummary::from_tokens(&tokens);
        Self {
            version: CURRENT_VERSION.to_string(),
            project_id: project_id.to_string(),
            tokens,
            metadata: StorageMetadata {
                last_sync: Utc::now().to_rfc3339(),
                source: source.to_string(),
                import_stats,
            },
        }
    }
}

/// Pre-versioned record shape, read only during migration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTokenState {
    pub token_files: Map<String, Value>,
    #[serde(default)]
    pub token_source: Option<Value>,
    #[serde(default)]
    pub github_config: Option<Value>,
}

impl LegacyTokenState {
    pub fn files(&self) -> Vec<TokenFile> {
        self.token_files
            .iter()
            .map(|(name, content)| TokenFile::new(name.clone(), content.clone()))
            .collect()
    }

    pub fn process_options(&self, project_id: &str) -> ProcessOptions {
        let label = match &self.token_source {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(obj)) => obj
                .get("type")
                .and_then(|t| t.as_str())
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        let github = self.github_config.as_ref();
        let field = |name: &str| {
            github
                .and_then(|g| g.get(name))
                .and_then(|v| v.as_str())
                .map(String::from)
        };
        let location = match (field("owner"), field("repo").or_else(|| field("repository"))) {
            (Some(owner), Some(repo)) => format!("{}/{}", owner, repo),
            (None, Some(repo)) => repo,
            _ => String::new(),
        };

        ProcessOptions::new(project_id)
            .with_source(SourceType::from_label(&label), location)
            .with_branch(field("branch"))
    }

    /// Leaf tokens per path across the legacy files
    pub fn census(&self) -> LegacyCensus {
        let mut census = LegacyCensus::default();
        let mut definitions: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for (file, content) in &self.token_files {
            match decode_document(content) {
                Ok(document) => {
                    for leaf in collect_leaves(&document) {
                        census.leaf_count += 1;
                        definitions
                            .entry(leaf.qualified_name())
                            .or_default()
                            .push(file.clone());
                    }
                }
                Err(_) => census.undecodable.push(file.clone()),
            }
        }

        census.repeated_paths = definitions
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .collect();
        census
    }
}

/// What a legacy record holds before it is migrated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyCensus {
    /// Every leaf token in the decodable files, repeats included
    pub leaf_count: usize,
    /// Files whose content is not valid JSON
    pub undecodable: Vec<String>,
    /// Token paths defined in more than one file, with the files that define them
    pub repeated_paths: BTreeMap<String, Vec<String>>,
}

impl LegacyCensus {
    /// Nothing to migrate: every file decodes and none holds a token
    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0 && self.undecodable.is_empty()
    }
}

/// A stored project blob, classified by shape
#[derive(Debug)]
pub(crate) enum StoredRecord {
    Current(PersistedProjectStorage),
    Legacy(LegacyTokenState),
}

pub(crate) fn classify(project_id: &str, raw: &str) -> Result<StoredRecord> {
    let value: Value = serde_json::from_str(raw)?;

    match value.get("version") {
        Some(Value::String(version)) if version == CURRENT_VERSION => {
            Ok(StoredRecord::Current(serde_json::from_value(value)?))
        }
        Some(Value::String(version)) => Err(TokenflowError::UnsupportedVersion(version.clone())),
        Some(other) => Err(TokenflowError::UnsupportedVersion(other.to_string())),
        None if value.get("tokenFiles").map_or(false, Value::is_object) => {
            Ok(StoredRecord::Legacy(serde_json::from_value(value)?))
        }
        None => Err(TokenflowError::UnsupportedFormat(project_id.to_string())),
    }
}
