use crate::collection::{infer_collection, DEFAULT_COLLECTION};
use crate::types::ProcessOptions;
use chrono::Utc;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokenflow_common::{
    token_id, Result, Token, TokenFile, TokenSource, TokenStatus, TokenflowError,
};
use tokenflow_formats::{FormatRegistry, FormatStrategy, ParsedToken};
use tracing::{debug, info, warn};

/// Converts raw token documents into canonical [`Token`]s
pub struct TokenProcessor {
    registry: Arc<FormatRegistry>,
}

impl TokenProcessor {
    pub fn new(registry: Arc<FormatRegistry>) -> Self {
        Self { registry }
    }

    pub fn with_defaults() -> Self {
        Self::new(Arc::new(FormatRegistry::with_defaults()))
    }

    pub fn registry(&self) -> &FormatRegistry {
        &self.registry
    }

    /// Process one document. Output follows the document's traversal order.
    pub fn process_token_data(&self, document: &Value, options: &ProcessOptions) -> Result<Vec<Token>> {
        let strategy = self.select_strategy(document, options)?;
        let parsed = strategy.parse(document)?;

        let now = Utc::now().to_rfc3339();
        let collection = options
            .collection
            .clone()
            .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
        let location = options.location_for("");

        let tokens: Vec<Token> = parsed
            .into_iter()
            .map(|record| self.build_token(strategy.as_ref(), record, options, &collection, &location, &now))
            .collect();

        debug!(
            "Processed {} tokens as {} into collection {}",
            tokens.len(),
            strategy.name(),
            collection
        );
        Ok(tokens)
    }

    /// Process several files, skipping the ones that fail.
    ///
    /// Fails only when no file yields any token. A later file's token replaces an earlier one
    /// with the same id, keeping the earlier position.
    pub fn process_multiple_files(&self, files: &[TokenFile], options: &ProcessOptions) -> Result<Vec<Token>> {
        let start = Instant::now();
        let mut tokens: Vec<Token> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut productive_files = 0usize;

        for file in files {
            let document = match decode_document(&file.content) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!("Skipping {}: {}", file.path, e);
                    continue;
                }
            };

            let mut file_options = options.clone();
            if file_options.collection.is_none() {
                file_options.collection = Some(infer_collection(&file.path));
            }
            file_options.location = options.location_for(&file.path);

            let produced = match self.process_token_data(&document, &file_options) {
                Ok(produced) => produced,
                Err(e) => {
                    warn!("Skipping {}: {}", file.path, e);
                    continue;
                }
            };

            if produced.is_empty() {
                warn!("No tokens found in {}", file.path);
                continue;
            }
            productive_files += 1;

            for token in produced {
                match positions.get(&token.id) {
                    Some(&idx) => {
                        debug!("{} from {} supersedes earlier definition", token.qualified_name, file.path);
                        tokens[idx] = token;
                    }
                    None => {
                        positions.insert(token.id.clone(), tokens.len());
                        tokens.push(token);
                    }
                }
            }
        }

        if productive_files == 0 {
            return Err(TokenflowError::NoTokensProcessed { files: files.len() });
        }

        info!(
            "Processed {} tokens from {}/{} files in {:.2}s",
            tokens.len(),
            productive_files,
            files.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(tokens)
    }

    fn select_strategy(&self, document: &Value, options: &ProcessOptions) -> Result<Arc<dyn FormatStrategy>> {
        if let Some(name) = &options.format {
            return self.registry.get(name).ok_or_else(|| {
                TokenflowError::FormatDetection(Some(format!("format '{}' is not registered", name)))
            });
        }

        self.registry
            .detect_format(document)
            .map(|detected| {
                debug!(
                    "Detected format {} (confidence {:.2})",
                    detected.strategy.name(),
                    detected.confidence
                );
                detected.strategy
            })
            .ok_or(TokenflowError::FormatDetection(None))
    }

    fn build_token(
        &self,
        strategy: &dyn FormatStrategy,
        record: ParsedToken,
        options: &ProcessOptions,
        collection: &str,
        location: &str,
        now: &str,
    ) -> Token {
        let qualified_name = record.qualified_name();
        let id = token_id(&options.project_id, &qualified_name);

        let alias_to = if strategy.is_reference(&record.original_value) {
            strategy
                .extract_reference(&record.original_value)
                .map(|target| token_id(&options.project_id, &target))
        } else {
            None
        };
        let resolved_value = match alias_to {
            Some(_) => None,
            None => Some(record.value.clone()),
        };

        let tags = build_tags(&record);
        let name = record.path.last().cloned().unwrap_or_default();

        Token {
            id,
            name,
            qualified_name,
            token_type: record.token_type,
            raw_value: record.original_value,
            value: record.value,
            resolved_value,
            alias_to,
            project_id: options.project_id.clone(),
            collection: collection.to_string(),
            theme: options.theme.clone(),
            brand: options.brand.clone(),
            source_format: strategy.source_format(),
            source: TokenSource {
                source_type: options.source_type,
                location: location.to_string(),
                imported: now.to_string(),
                branch: options.branch.clone(),
                commit: options.commit.clone(),
            },
            tags,
            status: TokenStatus::Active,
            created: now.to_string(),
            last_modified: now.to_string(),
            description: record.description,
            extensions: record.extensions,
            path: record.path,
        }
    }
}

fn build_tags(record: &ParsedToken) -> Vec<String> {
    let mut tags = vec![record.token_type.as_str().to_string()];
    if let Some(first) = record.path.first() {
        tags.push(first.clone());
    }
    if record.path.len() > 2 {
        tags.push(format!("{}.{}", record.path[0], record.path[1]));
    }
    tags
}

/// Token documents arrive either as JSON values or as JSON text.
pub fn decode_document(content: &Value) -> Result<Cow<'_, Value>> {
    match content {
        Value::String(text) => Ok(Cow::Owned(serde_json::from_str(text)?)),
        other => Ok(Cow::Borrowed(other)),
    }
}
