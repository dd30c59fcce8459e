use crate::reference;
use crate::walk::{collect_leaves, Leaf};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokenflow_common::{Result, SourceFormat, TokenType, TokenflowError};

/// Format-neutral record emitted for every leaf token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedToken {
    pub path: Vec<String>,
    /// Normalized working value
    pub value: Value,
    pub token_type: TokenType,
    /// Value exactly as authored
    pub original_value: Value,
    pub description: Option<String>,
    pub extensions: Option<Value>,
}

impl ParsedToken {
    pub fn qualified_name(&self) -> String {
        self.path.join(".")
    }
}

/// A parser and detector for one token-document dialect.
///
/// Implementors provide detection, per-leaf value/type extraction and normalization.
/// Traversal and reference handling are shared.
pub trait FormatStrategy: Send + Sync {
    /// Registry key (e.g. "w3c", "style-dictionary")
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Tag stamped onto tokens produced by this strategy
    fn source_format(&self) -> SourceFormat;

    /// Confidence in [0, 1] that `document` is written in this dialect
    fn detect(&self, document: &Value) -> f64;

    /// The authored value of a leaf, before normalization
    fn leaf_value<'a>(&self, leaf: &Leaf<'a>) -> Option<&'a Value>;

    fn extract_type(&self, leaf: &Leaf<'_>) -> TokenType;

    fn normalize_value(&self, value: &Value, token_type: TokenType) -> Value;

    fn extract_description(&self, _leaf: &Leaf<'_>) -> Option<String> {
        None
    }

    fn extract_extensions(&self, _leaf: &Leaf<'_>) -> Option<Value> {
        None
    }

    fn is_reference(&self, value: &Value) -> bool {
        reference::is_reference(value)
    }

    fn extract_reference(&self, value: &Value) -> Option<String> {
        reference::extract_reference(value)
    }

    /// Depth-first parse in document order
    fn parse(&self, document: &Value) -> Result<Vec<ParsedToken>> {
        if !document.is_object() {
            return Err(TokenflowError::Parse(format!(
                "{} document root must be a JSON object",
                self.name()
            )));
        }

        collect_leaves(document)
            .iter()
            .map(|leaf| self.parse_leaf(leaf))
            .collect()
    }

    fn parse_leaf(&self, leaf: &Leaf<'_>) -> Result<ParsedToken> {
        let original = self.leaf_value(leaf).ok_or_else(|| {
            TokenflowError::Parse(format!("token '{}' has no value", leaf.qualified_name()))
        })?;
        let token_type = self.extract_type(leaf);
        let value = if self.is_reference(original) {
            original.clone()
        } else {
            self.normalize_value(original, token_type)
        };

        Ok(ParsedToken {
            path: leaf.path.clone(),
            value,
            token_type,
            original_value: original.clone(),
            description: self.extract_description(leaf),
            extensions: self.extract_extensions(leaf),
        })
    }
}

/// Trim string values, leaving everything else untouched.
pub(crate) fn trim_strings(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(s.trim().to_string()),
        other => other.clone(),
    }
}
