use crate::infer::infer_type;
use crate::types::{trim_strings, FormatStrategy};
use crate::walk::{count_leaves, Leaf};
use serde_json::Value;
use tokenflow_common::{SourceFormat, TokenType};

/// Style Dictionary format (`value`, `type`, `comment`, `attributes.category`)
pub struct StyleDictionaryStrategy;

impl FormatStrategy for StyleDictionaryStrategy {
    fn name(&self) -> &str {
        "style-dictionary"
    }

    fn description(&self) -> &str {
        "Style Dictionary (value / type / comment)"
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::StyleDictionary
    }

    fn detect(&self, document: &Value) -> f64 {
        let counts = count_leaves(document);
        counts.ratio(counts.plain_marked)
    }

    fn leaf_value<'a>(&self, leaf: &Leaf<'a>) -> Option<&'a Value> {
        leaf.node.get("value").or_else(|| leaf.node.get("$value"))
    }

    fn extract_type(&self, leaf: &Leaf<'_>) -> TokenType {
        let declared = leaf
            .node
            .get("type")
            .and_then(|t| t.as_str())
            .or_else(|| {
                leaf.node
                    .get("attributes")
                    .and_then(|a| a.get("category"))
                    .and_then(|c| c.as_str())
            });

        if let Some(marker) = declared {
            let token_type = TokenType::from_marker(marker);
            if token_type != TokenType::Other {
                return token_type;
            }
        }

        let value = self.leaf_value(leaf).unwrap_or(&Value::Null);
        infer_type(&leaf.path, value)
    }

    fn normalize_value(&self, value: &Value, token_type: TokenType) -> Value {
        if let (Value::String(s), TokenType::Number | TokenType::FontWeight) = (value, token_type) {
            if let Ok(n) = s.trim().parse::<i64>() {
                return Value::from(n);
            }
            if let Ok(f) = s.trim().parse::<f64>() {
                if let Some(n) = serde_json::Number::from_f64(f) {
                    return Value::Number(n);
                }
            }
        }
        trim_strings(value)
    }

    fn extract_description(&self, leaf: &Leaf<'_>) -> Option<String> {
        leaf.node
            .get("comment")
            .or_else(|| leaf.node.get("description"))
            .and_then(|d| d.as_str())
            .map(String::from)
    }
}
