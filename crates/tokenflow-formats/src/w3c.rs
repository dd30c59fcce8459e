use crate::infer::infer_type;
use crate::types::{trim_strings, FormatStrategy};
use crate::walk::{count_leaves, Leaf};
use serde_json::Value;
use tokenflow_common::{SourceFormat, TokenType};

/// W3C Design Tokens Community Group format (`$value`, `$type`, `$description`)
pub struct W3cStrategy;

impl FormatStrategy for W3cStrategy {
    fn name(&self) -> &str {
        "w3c"
    }

    fn description(&self) -> &str {
        "W3C Design Tokens ($value / $type)"
    }

    fn source_format(&self) -> SourceFormat {
        SourceFormat::W3c
    }

    fn detect(&self, document: &Value) -> f64 {
        let counts = count_leaves(document);
        counts.ratio(counts.dollar_marked)
    }

    fn leaf_value<'a>(&self, leaf: &Leaf<'a>) -> Option<&'a Value> {
        leaf.node.get("$value").or_else(|| leaf.node.get("value"))
    }

    fn extract_type(&self, leaf: &Leaf<'_>) -> TokenType {
        if let Some(marker) = leaf.node.get("$type").and_then(|t| t.as_str()) {
            return TokenType::from_marker(marker);
        }
        if let Some(marker) = leaf.inherited_type {
            return TokenType::from_marker(marker);
        }
        let value = self.leaf_value(leaf).unwrap_or(&Value::Null);
        infer_type(&leaf.path, value)
    }

    fn normalize_value(&self, value: &Value, _token_type: TokenType) -> Value {
        if let Value::Object(obj) = value {
            // Structured dimension: { "value": 16, "unit": "px" }
            if let (Some(amount), Some(unit)) = (obj.get("value"), obj.get("unit")) {
                if let (Some(unit), true) = (unit.as_str(), amount.is_number()) {
                    return Value::String(format!("{}{}", amount, unit));
                }
            }
            // Structured color: { "colorSpace": "srgb", "components": [...], "hex": "#..." }
            if obj.contains_key("colorSpace") {
                if let Some(hex) = obj.get("hex").and_then(|h| h.as_str()) {
                    return Value::String(hex.trim().to_string());
                }
            }
        }
        trim_strings(value)
    }

    fn extract_description(&self, leaf: &Leaf<'_>) -> Option<String> {
        leaf.node
            .get("$description")
            .and_then(|d| d.as_str())
            .map(String::from)
    }

    fn extract_extensions(&self, leaf: &Leaf<'_>) -> Option<Value> {
        leaf.node.get("$extensions").cloned()
    }
}
