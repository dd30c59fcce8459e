use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\{\s*([A-Za-z0-9_\-@$]+(?:\.[A-Za-z0-9_\-@$]+)*)\s*\}\s*$")
        .expect("reference pattern is valid")
});

/// True when the whole value is a `{path.to.token}` reference.
pub fn is_reference(value: &Value) -> bool {
    value.as_str().map_or(false, |s| REFERENCE.is_match(s))
}

/// Target path of a reference with braces and whitespace stripped.
pub fn extract_reference(value: &Value) -> Option<String> {
    let s = value.as_str()?;
    REFERENCE
        .captures(s)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
