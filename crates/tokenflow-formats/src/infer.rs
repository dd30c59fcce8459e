use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tokenflow_common::TokenType;

static HEX_COLOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(?:[0-9a-fA-F]{3,4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("valid pattern")
});
static FUNCTIONAL_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(?:rgba?|hsla?)\s*\(").expect("valid pattern"));
static DURATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d*\.?\d+(?:ms|s)$").expect("valid pattern"));
static DIMENSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?\d*\.?\d+(?:px|rem|em|%|pt|vh|vw|vmin|vmax|ch|ex)$").expect("valid pattern")
});

/// Path keywords first, then value shape.
pub fn infer_type(path: &[String], value: &Value) -> TokenType {
    infer_from_path(path).unwrap_or_else(|| infer_from_value(value))
}

pub fn infer_from_path(path: &[String]) -> Option<TokenType> {
    let words = PathWords::new(path);
    let has = |kw: &str| words.has(kw);
    let pair = |a: &str, b: &str| words.has_pair(a, b);

    let inferred = if pair("letter", "spacing") || pair("letter", "tracking") {
        TokenType::LetterSpacing
    } else if pair("line", "height") || has("leading") {
        TokenType::LineHeight
    } else if pair("font", "size") {
        TokenType::FontSize
    } else if pair("font", "weight") {
        TokenType::FontWeight
    } else if pair("font", "family") {
        TokenType::FontFamily
    } else if has("typography") {
        TokenType::Typography
    } else if has("color") || has("colour") {
        TokenType::Color
    } else if has("shadow") {
        TokenType::Shadow
    } else if has("radius") {
        TokenType::Dimension
    } else if has("border") {
        TokenType::Border
    } else if has("spacing") || has("space") || has("gap") {
        TokenType::Spacing
    } else if has("duration") {
        TokenType::Duration
    } else if has("easing") || has("bezier") {
        TokenType::CubicBezier
    } else {
        return None;
    };
    Some(inferred)
}

/// Lowercased words of a token path. Segments split on camelCase humps, digit runs and
/// separators, so `fontSize` and `font-size` both yield `font`, `size`.
struct PathWords {
    words: Vec<String>,
}

impl PathWords {
    fn new(path: &[String]) -> Self {
        let mut words = Vec::new();
        for segment in path {
            let mut current = String::new();
            let mut prev: Option<char> = None;
            for ch in segment.chars() {
                let boundary = match prev {
                    Some(p) => {
                        !ch.is_alphanumeric()
                            || (ch.is_uppercase() && p.is_lowercase())
                            || (ch.is_ascii_digit() != p.is_ascii_digit())
                    }
                    None => !ch.is_alphanumeric(),
                };
                if boundary && !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                if ch.is_alphanumeric() {
                    current.extend(ch.to_lowercase());
                    prev = Some(ch);
                } else {
                    prev = None;
                }
            }
            if !current.is_empty() {
                words.push(current);
            }
        }
        Self { words }
    }

    /// Whole-word match, tolerating a plural `s`
    fn has(&self, keyword: &str) -> bool {
        self.words.iter().any(|w| matches_word(w, keyword))
    }

    /// Both words present, or written as one lowercase word (`fontsize`)
    fn has_pair(&self, first: &str, second: &str) -> bool {
        if self.has(first) && self.has(second) {
            return true;
        }
        let joined = format!("{}{}", first, second);
        self.has(&joined)
    }
}

fn matches_word(word: &str, keyword: &str) -> bool {
    word == keyword || word.strip_suffix('s') == Some(keyword)
}

pub fn infer_from_value(value: &Value) -> TokenType {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if HEX_COLOR.is_match(s) || FUNCTIONAL_COLOR.is_match(s) {
                TokenType::Color
            } else if DURATION.is_match(s) {
                TokenType::Duration
            } else if DIMENSION.is_match(s) {
                TokenType::Dimension
            } else {
                TokenType::String
            }
        }
        Value::Number(_) => TokenType::Number,
        Value::Bool(_) => TokenType::Boolean,
        Value::Object(obj) => {
            if ["r", "g", "b"].iter().all(|k| obj.contains_key(*k)) {
                TokenType::Color
            } else if obj.contains_key("blur")
                || obj.contains_key("offsetX")
                || obj.contains_key("offsetY")
                || obj.contains_key("offset")
            {
                TokenType::Shadow
            } else if obj.contains_key("fontFamily") || obj.contains_key("fontSize") {
                TokenType::Typography
            } else {
                TokenType::Other
            }
        }
        Value::Array(items) if items.len() == 4 && items.iter().all(Value::is_number) => {
            TokenType::CubicBezier
        }
        _ => TokenType::Other,
    }
}
