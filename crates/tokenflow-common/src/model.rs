use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Canonical, format-neutral design token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: String,
    pub path: Vec<String>,
    pub name: String,
    pub qualified_name: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub raw_value: Value,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_to: Option<String>,
    pub project_id: String,
    pub collection: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    pub source_format: SourceFormat,
    pub source: TokenSource,
    pub tags: Vec<String>,
    pub status: TokenStatus,
    pub created: String,
    pub last_modified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl Token {
    pub fn is_alias(&self) -> bool {
        self.alias_to.is_some()
    }
}

/// Semantic token types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenType {
    Color,
    Dimension,
    Spacing,
    FontSize,
    FontWeight,
    FontFamily,
    LineHeight,
    LetterSpacing,
    Shadow,
    Border,
    Duration,
    CubicBezier,
    Number,
    String,
    Typography,
    Boolean,
    Other,
}

impl TokenType {
    /// Map an author-declared type marker (`$type`, `type`, SD category) onto a token type.
    pub fn from_marker(marker: &str) -> Self {
        let normalized: String = marker
            .chars()
            .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "color" | "colour" => TokenType::Color,
            "dimension" | "size" | "sizing" | "borderradius" | "radius" | "borderwidth" => {
                TokenType::Dimension
            }
            "spacing" | "space" => TokenType::Spacing,
            "fontsize" | "fontsizes" => TokenType::FontSize,
            "fontweight" | "fontweights" => TokenType::FontWeight,
            "fontfamily" | "fontfamilies" => TokenType::FontFamily,
            "lineheight" | "lineheights" => TokenType::LineHeight,
            "letterspacing" => TokenType::LetterSpacing,
            "shadow" | "boxshadow" => TokenType::Shadow,
            "border" => TokenType::Border,
            "duration" | "time" => TokenType::Duration,
            "cubicbezier" | "easing" => TokenType::CubicBezier,
            "number" | "opacity" => TokenType::Number,
            "string" | "content" => TokenType::String,
            "typography" => TokenType::Typography,
            "boolean" => TokenType::Boolean,
            _ => TokenType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Color => "color",
            TokenType::Dimension => "dimension",
            TokenType::Spacing => "spacing",
            TokenType::FontSize => "fontSize",
            TokenType::FontWeight => "fontWeight",
            TokenType::FontFamily => "fontFamily",
            TokenType::LineHeight => "lineHeight",
            TokenType::LetterSpacing => "letterSpacing",
            TokenType::Shadow => "shadow",
            TokenType::Border => "border",
            TokenType::Duration => "duration",
            TokenType::CubicBezier => "cubicBezier",
            TokenType::Number => "number",
            TokenType::String => "string",
            TokenType::Typography => "typography",
            TokenType::Boolean => "boolean",
            TokenType::Other => "other",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    W3c,
    StyleDictionary,
    Figma,
    Custom,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::W3c => "w3c",
            SourceFormat::StyleDictionary => "style-dictionary",
            SourceFormat::Figma => "figma",
            SourceFormat::Custom => "custom",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Github,
    Gitlab,
    Local,
    Url,
}

impl SourceType {
    /// Lenient parse of a provenance label, defaulting to `Local`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "github" => SourceType::Github,
            "gitlab" => SourceType::Gitlab,
            "url" | "remote" | "http" | "https" => SourceType::Url,
            _ => SourceType::Local,
        }
    }
}

/// Provenance of an ingested token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSource {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub location: String,
    pub imported: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Active,
    Deprecated,
}

/// A raw token document together with the path it was loaded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenFile {
    pub path: String,
    pub content: Value,
}

impl TokenFile {
    pub fn new(path: impl Into<String>, content: Value) -> Self {
        Self {
            path: path.into(),
            content,
        }
    }
}

/// Outcome counts reported by a target-system sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl ImportStats {
    pub fn total(&self) -> usize {
        self.added + self.updated + self.skipped
    }
}
