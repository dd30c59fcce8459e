pub const DEFAULT_COLLECTION: &str = "default";

/// Path segments that name a collection outright
pub const COLLECTION_KEYWORDS: &[&str] = &[
    "primitive",
    "primitives",
    "semantic",
    "semantics",
    "base",
    "core",
    "foundation",
    "component",
    "components",
];

/// Infer a collection name from a file path.
///
/// The first segment (lower-cased, extension stripped) that is a collection keyword wins;
/// otherwise the final segment minus its extension.
pub fn infer_collection(path: &str) -> String {
    let lowered = path.to_lowercase();
    let segments: Vec<&str> = lowered
        .split(|c: char| c == '/' || c == '\\')
        .map(strip_extension)
        .filter(|s| !s.is_empty())
        .collect();

    if let Some(keyword) = segments
        .iter()
        .find(|segment| COLLECTION_KEYWORDS.contains(*segment))
    {
        return keyword.to_string();
    }

    segments
        .last()
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string())
}

fn strip_extension(segment: &str) -> &str {
    match segment.rfind('.') {
        Some(0) | None => segment,
        Some(dot) => &segment[..dot],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_directory() {
        assert_eq!(infer_collection("tokens/Primitives/colors.json"), "primitives");
        assert_eq!(infer_collection("design\\semantic\\light.json"), "semantic");
    }

    #[test]
    fn test_keyword_file_name() {
        assert_eq!(infer_collection("tokens/core.json"), "core");
        assert_eq!(infer_collection("components.tokens.json"), "components.tokens");
    }

    #[test]
    fn test_first_keyword_wins() {
        assert_eq!(infer_collection("base/components/button.json"), "base");
    }

    #[test]
    fn test_fallback_to_file_name() {
        assert_eq!(infer_collection("tokens/brand-colors.json"), "brand-colors");
        assert_eq!(infer_collection("spacing"), "spacing");
    }

    #[test]
    fn test_empty_path() {
        assert_eq!(infer_collection(""), DEFAULT_COLLECTION);
        assert_eq!(infer_collection("/"), DEFAULT_COLLECTION);
    }
}
