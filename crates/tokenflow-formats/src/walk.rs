use serde_json::{Map, Value};

/// Keys starting with `$` carry group or document metadata, never tokens.
pub fn is_metadata_key(key: &str) -> bool {
    key.starts_with('$')
}

fn is_leaf(node: &Map<String, Value>) -> bool {
    node.contains_key("$value") || node.contains_key("value")
}

/// A token leaf found while walking a document
#[derive(Debug, Clone)]
pub struct Leaf<'a> {
    pub path: Vec<String>,
    pub node: &'a Map<String, Value>,
    /// Nearest ancestor group `$type`, if any
    pub inherited_type: Option<&'a str>,
}

impl Leaf<'_> {
    pub fn qualified_name(&self) -> String {
        self.path.join(".")
    }
}

/// Leaf tallies by value-marker convention
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeafCounts {
    pub total: usize,
    /// Leaves carrying `$value`
    pub dollar_marked: usize,
    /// Leaves carrying `value` but no `$value`
    pub plain_marked: usize,
}

impl LeafCounts {
    /// `matching / total`, clamped to [0, 1]; 0 for a document without leaves.
    pub fn ratio(&self, matching: usize) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (matching as f64 / self.total as f64).clamp(0.0, 1.0)
    }
}

/// Depth-first walk in document order. Leaves are not descended into.
pub fn collect_leaves(document: &Value) -> Vec<Leaf<'_>> {
    let mut leaves = Vec::new();
    if let Some(root) = document.as_object() {
        walk(root, &mut Vec::new(), None, &mut leaves);
    }
    leaves
}

fn walk<'a>(
    node: &'a Map<String, Value>,
    path: &mut Vec<String>,
    inherited_type: Option<&'a str>,
    out: &mut Vec<Leaf<'a>>,
) {
    let group_type = node
        .get("$type")
        .and_then(|t| t.as_str())
        .or(inherited_type);

    for (key, child) in node {
        if is_metadata_key(key) {
            continue;
        }
        let Some(child_obj) = child.as_object() else {
            continue;
        };

        path.push(key.clone());
        if is_leaf(child_obj) {
            out.push(Leaf {
                path: path.clone(),
                node: child_obj,
                inherited_type: group_type,
            });
        } else {
            walk(child_obj, path, group_type, out);
        }
        path.pop();
    }
}

pub fn count_leaves(document: &Value) -> LeafCounts {
    let mut counts = LeafCounts::default();
    for leaf in collect_leaves(document) {
        counts.total += 1;
        if leaf.node.contains_key("$value") {
            counts.dollar_marked += 1;
        } else {
            counts.plain_marked += 1;
        }
    }
    counts
}
