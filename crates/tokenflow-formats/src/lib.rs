mod infer;
mod reference;
mod registry;
mod style_dictionary;
mod types;
mod w3c;
mod walk;

pub use infer::{infer_from_path, infer_from_value, infer_type};
pub use reference::{extract_reference, is_reference};
pub use registry::{DetectedFormat, FormatRegistry};
pub use style_dictionary::StyleDictionaryStrategy;
pub use types::{FormatStrategy, ParsedToken};
pub use w3c::W3cStrategy;
pub use walk::{collect_leaves, count_leaves, is_metadata_key, Leaf, LeafCounts};
