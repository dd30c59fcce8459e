pub mod batch;
pub mod collection;
pub mod config;
pub mod processor;
pub mod resolver;
pub mod types;

pub use batch::{
    BatchError, BatchExecutor, BatchFailure, BatchOptions, BatchResult, RetryBatchResult,
    RetryOptions,
};
pub use collection::{infer_collection, COLLECTION_KEYWORDS, DEFAULT_COLLECTION};
pub use config::TokenflowConfig;
pub use processor::{decode_document, TokenProcessor};
pub use resolver::{resolve_aliases, ResolutionReport};
pub use types::ProcessOptions;
