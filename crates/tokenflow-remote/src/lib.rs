mod github;
mod source;

pub use github::{GitHubConfig, GitHubFileSource, DEFAULT_API_BASE};
pub use source::{is_token_document, RemoteEntryType, RemoteFile, RemoteFileSource};
