mod identity;
mod model;

pub use identity::{fnv1a_64, token_id};
pub use model::{
    ImportStats, SourceFormat, SourceType, Token, TokenFile, TokenSource, TokenStatus, TokenType,
};

/// Common error types
#[derive(thiserror::Error, Debug)]
pub enum TokenflowError {
    #[error("no registered format strategy recognises this document{}", detail_suffix(.0))]
    FormatDetection(Option<String>),

    #[error("format strategy '{0}' is already registered")]
    DuplicateStrategy(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("no tokens could be processed from {files} file(s)")]
    NoTokensProcessed { files: usize },

    #[error("backup failed for project '{project_id}': {reason}")]
    BackupFailed { project_id: String, reason: String },

    #[error("migration failed for project '{project_id}': {reason}")]
    MigrationFailed { project_id: String, reason: String },

    #[error("serialized project is {size} bytes which exceeds the {limit} byte (1 MiB) storage limit")]
    SizeLimitExceeded { size: usize, limit: usize },

    #[error("unsupported storage version '{0}'")]
    UnsupportedVersion(String),

    #[error("unsupported storage format for project '{0}'")]
    UnsupportedFormat(String),

    #[error("backup not found: {0}")]
    BackupNotFound(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error("pipeline '{pipeline}' failed: {reason}")]
    Pipeline { pipeline: String, reason: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(" ({})", d),
        None => String::new(),
    }
}

impl TokenflowError {
    /// Label of the operation that produced this error, for user-facing messages.
    pub fn operation(&self) -> &'static str {
        match self {
            TokenflowError::FormatDetection(_) => "format detection",
            TokenflowError::DuplicateStrategy(_) => "format registration",
            TokenflowError::Parse(_) | TokenflowError::NoTokensProcessed { .. } => {
                "token processing"
            }
            TokenflowError::BackupFailed { .. } => "backup",
            TokenflowError::MigrationFailed { .. } => "migration",
            TokenflowError::SizeLimitExceeded { .. } => "save",
            TokenflowError::UnsupportedVersion(_) | TokenflowError::UnsupportedFormat(_) => "load",
            TokenflowError::BackupNotFound(_) => "restore",
            TokenflowError::Store(_) => "storage",
            TokenflowError::Pipeline { .. } => "dual-run validation",
            TokenflowError::Json(_) => "serialization",
            TokenflowError::Generic(_) => "internal",
        }
    }

    /// Human-readable message prefixed with the failing operation.
    pub fn user_message(&self) -> String {
        format!("{}: {}", self.operation(), self)
    }
}

pub type Result<T> = std::result::Result<T, TokenflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_failure_mentions_backup() {
        let err = TokenflowError::BackupFailed {
            project_id: "p1".to_string(),
            reason: "disk full".to_string(),
        };
        assert!(err.to_string().contains("backup"));
        assert_eq!(err.operation(), "backup");
    }

    #[test]
    fn test_size_limit_names_limit() {
        let err = TokenflowError::SizeLimitExceeded {
            size: 2_000_000,
            limit: 1_048_576,
        };
        let msg = err.user_message();
        assert!(msg.starts_with("save: "));
        assert!(msg.contains("1048576"));
        assert!(msg.contains("1 MiB"));
    }

    #[test]
    fn test_unsupported_version_names_version() {
        let err = TokenflowError::UnsupportedVersion("3.1".to_string());
        assert!(err.to_string().contains("3.1"));
    }

    #[test]
    fn test_format_detection_detail() {
        let plain = TokenflowError::FormatDetection(None);
        let detailed = TokenflowError::FormatDetection(Some("unknown format 'yaml'".to_string()));
        assert!(!plain.to_string().contains('('));
        assert!(detailed.to_string().contains("unknown format 'yaml'"));
    }
}
