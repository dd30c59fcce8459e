use tokenflow_common::SourceType;

/// Options controlling a processing run
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub project_id: String,
    /// Explicit collection; inferred from the file path (or "default") when absent
    pub collection: Option<String>,
    pub theme: Option<String>,
    pub brand: Option<String>,
    /// Force a registered strategy by name instead of auto-detecting
    pub format: Option<String>,
    pub source_type: SourceType,
    /// Provenance location prefix (repository, directory, URL)
    pub location: String,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

impl ProcessOptions {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            collection: None,
            theme: None,
            brand: None,
            format: None,
            source_type: SourceType::Local,
            location: String::new(),
            branch: None,
            commit: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_source(mut self, source_type: SourceType, location: impl Into<String>) -> Self {
        self.source_type = source_type;
        self.location = location.into();
        self
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_theme(mut self, theme: Option<String>, brand: Option<String>) -> Self {
        self.theme = theme;
        self.brand = brand;
        self
    }

    /// Provenance location for a file processed under these options
    pub fn location_for(&self, file_path: &str) -> String {
        if self.location.is_empty() {
            file_path.to_string()
        } else if file_path.is_empty() {
            self.location.clone()
        } else {
            format!("{}/{}", self.location.trim_end_matches('/'), file_path)
        }
    }
}
