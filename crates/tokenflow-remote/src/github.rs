use crate::source::{RemoteEntryType, RemoteFile, RemoteFileSource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::time::Duration;
use tokenflow_core::{BatchOptions, RetryOptions};
use tracing::{debug, info};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("valid pattern"));

/// Repository location of a token set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubConfig {
    pub owner: String,
    pub repo: String,
    pub branch: Option<String>,
    /// Directory (or single file) inside the repository
    pub path: String,
    pub token: Option<String>,
    pub api_base: String,
}

impl GitHubConfig {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: None,
            path: String::new(),
            token: None,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Pick up `GITHUB_TOKEN` unless a token is already set
    pub fn with_env_token(mut self) -> Self {
        if self.token.is_none() {
            self.token = std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty());
        }
        self
    }

    /// `owner/repo`, used as the provenance location of fetched tokens
    pub fn location(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    fn contents_url(&self, path: &str) -> String {
        let base = format!(
            "{}/repos/{}/{}/contents",
            self.api_base.trim_end_matches('/'),
            self.owner,
            self.repo
        );
        let path = path.trim_matches('/');
        if path.is_empty() {
            base
        } else {
            format!("{}/{}", base, path)
        }
    }
}

/// Reads token documents through the GitHub contents API
pub struct GitHubFileSource {
    client: reqwest::Client,
    batch: BatchOptions,
    retry: RetryOptions,
}

impl GitHubFileSource {
    pub fn new(batch: BatchOptions, retry: RetryOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("tokenflow/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            batch,
            retry,
        })
    }

    fn request(&self, config: &GitHubConfig, url: &str, accept: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url).header("Accept", accept);
        if let Some(branch) = &config.branch {
            request = request.query(&[("ref", branch)]);
        }
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }
        request
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("GitHub API error ({}) for {}: {}", status, url, error_text);
        }
        Ok(response)
    }

    async fn list_directory(&self, config: &GitHubConfig, path: &str) -> Result<Vec<RemoteFile>> {
        let url = config.contents_url(path);
        debug!("Listing {}", url);
        let response = self
            .send(self.request(config, &url, "application/vnd.github+json"), &url)
            .await?;
        let body: Value = response
            .json()
            .await
            .context("Failed to parse GitHub listing")?;

        // A file path answers with a single object rather than an array
        let entries = match body {
            Value::Array(items) => items,
            single @ Value::Object(_) => vec![single],
            other => anyhow::bail!("Unexpected GitHub listing for {}: {}", url, other),
        };

        entries
            .into_iter()
            .map(|entry| serde_json::from_value(entry).context("Malformed GitHub listing entry"))
            .collect()
    }
}

#[async_trait]
impl RemoteFileSource for GitHubFileSource {
    type Config = GitHubConfig;

    fn validate_config(&self, config: &GitHubConfig) -> bool {
        NAME_RE.is_match(&config.owner)
            && NAME_RE.is_match(&config.repo)
            && config.branch.as_deref().map_or(true, |b| !b.trim().is_empty())
            && (config.api_base.starts_with("https://") || config.api_base.starts_with("http://"))
    }

    /// Recursive listing of the configured path
    async fn fetch_file_list(&self, config: &GitHubConfig) -> Result<Vec<RemoteFile>> {
        let mut files = Vec::new();
        let mut pending = vec![config.path.clone()];

        while let Some(dir) = pending.pop() {
            for entry in self.list_directory(config, &dir).await? {
                match entry.entry_type {
                    RemoteEntryType::Dir => pending.push(entry.path.clone()),
                    RemoteEntryType::File => files.push(entry),
                    RemoteEntryType::Other => {}
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        info!("Found {} files in {}", files.len(), config.location());
        Ok(files)
    }

    async fn fetch_file_content(&self, config: &GitHubConfig, path: &str) -> Result<Value> {
        let url = config.contents_url(path);
        let response = self
            .send(self.request(config, &url, "application/vnd.github.raw"), &url)
            .await?;
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path))
    }

    fn batch_options(&self) -> BatchOptions {
        self.batch.clone()
    }

    fn retry_options(&self) -> RetryOptions {
        self.retry.clone()
    }
}
