//! Configuration loading and validation.
//!
//! Settings come from an optional TOML file; secrets come from the
//! environment. Every section has defaults, so a missing file is valid.
//! [`Credentials::from_env`] reports all missing variables at once, before
//! any network call is made.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::error::SyncError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawl_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
    #[serde(default = "default_extract_depth")]
    pub extract_depth: String,
    #[serde(default = "default_crawl_timeout")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_crawl_endpoint(),
            max_depth: default_max_depth(),
            extract_depth: default_extract_depth(),
            timeout_secs: default_crawl_timeout(),
        }
    }
}

fn default_crawl_endpoint() -> String {
    "https://api.tavily.com/crawl".to_string()
}
fn default_max_depth() -> u32 {
    5
}
fn default_extract_depth() -> String {
    "advanced".to_string()
}
fn default_crawl_timeout() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    800
}
fn default_chunk_overlap() -> usize {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            dims: default_dims(),
            batch_size: default_embed_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Index name. Falls back to `PINECONE_INDEX`.
    #[serde(default)]
    pub index: Option<String>,
    /// Data-plane host. Resolved through the control plane when unset.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_list_page_size")]
    pub list_page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index: None,
            host: None,
            list_page_size: default_list_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_list_page_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_io_timeout")]
    pub signature_timeout_secs: u64,
    #[serde(default = "default_io_timeout")]
    pub mutation_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            signature_timeout_secs: default_io_timeout(),
            mutation_timeout_secs: default_io_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    50
}
fn default_io_timeout() -> u64 {
    60
}

/// API credentials read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub pinecone_api_key: String,
    pub pinecone_index: String,
    pub tavily_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("pinecone_index", &self.pinecone_index)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    /// Read credentials from the process environment.
    pub fn from_env(config: &Config) -> std::result::Result<Self, SyncError> {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Read credentials through `lookup`, collecting every missing key.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> std::result::Result<Self, SyncError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut get = |key: &str| match lookup(key).filter(|v| !v.trim().is_empty()) {
            Some(v) => v,
            None => {
                missing.push(key.to_string());
                String::new()
            }
        };

        let openai_api_key = get("OPENAI_API_KEY");
        let pinecone_api_key = get("PINECONE_API_KEY");
        let pinecone_index = match &config.store.index {
            Some(index) => index.clone(),
            None => get("PINECONE_INDEX"),
        };
        let tavily_api_key = get("TAVILY_API_KEY");

        if !missing.is_empty() {
            return Err(SyncError::Config(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        Ok(Self {
            openai_api_key,
            pinecone_api_key,
            pinecone_index,
            tavily_api_key,
        })
    }
}

/// Load and validate a config file. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content).with_context(|| "Failed to parse config file")?
    } else {
        Config::default()
    };

    validate(&config)?;
    Ok(config)
}

/// Check settings that serde cannot express.
pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        anyhow::bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        anyhow::bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }
    if config.sync.batch_size == 0 {
        anyhow::bail!("sync.batch_size must be > 0");
    }
    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == 0 {
        anyhow::bail!("embedding.dims must be > 0");
    }
    if config.store.list_page_size == 0 {
        anyhow::bail!("store.list_page_size must be > 0");
    }
    match config.crawler.extract_depth.as_str() {
        "basic" | "advanced" => {}
        other => anyhow::bail!(
            "Unknown crawler.extract_depth: '{}'. Must be basic or advanced.",
            other
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.chunking.chunk_size, 800);
        assert_eq!(config.chunking.chunk_overlap, 120);
        assert_eq!(config.crawler.max_depth, 5);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
    }

    #[test]
    fn test_partial_file_overrides() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("palma.toml");
        std::fs::write(
            &path,
            "[sync]\nbatch_size = 10\n\n[store]\nindex = \"docs\"\n",
        )
        .unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.sync.batch_size, 10);
        assert_eq!(config.sync.mutation_timeout_secs, 60);
        assert_eq!(config.store.index.as_deref(), Some("docs"));
    }

    #[test]
    fn test_rejects_bad_overlap() {
        let mut config = Config::default();
        config.chunking.chunk_overlap = 800;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_batch() {
        let mut config = Config::default();
        config.sync.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_unknown_extract_depth() {
        let mut config = Config::default();
        config.crawler.extract_depth = "deep".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_credentials_report_all_missing() {
        let env: HashMap<&str, &str> = [("OPENAI_API_KEY", "sk"), ("PINECONE_API_KEY", " ")]
            .into_iter()
            .collect();
        let err = Credentials::from_lookup(&Config::default(), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("PINECONE_API_KEY"));
        assert!(msg.contains("PINECONE_INDEX"));
        assert!(msg.contains("TAVILY_API_KEY"));
        assert!(!msg.contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_credentials_index_from_file() {
        let mut config = Config::default();
        config.store.index = Some("docs".to_string());
        let creds = Credentials::from_lookup(&config, |k| match k {
            "PINECONE_INDEX" => None,
            _ => Some("key".to_string()),
        })
        .unwrap();
        assert_eq!(creds.pinecone_index, "docs");
    }
}
