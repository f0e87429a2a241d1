use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub index: IndexConfig,
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store backend: `s3` or `filesystem`.
    pub provider: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, GCS interop).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// Root directory for the `filesystem` provider.
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_pending_prefix")]
    pub pending_prefix: String,
    #[serde(default = "default_archived_prefix")]
    pub archived_prefix: String,
    #[serde(default)]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_pending_prefix() -> String {
    "uploaded/".to_string()
}
fn default_archived_prefix() -> String {
    "embedded/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Whether a query with no retrieved context still reaches the model.
    /// Deliberately has no default: callers must decide this policy.
    pub allow_empty_context: bool,
}

fn default_similarity_threshold() -> f32 {
    0.50
}
fn default_top_k() -> usize {
    12
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_chat_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_chat_retries")]
    pub max_retries: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            url: None,
            max_retries: 2,
            timeout_secs: 60,
        }
    }
}

fn default_chat_provider() -> String {
    "openai".to_string()
}
fn default_chat_retries() -> u32 {
    2
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestionConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.store.provider.as_str() {
        "s3" => {
            if config.store.bucket.is_empty() {
                anyhow::bail!("store.bucket must be set for the s3 provider");
            }
        }
        "filesystem" => {
            if config.store.root.is_none() {
                anyhow::bail!("store.root must be set for the filesystem provider");
            }
        }
        other => anyhow::bail!(
            "Unknown store provider: '{}'. Must be s3 or filesystem.",
            other
        ),
    }

    if config.store.pending_prefix.is_empty() || config.store.archived_prefix.is_empty() {
        anyhow::bail!("store.pending_prefix and store.archived_prefix must be non-empty");
    }
    if config.store.pending_prefix == config.store.archived_prefix {
        anyhow::bail!("store.pending_prefix and store.archived_prefix must differ");
    }

    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }

    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        anyhow::bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }
    if config.retrieval.top_k < 1 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified for provider '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 for provider '{}'",
                    config.embedding.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    match config.chat.provider.as_str() {
        "openai" | "ollama" => {
            if config.chat.model.is_none() {
                anyhow::bail!(
                    "chat.model must be specified for provider '{}'",
                    config.chat.provider
                );
            }
        }
        other => anyhow::bail!(
            "Unknown chat provider: '{}'. Must be openai or ollama.",
            other
        ),
    }

    if config.ingestion.interval_secs == 0 {
        anyhow::bail!("ingestion.interval_secs must be > 0");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> String {
        r#"
[store]
provider = "filesystem"
root = "./blobs"

[index]
path = "./data/ragpipe.sqlite"

[chunking]
max_tokens = 700

[retrieval]
allow_empty_context = false

[embedding]
provider = "openai"
model = "text-embedding-3-small"
dims = 1536

[chat]
provider = "openai"
model = "gpt-4o-mini"

[server]
bind = "127.0.0.1:8080"
"#
        .to_string()
    }

    #[test]
    fn parses_minimal_config() {
        let config: Config = toml::from_str(&base_toml()).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.store.pending_prefix, "uploaded/");
        assert_eq!(config.store.archived_prefix, "embedded/");
        assert_eq!(config.retrieval.similarity_threshold, 0.50);
        assert_eq!(config.retrieval.top_k, 12);
        assert_eq!(config.ingestion.interval_secs, 60);
        assert!(!config.retrieval.allow_empty_context);
    }

    #[test]
    fn allow_empty_context_is_required() {
        let toml_str = base_toml().replace("allow_empty_context = false", "");
        let parsed: Result<Config, _> = toml::from_str(&toml_str);
        assert!(parsed.is_err());
    }

    #[test]
    fn rejects_equal_prefixes() {
        let toml_str = base_toml().replace(
            "root = \"./blobs\"",
            "root = \"./blobs\"\npending_prefix = \"docs/\"\narchived_prefix = \"docs/\"",
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_threshold_out_of_range() {
        let toml_str = base_toml().replace(
            "allow_empty_context = false",
            "allow_empty_context = false\nsimilarity_threshold = 1.5",
        );
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn rejects_unknown_store_provider() {
        let toml_str = base_toml().replace("provider = \"filesystem\"", "provider = \"ftp\"");
        let config: Config = toml::from_str(&toml_str).unwrap();
        assert!(validate(&config).is_err());
    }
}
