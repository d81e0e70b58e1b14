//! TOML configuration.
//!
//! Every section has defaults, so an empty file is a valid config. The file
//! itself must exist. [`load_config`] parses and validates it.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use api_index_core::manager::{DEFAULT_BATCH_SIZE, DEFAULT_SEARCH_LIMIT};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    /// Kept for parity with hosted vector stores. Only `false` is accepted.
    #[serde(default)]
    pub anonymized_telemetry: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            anonymized_telemetry: false,
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/.apidx/index.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_indexing_batch_size")]
    pub batch_size: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_indexing_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

fn default_limit() -> usize {
    DEFAULT_SEARCH_LIMIT
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
        }
    }
}

fn default_provider() -> String {
    "hash".to_string()
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

impl EmbeddingConfig {
    /// Remote providers need an explicit model and dimensionality.
    pub fn is_remote(&self) -> bool {
        matches!(self.provider.as_str(), "openai" | "ollama")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.index.anonymized_telemetry {
        bail!("index.anonymized_telemetry must be false");
    }

    if config.indexing.batch_size == 0 {
        bail!("indexing.batch_size must be > 0");
    }

    if config.search.default_limit < 1 {
        bail!("search.default_limit must be >= 1");
    }

    match config.embedding.provider.as_str() {
        "hash" | "disabled" | "openai" | "ollama" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be hash, openai, ollama, local, or disabled.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    if config.embedding.is_remote() {
        if config.embedding.dims.is_none() {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Config> {
        let config: Config = toml::from_str(s)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.index.path, PathBuf::from("./data/.apidx/index.sqlite"));
        assert!(!config.index.anonymized_telemetry);
        assert_eq!(config.indexing.batch_size, 50);
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.embedding.provider, "hash");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse("[indexing]\nbatch_size = 0").is_err());
        assert!(parse("[search]\ndefault_limit = 0").is_err());
        assert!(parse("[index]\nanonymized_telemetry = true").is_err());
        assert!(parse("[embedding]\nprovider = \"chroma\"").is_err());
        assert!(parse("[embedding]\nprovider = \"hash\"\ndims = 0").is_err());
    }

    #[test]
    fn test_remote_provider_requires_model_and_dims() {
        assert!(parse("[embedding]\nprovider = \"openai\"\ndims = 1536").is_err());
        assert!(parse("[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"").is_err());
        let config = parse(
            "[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768",
        )
        .unwrap();
        assert!(config.embedding.is_remote());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = load_config(Path::new("/nonexistent/apidx.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
