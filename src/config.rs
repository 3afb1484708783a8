//! TOML configuration.
//!
//! Only `[server]` and `[db]` are required; every other section falls back to
//! defaults. Secrets (search API keys, AWS credentials) are never read from
//! the file, only from the environment.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub result_cache: ResultCacheConfig,
    #[serde(default)]
    pub curation: CurationConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_cache_max")]
    pub cache_max: usize,
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_tavily_endpoint")]
    pub tavily_endpoint: String,
    #[serde(default = "default_exa_endpoint")]
    pub exa_endpoint: String,
    #[serde(default = "default_duckduckgo_endpoint")]
    pub duckduckgo_endpoint: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            cache_max: default_cache_max(),
            timeout_secs: default_search_timeout(),
            tavily_endpoint: default_tavily_endpoint(),
            exa_endpoint: default_exa_endpoint(),
            duckduckgo_endpoint: default_duckduckgo_endpoint(),
        }
    }
}

fn default_cache_max() -> usize {
    200
}
fn default_search_timeout() -> u64 {
    30
}
fn default_tavily_endpoint() -> String {
    "https://api.tavily.com/search".to_string()
}
fn default_exa_endpoint() -> String {
    "https://api.exa.ai/search".to_string()
}
fn default_duckduckgo_endpoint() -> String {
    "https://html.duckduckgo.com/html/".to_string()
}

/// S3 bucket used as the remote result cache.
///
/// `bucket`, `prefix`, and `region` fall back to `S3_BUCKET`, `S3_PREFIX`,
/// and `AWS_REGION` when not set in the file.
#[derive(Debug, Deserialize, Clone)]
pub struct ResultCacheConfig {
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_cache_timeout")]
    pub timeout_secs: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            bucket: None,
            prefix: None,
            region: None,
            endpoint_url: None,
            timeout_secs: default_cache_timeout(),
        }
    }
}

fn default_cache_timeout() -> u64 {
    10
}

impl ResultCacheConfig {
    pub fn resolved_bucket(&self) -> Option<String> {
        self.bucket
            .clone()
            .or_else(|| std::env::var("S3_BUCKET").ok())
            .filter(|b| !b.trim().is_empty())
    }

    pub fn resolved_prefix(&self) -> String {
        self.prefix
            .clone()
            .or_else(|| std::env::var("S3_PREFIX").ok())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "bookshelf".to_string())
    }

    pub fn resolved_region(&self) -> String {
        resolve_region(&self.region)
    }
}

/// Bedrock text generation used for scoring and summaries.
///
/// `model_id` and `region` fall back to `BEDROCK_MODEL_ID` and `AWS_REGION`
/// when not set in the file.
#[derive(Debug, Deserialize, Clone)]
pub struct CurationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_max_summaries")]
    pub max_summaries: usize,
    #[serde(default = "default_summary_threshold")]
    pub summary_threshold: usize,
    #[serde(default = "default_curation_timeout")]
    pub timeout_secs: u64,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model_id: None,
            region: None,
            endpoint_url: None,
            max_summaries: default_max_summaries(),
            summary_threshold: default_summary_threshold(),
            timeout_secs: default_curation_timeout(),
        }
    }
}

pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";

fn default_true() -> bool {
    true
}
fn default_max_summaries() -> usize {
    20
}
fn default_summary_threshold() -> usize {
    30
}
fn default_curation_timeout() -> u64 {
    60
}

impl CurationConfig {
    pub fn resolved_model_id(&self) -> String {
        self.model_id
            .clone()
            .or_else(|| std::env::var("BEDROCK_MODEL_ID").ok())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL_ID.to_string())
    }

    pub fn resolved_region(&self) -> String {
        resolve_region(&self.region)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SpeechConfig {
    #[serde(default = "default_speech_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_speech_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_speech_timeout")]
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: default_speech_endpoint(),
            max_chars: default_speech_max_chars(),
            timeout_secs: default_speech_timeout(),
        }
    }
}

fn default_speech_endpoint() -> String {
    "https://translate.google.com/translate_tts".to_string()
}
fn default_speech_max_chars() -> usize {
    2000
}
fn default_speech_timeout() -> u64 {
    30
}

fn resolve_region(configured: &Option<String>) -> String {
    configured
        .clone()
        .or_else(|| std::env::var("AWS_REGION").ok())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "us-east-1".to_string())
}

impl Config {
    /// Configuration with every optional section defaulted. Used by tests and
    /// by commands that can run without a config file.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
            },
            db: DbConfig {
                path: PathBuf::from("./data/shelf.sqlite"),
            },
            search: SearchConfig::default(),
            result_cache: ResultCacheConfig::default(),
            curation: CurationConfig::default(),
            speech: SpeechConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind.trim().is_empty() {
            anyhow::bail!("server.bind must not be empty");
        }
        if self.search.cache_max == 0 {
            anyhow::bail!("search.cache_max must be > 0");
        }
        if self.search.timeout_secs == 0
            || self.result_cache.timeout_secs == 0
            || self.curation.timeout_secs == 0
            || self.speech.timeout_secs == 0
        {
            anyhow::bail!("timeout_secs must be > 0");
        }
        if self.curation.max_summaries > self.curation.summary_threshold {
            anyhow::bail!(
                "curation.max_summaries ({}) must be <= curation.summary_threshold ({})",
                self.curation.max_summaries,
                self.curation.summary_threshold
            );
        }
        if self.speech.max_chars == 0 {
            anyhow::bail!("speech.max_chars must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
