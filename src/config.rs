use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk::DEFAULT_MAX_CHARS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub elasticsearch: ElasticsearchConfig,
    pub search: SearchConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Configuration indices are every index whose name starts with this.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
    /// Destination index is `<destination_prefix><tenant lowercase>`.
    #[serde(default = "default_destination_prefix")]
    pub destination_prefix: String,
    #[serde(default = "default_max_configs_per_index")]
    pub max_configs_per_index: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            index_prefix: default_index_prefix(),
            destination_prefix: default_destination_prefix(),
            max_configs_per_index: default_max_configs_per_index(),
        }
    }
}

fn default_index_prefix() -> String {
    "datasource_postgresql_connection_".to_string()
}
fn default_destination_prefix() -> String {
    "tenant_".to_string()
}
fn default_max_configs_per_index() -> usize {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_batch_documents")]
    pub max_batch_documents: usize,
    /// Upper bound on one batch's JSON body. The service refuses requests
    /// over 16 MB.
    #[serde(default = "default_max_batch_bytes")]
    pub max_batch_bytes: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_version() -> String {
    "2021-04-30-Preview".to_string()
}
fn default_max_batch_documents() -> usize {
    1000
}
fn default_max_batch_bytes() -> usize {
    14 * 1024 * 1024
}
fn default_timeout_secs() -> u64 {
    30
}

/// Where binary originals are staged. Tagged by `provider`.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum StorageConfig {
    #[default]
    Disabled,
    S3(S3StorageConfig),
    AzureBlob(AzureBlobStorageConfig),
}

#[derive(Debug, Deserialize, Clone)]
pub struct S3StorageConfig {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub prefix: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AzureBlobStorageConfig {
    /// `https://<account>.blob.core.windows.net/<container>`
    pub container_url: String,
    /// SAS token with create/write permission, without the leading `?`.
    pub sas_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    #[serde(default = "default_chunk_max_chars")]
    pub chunk_max_chars: usize,
    #[serde(default = "default_max_concurrent_sources")]
    pub max_concurrent_sources: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_max_chars: default_chunk_max_chars(),
            max_concurrent_sources: default_max_concurrent_sources(),
        }
    }
}

fn default_chunk_max_chars() -> usize {
    DEFAULT_MAX_CHARS
}
fn default_max_concurrent_sources() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_port")]
    pub default_port: u16,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            default_port: default_port(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}
fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_port() -> u16 {
    5432
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

fn default_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.discovery.index_prefix.is_empty() {
        anyhow::bail!("discovery.index_prefix must not be empty");
    }

    if config.pipeline.chunk_max_chars == 0 {
        anyhow::bail!("pipeline.chunk_max_chars must be > 0");
    }

    if config.pipeline.max_concurrent_sources == 0 {
        anyhow::bail!("pipeline.max_concurrent_sources must be >= 1");
    }

    if !(1..=1000).contains(&config.search.max_batch_documents) {
        anyhow::bail!("search.max_batch_documents must be in [1, 1000]");
    }

    if config.search.max_batch_bytes == 0 {
        anyhow::bail!("search.max_batch_bytes must be > 0");
    }

    if config.schedule.interval_secs == 0 {
        anyhow::bail!("schedule.interval_secs must be > 0");
    }

    for (name, url) in [
        ("elasticsearch.url", &config.elasticsearch.url),
        ("search.endpoint", &config.search.endpoint),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, url);
        }
    }

    if let StorageConfig::S3(s3) = &config.storage {
        if s3.bucket.is_empty() {
            anyhow::bail!("storage.bucket must be set when provider is 's3'");
        }
    }

    Ok(config)
}
