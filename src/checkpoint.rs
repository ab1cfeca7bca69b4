//! Source configurations and their checkpoints.
//!
//! Configuration documents live in per-tenant Elasticsearch indices that
//! share a name prefix (`datasource_postgresql_connection_<tenant>`). Each
//! document describes one (tenant, table, field) source and carries its
//! checkpoint in `source.updatedAt`, so the configuration and the cursor are
//! read and written through the same store.
//!
//! A failed checkpoint write leaves the previous value in place; the next
//! run re-polls from there.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::{DiscoveryConfig, ElasticsearchConfig};
use crate::error::CheckpointError;
use crate::models::{format_checkpoint, DbCoordinates, FieldType, SourceConfig};
use crate::storage::uri_encode;

/// Read source configurations and advance their checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// All source configurations found in indices whose name starts with `prefix`.
    async fn list_source_configs(&self, prefix: &str)
        -> Result<Vec<SourceConfig>, CheckpointError>;

    /// Persist `checkpoint` on the configuration document `config_id`.
    async fn advance_checkpoint(
        &self,
        config_index: &str,
        config_id: &str,
        checkpoint: DateTime<Utc>,
    ) -> Result<(), CheckpointError>;
}

/// Write `candidate` only if it moves the checkpoint forward.
///
/// Returns whether a write happened.
pub async fn commit_if_advanced<S>(
    store: &S,
    config: &SourceConfig,
    candidate: DateTime<Utc>,
) -> Result<bool, CheckpointError>
where
    S: CheckpointStore + ?Sized,
{
    if let Some(current) = config.last_checkpoint {
        if candidate <= current {
            return Ok(false);
        }
    }
    store
        .advance_checkpoint(&config.config_index, &config.id, candidate)
        .await?;
    Ok(true)
}

/// [`CheckpointStore`] backed by the Elasticsearch REST API.
pub struct ElasticsearchCheckpointStore {
    client: reqwest::Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    discovery: DiscoveryConfig,
    default_port: u16,
}

impl ElasticsearchCheckpointStore {
    pub fn new(
        es: &ElasticsearchConfig,
        discovery: &DiscoveryConfig,
        default_port: u16,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(es.timeout_secs))
            .build()
            .context("Failed to build Elasticsearch HTTP client")?;
        Ok(Self {
            client,
            base_url: es.url.trim_end_matches('/').to_string(),
            username: es.username.clone(),
            password: es.password.clone(),
            discovery: discovery.clone(),
            default_port,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let req = self
            .client
            .request(method, format!("{}/{}", self.base_url, path));
        match &self.username {
            Some(user) => req.basic_auth(user, self.password.as_deref()),
            None => req,
        }
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CheckpointError> {
        let resp = req
            .send()
            .await
            .map_err(|e| CheckpointError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CheckpointError::Rejected {
                status,
                body: body.chars().take(500).collect(),
            });
        }
        Ok(resp)
    }

    async fn list_indices(&self, prefix: &str) -> Result<Vec<String>, CheckpointError> {
        let resp = self
            .send(self.request(reqwest::Method::GET, "_cat/indices?format=json"))
            .await?;
        let entries: Vec<CatIndex> = resp
            .json()
            .await
            .map_err(|e| CheckpointError::Malformed(e.to_string()))?;
        let mut names: Vec<String> = entries
            .into_iter()
            .map(|e| e.index)
            .filter(|name| name.starts_with(prefix))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn fetch_index_configs(
        &self,
        index: &str,
    ) -> Result<Vec<SourceConfig>, CheckpointError> {
        let body = json!({
            "query": { "match_all": {} },
            "size": self.discovery.max_configs_per_index,
        });
        let resp = self
            .send(
                self.request(reqwest::Method::POST, &format!("{}/_search", index))
                    .json(&body),
            )
            .await?;
        let result: SearchResponse = resp
            .json()
            .await
            .map_err(|e| CheckpointError::Malformed(e.to_string()))?;

        let mut configs = Vec::new();
        for hit in result.hits.hits {
            match parse_config_document(index, &hit.id, hit.source, &self.discovery, self.default_port)
            {
                Ok(config) => configs.push(config),
                Err(e) => tracing::warn!(
                    index,
                    id = %hit.id,
                    error = %e,
                    "skipping malformed source configuration"
                ),
            }
        }
        Ok(configs)
    }
}

#[async_trait]
impl CheckpointStore for ElasticsearchCheckpointStore {
    async fn list_source_configs(
        &self,
        prefix: &str,
    ) -> Result<Vec<SourceConfig>, CheckpointError> {
        let indices = self.list_indices(prefix).await?;
        let mut configs = Vec::new();
        for index in &indices {
            match self.fetch_index_configs(index).await {
                Ok(found) => configs.extend(found),
                Err(e) => tracing::error!(index = %index, error = %e, "failed to read configuration index"),
            }
        }
        Ok(configs)
    }

    async fn advance_checkpoint(
        &self,
        config_index: &str,
        config_id: &str,
        checkpoint: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let body = json!({
            "doc": { "source": { "updatedAt": format_checkpoint(&checkpoint) } }
        });
        self.send(
            self.request(
                reqwest::Method::POST,
                &format!("{}/_update/{}", config_index, uri_encode(config_id)),
            )
            .json(&body),
        )
        .await?;
        tracing::debug!(config_index, config_id, checkpoint = %format_checkpoint(&checkpoint), "checkpoint advanced");
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatIndex {
    index: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Deserialize)]
struct SearchHits {
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source")]
    source: serde_json::Value,
}

#[derive(Deserialize)]
struct ConfigDocument {
    source: RawSource,
    /// Older documents carry the checkpoint at the top level.
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
}

#[derive(Deserialize)]
struct RawSource {
    coid: String,
    host: String,
    #[serde(default)]
    port: Option<PortValue>,
    user: String,
    #[serde(default)]
    password: String,
    database: String,
    table_name: String,
    field_name: String,
    field_type: String,
    #[serde(default)]
    category: String,
    #[serde(default)]
    title_field: Option<String>,
    #[serde(default)]
    extract_paths: Vec<String>,
    #[serde(default)]
    ssl: Option<bool>,
    #[serde(rename = "updatedAt", default)]
    updated_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

/// Build a [`SourceConfig`] from a configuration document's `_source`.
pub fn parse_config_document(
    index: &str,
    id: &str,
    source: serde_json::Value,
    discovery: &DiscoveryConfig,
    default_port: u16,
) -> Result<SourceConfig, CheckpointError> {
    let doc: ConfigDocument =
        serde_json::from_value(source).map_err(|e| CheckpointError::Malformed(e.to_string()))?;
    let raw = doc.source;

    let port = match raw.port {
        None => default_port,
        Some(PortValue::Number(p)) => p,
        Some(PortValue::Text(s)) => s
            .trim()
            .parse()
            .map_err(|_| CheckpointError::Malformed(format!("invalid port '{}'", s)))?,
    };

    let nested = parse_checkpoint(raw.updated_at.as_deref())?;
    let top_level = parse_checkpoint(doc.updated_at.as_deref())?;
    let last_checkpoint = nested.max(top_level);

    Ok(SourceConfig {
        id: id.to_string(),
        config_index: index.to_string(),
        index_name: format!(
            "{}{}",
            discovery.destination_prefix,
            raw.coid.to_lowercase()
        ),
        tenant: raw.coid,
        db: DbCoordinates {
            host: raw.host,
            port,
            user: raw.user,
            password: raw.password,
            database: raw.database,
            ssl: raw.ssl.unwrap_or(true),
        },
        table: raw.table_name,
        field: raw.field_name,
        field_type: FieldType::parse(&raw.field_type),
        title_field: raw.title_field.filter(|t| !t.is_empty()),
        category: raw.category,
        extract_paths: raw.extract_paths,
        last_checkpoint,
    })
}

fn parse_checkpoint(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, CheckpointError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| CheckpointError::Malformed(format!("invalid updatedAt '{}': {}", s, e))),
    }
}
