//! Search index writer.
//!
//! Documents are pushed to the Azure AI Search document API in batches of at
//! most `max_batch_documents` and at most `max_batch_bytes` of JSON. A push
//! succeeds only if every batch was accepted and every document in every
//! batch reports `status: true`; anything less is an [`IndexError`] and the caller must not advance the
//! source's checkpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Duration;

use crate::config::SearchConfig;
use crate::error::IndexError;
use crate::models::IndexDocument;

/// Summary of a successful push.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    pub documents: usize,
    pub batches: usize,
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn push(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<PushReport, IndexError>;
}

pub struct AzureSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    max_batch: usize,
    max_batch_bytes: usize,
}

impl AzureSearchIndex {
    pub fn new(config: &SearchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_version: config.api_version.clone(),
            max_batch: config.max_batch_documents.clamp(1, 1000),
            max_batch_bytes: config.max_batch_bytes.max(1),
        })
    }

    fn url(&self, index: &str) -> String {
        format!(
            "{}/indexes/{}/docs/index?api-version={}",
            self.endpoint, index, self.api_version
        )
    }

    async fn push_batch(&self, index: &str, batch: &[IndexDocument]) -> Result<(), IndexError> {
        let resp = self
            .client
            .post(self.url(index))
            .header("api-key", &self.api_key)
            .json(&BatchRequest { value: batch })
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(IndexError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        // An empty or non-JSON success body has no per-document results to check.
        let Ok(parsed) = serde_json::from_str::<BatchResponse>(&body) else {
            return Ok(());
        };
        let failed: Vec<&DocumentResult> = parsed.value.iter().filter(|r| !r.status).collect();
        if let Some(first) = failed.first() {
            tracing::warn!(
                index,
                key = %first.key,
                message = first.error_message.as_deref().unwrap_or(""),
                "document rejected by search index"
            );
            return Err(IndexError::Partial {
                failed: failed.len(),
                total: batch.len(),
                first_key: first.key.clone(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for AzureSearchIndex {
    async fn push(
        &self,
        index: &str,
        documents: &[IndexDocument],
    ) -> Result<PushReport, IndexError> {
        let mut report = PushReport::default();
        for range in batch_ranges(documents, self.max_batch, self.max_batch_bytes)? {
            let batch = &documents[range];
            self.push_batch(index, batch).await?;
            report.documents += batch.len();
            report.batches += 1;
        }
        tracing::debug!(index, documents = report.documents, batches = report.batches, "pushed documents");
        Ok(report)
    }
}

/// `{"value":[]}` around the documents.
const ENVELOPE_BYTES: usize = 12;

/// Split `documents` into consecutive batches bounded by count and by
/// serialized size. A document larger than `max_bytes` on its own is sent
/// alone.
fn batch_ranges(
    documents: &[IndexDocument],
    max_docs: usize,
    max_bytes: usize,
) -> Result<Vec<Range<usize>>, IndexError> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut bytes = ENVELOPE_BYTES;
    for (i, doc) in documents.iter().enumerate() {
        let size = serde_json::to_vec(doc)
            .map_err(|e| IndexError::Request(format!("encode {}: {}", doc.id, e)))?
            .len()
            + 1;
        let count = i - start;
        if count > 0 && (count >= max_docs || bytes + size > max_bytes) {
            ranges.push(start..i);
            start = i;
            bytes = ENVELOPE_BYTES;
        }
        bytes += size;
    }
    if start < documents.len() {
        ranges.push(start..documents.len());
    }
    Ok(ranges)
}

#[derive(Serialize)]
struct BatchRequest<'a> {
    value: &'a [IndexDocument],
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<DocumentResult>,
}

#[derive(Deserialize)]
struct DocumentResult {
    #[serde(default)]
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}
