//! Staging of binary originals in object storage.
//!
//! BLOB rows that produce text have their original bytes uploaded once, so
//! search hits can link back to the file. Two providers are supported:
//!
//! - **S3** (and S3-compatible services via `endpoint_url`), signed with
//!   AWS Signature Version 4 using `hmac` + `sha2`.
//! - **Azure Blob Storage**, authorized with a container SAS token.
//!
//! [`preview_url`] turns the uploaded object's URL into the link stored on
//! index documents.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::{AzureBlobStorageConfig, S3StorageConfig, StorageConfig};
use crate::error::StorageError;
use crate::models::ContentType;

const OFFICE_VIEWER: &str = "https://view.officeapps.live.com/op/view.aspx?src=";

/// Upload bytes under a name and return the object's URL.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError>;
}

/// Build the configured object store, or `None` when staging is disabled.
pub fn build_object_store(
    config: &StorageConfig,
) -> anyhow::Result<Option<Arc<dyn ObjectStore>>> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;
    let store: Arc<dyn ObjectStore> = match config {
        StorageConfig::Disabled => return Ok(None),
        StorageConfig::S3(s3) => Arc::new(S3ObjectStore::new(s3.clone(), client)),
        StorageConfig::AzureBlob(az) => Arc::new(AzureBlobObjectStore::new(az.clone(), client)),
    };
    Ok(Some(store))
}

/// Link stored on index documents for a staged file.
///
/// Office documents open in the Office web viewer; everything else links to
/// the object directly.
pub fn preview_url(url: &str, content_type: &ContentType) -> String {
    match content_type {
        ContentType::Docx
        | ContentType::Doc
        | ContentType::Xlsx
        | ContentType::Xls
        | ContentType::Pptx => format!("{}{}", OFFICE_VIEWER, uri_encode(url)),
        _ => url.to_string(),
    }
}

async fn check_response(name: &str, resp: reqwest::Response) -> Result<(), StorageError> {
    if resp.status().is_success() {
        return Ok(());
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(StorageError::Rejected {
        name: name.to_string(),
        status,
        body: body.chars().take(500).collect(),
    })
}

// ============ Azure Blob ============

pub struct AzureBlobObjectStore {
    config: AzureBlobStorageConfig,
    client: reqwest::Client,
}

impl AzureBlobObjectStore {
    pub fn new(config: AzureBlobStorageConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn blob_url(&self, name: &str) -> String {
        format!(
            "{}/{}",
            self.config.container_url.trim_end_matches('/'),
            encode_key(name)
        )
    }
}

#[async_trait]
impl ObjectStore for AzureBlobObjectStore {
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let url = self.blob_url(name);
        let sas = self.config.sas_token.trim_start_matches('?');

        let resp = self
            .client
            .put(format!("{}?{}", url, sas))
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", "2021-08-06")
            .header("Content-Type", content_type)
            .body(bytes.to_vec())
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        check_response(name, resp).await?;

        tracing::debug!(blob = %name, size = bytes.len(), "staged original in blob storage");
        Ok(url)
    }
}

// ============ S3 ============

pub struct S3ObjectStore {
    config: S3StorageConfig,
    client: reqwest::Client,
}

impl S3ObjectStore {
    pub fn new(config: S3StorageConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn object_key(&self, name: &str) -> String {
        let prefix = self.config.prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }

    /// `(scheme, host, canonical path)` for an object key.
    ///
    /// Custom endpoints use path-style addressing; AWS uses virtual-hosted style.
    fn locate(&self, key: &str) -> (&'static str, String, String) {
        let encoded_key = encode_key(key);
        match &self.config.endpoint_url {
            Some(endpoint) => {
                let scheme = if endpoint.starts_with("http://") {
                    "http"
                } else {
                    "https"
                };
                let host = endpoint
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .trim_end_matches('/')
                    .to_string();
                (
                    scheme,
                    host,
                    format!("/{}/{}", uri_encode(&self.config.bucket), encoded_key),
                )
            }
            None => (
                "https",
                format!(
                    "{}.s3.{}.amazonaws.com",
                    self.config.bucket, self.config.region
                ),
                format!("/{}", encoded_key),
            ),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(
        &self,
        bytes: &[u8],
        name: &str,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let key = self.object_key(name);
        let (scheme, host, canonical_uri) = self.locate(&key);
        let url = format!("{}://{}{}", scheme, host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hex_sha256(bytes);

        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ref token) = self.config.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "PUT\n{}\n\n{}\n{}\n{}",
            canonical_uri, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.config.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.config.secret_access_key,
            &date_stamp,
            &self.config.region,
            "s3",
        );
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.config.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .client
            .put(&url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date)
            .header("Content-Type", content_type)
            .body(bytes.to_vec());
        if let Some(ref token) = self.config.session_token {
            req = req.header("x-amz-security-token", token);
        }

        let resp = req.send().await.map_err(|e| StorageError::Upload {
            name: name.to_string(),
            message: format!("PUT s3://{}/{}: {}", self.config.bucket, key, e),
        })?;
        check_response(name, resp).await?;

        tracing::debug!(bucket = %self.config.bucket, key = %key, size = bytes.len(), "staged original in S3");
        Ok(url)
    }
}

// ============ AWS SigV4 Helpers ============

type HmacSha256 = Hmac<Sha256>;

fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// Percent-encode everything except RFC 3986 unreserved characters.
pub(crate) fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}

fn encode_key(key: &str) -> String {
    key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}
