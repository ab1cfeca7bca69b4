//! Row processor: one changelog row in, zero or more index documents out.
//!
//! ```text
//! value ──resolve_bytes──► bytes ──┬─ BLOB ──► classify ─► extract_sniffed ─┐
//!                                  └─ other ─────────────► extract_declared ┤
//!                                                                           ▼
//!        IndexDocument × chunks ◄── chunk_text ◄── (stage original, BLOB) ◄─ text
//! ```
//!
//! Extraction runs on the blocking thread pool. A row whose extraction or
//! staging fails returns a [`RowError`]; the orchestrator logs it and moves on
//! to the next row.

use std::sync::Arc;

use crate::chunk::chunk_text;
use crate::error::{ExtractError, RowError};
use crate::extract::{ExtractOptions, Extraction, ExtractorRegistry};
use crate::models::{
    bytes_to_mb, document_id, format_checkpoint, ChangeAction, ChangeRow, ContentType, FieldType,
    IndexAction, IndexDocument, SourceConfig,
};
use crate::storage::{preview_url, ObjectStore};
use crate::structured::{render_value, resolve_path};

const NO_DESCRIPTION: &str = "No description";

/// What processing a row produced.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    Documents(Vec<IndexDocument>),
    /// Nothing to index; the reason is logged by the caller.
    Skipped(String),
}

pub struct RowProcessor {
    registry: Arc<ExtractorRegistry>,
    object_store: Option<Arc<dyn ObjectStore>>,
    chunk_max_chars: usize,
}

impl RowProcessor {
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        object_store: Option<Arc<dyn ObjectStore>>,
        chunk_max_chars: usize,
    ) -> Self {
        Self {
            registry,
            object_store,
            chunk_max_chars,
        }
    }

    pub async fn process(
        &self,
        row: &ChangeRow,
        config: &SourceConfig,
    ) -> Result<RowOutcome, RowError> {
        let value = match &row.value {
            Some(v) => v.as_str(),
            None if row.action == ChangeAction::Delete => {
                return Ok(RowOutcome::Documents(vec![self.delete_document(row, config, 0)]));
            }
            None => return Ok(RowOutcome::Skipped("field value is null".to_string())),
        };

        let extracted = match resolve_bytes(value, &config.field_type) {
            Ok(bytes) => self.extract(bytes, config).await,
            Err(e) => Err(e),
        };
        let (extraction, content_type, bytes) = match extracted {
            Ok(parts) => parts,
            Err(e) if row.action == ChangeAction::Delete => {
                tracing::debug!(
                    row_id = %row.row_id,
                    error = %e,
                    "deleted value unreadable; removing first chunk"
                );
                return Ok(RowOutcome::Documents(vec![self.delete_document(row, config, 0)]));
            }
            Err(e) => return Err(e.into()),
        };

        let text = match extraction {
            Some(ref e) if !e.text.is_empty() => e.text.as_str(),
            _ if row.action == ChangeAction::Delete => {
                return Ok(RowOutcome::Documents(vec![self.delete_document(row, config, 0)]));
            }
            Some(_) => return Ok(RowOutcome::Skipped("extracted text is empty".to_string())),
            None => {
                let label = content_type
                    .as_ref()
                    .map(|ct| ct.as_mime().to_string())
                    .unwrap_or_else(|| config.field_type.as_str().to_string());
                return Ok(RowOutcome::Skipped(format!("no extractor for {}", label)));
            }
        };

        let chunks = chunk_text(text, self.chunk_max_chars);

        if row.action == ChangeAction::Delete {
            let docs = (0..chunks.len())
                .map(|i| self.delete_document(row, config, i))
                .collect();
            return Ok(RowOutcome::Documents(docs));
        }

        let file_url = match (&content_type, &self.object_store) {
            (Some(ct), Some(store)) => {
                let name = format!("pg_{}_{}_file_{}", config.db.database, config.table, row.row_id);
                let url = store.upload(&bytes, &name, ct.as_mime()).await?;
                preview_url(&url, ct)
            }
            _ => String::new(),
        };

        let title = extraction
            .as_ref()
            .and_then(|e| title_from_tree(e, config.title_field.as_deref()))
            .unwrap_or_else(|| format!("PG Row ID {}", row.row_id));
        let action = row.action.index_action();
        let file_size = bytes_to_mb(row.file_size);
        let uploaded_at = format_checkpoint(&row.uploaded_at);

        let docs = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| IndexDocument {
                action,
                id: document_id(&config.db.database, &config.table, &row.row_id, i),
                content: chunk.to_string(),
                title: title.clone(),
                description: NO_DESCRIPTION.to_string(),
                image: None,
                category: config.category.clone(),
                file_url: file_url.clone(),
                file_size: file_size.clone(),
                uploaded_at: uploaded_at.clone(),
            })
            .collect();
        Ok(RowOutcome::Documents(docs))
    }

    /// Run extraction off the async runtime.
    ///
    /// Returns the extraction, the sniffed content type for BLOB columns, and
    /// the bytes back for staging.
    async fn extract(
        &self,
        bytes: Vec<u8>,
        config: &SourceConfig,
    ) -> Result<(Option<Extraction>, Option<ContentType>, Vec<u8>), ExtractError> {
        let registry = Arc::clone(&self.registry);
        let field_type = config.field_type.clone();
        let options = ExtractOptions {
            paths: config.extract_paths.clone(),
        };

        tokio::task::spawn_blocking(move || -> Result<_, ExtractError> {
            if field_type == FieldType::Blob {
                let content = registry.classify(bytes);
                let extraction = registry.extract_sniffed(&content, &options)?;
                Ok((extraction, Some(content.content_type), content.bytes))
            } else {
                let extraction = registry.extract_declared(&field_type, &bytes, &options)?;
                Ok((extraction, None, bytes))
            }
        })
        .await
        .map_err(|e| ExtractError::Aborted(e.to_string()))?
    }

    fn delete_document(
        &self,
        row: &ChangeRow,
        config: &SourceConfig,
        chunk: usize,
    ) -> IndexDocument {
        IndexDocument {
            action: IndexAction::Delete,
            id: document_id(&config.db.database, &config.table, &row.row_id, chunk),
            content: String::new(),
            title: format!("PG Row ID {}", row.row_id),
            description: NO_DESCRIPTION.to_string(),
            image: None,
            category: config.category.clone(),
            file_url: String::new(),
            file_size: bytes_to_mb(0),
            uploaded_at: format_checkpoint(&row.uploaded_at),
        }
    }
}

/// Bytes of a field value.
///
/// Binary columns arrive as PostgreSQL `bytea` hex text (`\x...`); everything
/// else is taken as UTF-8.
pub fn resolve_bytes(value: &str, field_type: &FieldType) -> Result<Vec<u8>, ExtractError> {
    if field_type.is_binary() {
        if let Some(hex_digits) = value.strip_prefix("\\x") {
            return hex::decode(hex_digits).map_err(|e| ExtractError::Decode(e.to_string()));
        }
    }
    Ok(value.as_bytes().to_vec())
}

fn title_from_tree(extraction: &Extraction, title_field: Option<&str>) -> Option<String> {
    let tree = extraction.tree.as_ref()?;
    resolve_path(tree, title_field?).and_then(render_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use crate::models::DbCoordinates;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    fn config(field_type: FieldType) -> SourceConfig {
        SourceConfig {
            id: "cfg-1".into(),
            config_index: "datasource_postgresql_connection_acme".into(),
            tenant: "ACME".into(),
            db: DbCoordinates {
                host: "localhost".into(),
                port: 5432,
                user: "u".into(),
                password: "p".into(),
                database: "crm".into(),
                ssl: false,
            },
            table: "notes".into(),
            field: "body".into(),
            field_type,
            title_field: None,
            category: "Notes".into(),
            index_name: "tenant_acme".into(),
            extract_paths: Vec::new(),
            last_checkpoint: None,
        }
    }

    fn row(action: ChangeAction, value: Option<&str>) -> ChangeRow {
        ChangeRow {
            row_id: "42".into(),
            change_time: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            action,
            value: value.map(str::to_string),
            file_size: 2 * 1024 * 1024,
            uploaded_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap(),
        }
    }

    fn processor(store: Option<Arc<dyn ObjectStore>>) -> RowProcessor {
        RowProcessor::new(Arc::new(ExtractorRegistry::default()), store, 30_000)
    }

    fn documents(outcome: RowOutcome) -> Vec<IndexDocument> {
        match outcome {
            RowOutcome::Documents(docs) => docs,
            RowOutcome::Skipped(reason) => panic!("row skipped: {}", reason),
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        uploads: Mutex<Vec<(String, String, usize)>>,
    }

    #[async_trait]
    impl ObjectStore for MemoryStore {
        async fn upload(
            &self,
            bytes: &[u8],
            name: &str,
            content_type: &str,
        ) -> Result<String, StorageError> {
            self.uploads
                .lock()
                .unwrap()
                .push((name.to_string(), content_type.to_string(), bytes.len()));
            Ok(format!("https://files.example.com/{}", name))
        }
    }

    #[tokio::test]
    async fn text_insert_becomes_upload() {
        let docs = documents(
            processor(None)
                .process(&row(ChangeAction::Insert, Some("hello world")), &config(FieldType::Txt))
                .await
                .unwrap(),
        );
        assert_eq!(docs.len(), 1);
        let doc = &docs[0];
        assert_eq!(doc.action, IndexAction::Upload);
        assert_eq!(doc.id, "pg_crm_notes_42_0");
        assert_eq!(doc.content, "hello world");
        assert_eq!(doc.title, "PG Row ID 42");
        assert_eq!(doc.description, "No description");
        assert_eq!(doc.file_url, "");
        assert_eq!(doc.file_size, "2.00");
        assert_eq!(doc.category, "Notes");
    }

    #[tokio::test]
    async fn long_text_is_chunked_with_sequential_ids() {
        let text = "x".repeat(65_000);
        let docs = documents(
            processor(None)
                .process(&row(ChangeAction::Update, Some(&text)), &config(FieldType::Txt))
                .await
                .unwrap(),
        );
        let sizes: Vec<usize> = docs.iter().map(|d| d.content.chars().count()).collect();
        assert_eq!(sizes, vec![30_000, 30_000, 5_000]);
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["pg_crm_notes_42_0", "pg_crm_notes_42_1", "pg_crm_notes_42_2"]);
        assert!(docs.iter().all(|d| d.action == IndexAction::MergeOrUpload));
    }

    #[tokio::test]
    async fn blob_html_is_staged_with_preview_url() {
        let store = Arc::new(MemoryStore::default());
        let html = hex::encode("  <html><body><p>Quarterly report</p></body></html>");
        let value = format!("\\x{}", html);
        let docs = documents(
            processor(Some(store.clone() as Arc<dyn ObjectStore>))
                .process(&row(ChangeAction::Update, Some(&value)), &config(FieldType::Blob))
                .await
                .unwrap(),
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "Quarterly report");
        assert_eq!(docs[0].file_url, "https://files.example.com/pg_crm_notes_file_42");

        let uploads = store.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "pg_crm_notes_file_42");
        assert_eq!(uploads[0].1, "text/html");
    }

    #[tokio::test]
    async fn unsupported_blob_is_skipped_without_upload() {
        let store = Arc::new(MemoryStore::default());
        let value = format!("\\x{}", hex::encode([0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]));
        let outcome = processor(Some(store.clone() as Arc<dyn ObjectStore>))
            .process(&row(ChangeAction::Insert, Some(&value)), &config(FieldType::Blob))
            .await
            .unwrap();
        assert!(matches!(outcome, RowOutcome::Skipped(_)));
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_docx_is_a_row_error() {
        let err = processor(None)
            .process(
                &row(ChangeAction::Insert, Some("not a zip archive")),
                &config(FieldType::Docx),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RowError::Extract(ExtractError::Ooxml(_))));
    }

    #[tokio::test]
    async fn json_title_field_is_used() {
        let mut cfg = config(FieldType::Json);
        cfg.title_field = Some("meta.title".into());
        let docs = documents(
            processor(None)
                .process(
                    &row(ChangeAction::Insert, Some(r#"{"meta":{"title":"Invoice 7"},"n":1}"#)),
                    &cfg,
                )
                .await
                .unwrap(),
        );
        assert_eq!(docs[0].title, "Invoice 7");

        cfg.title_field = Some("meta.missing".into());
        let docs = documents(
            processor(None)
                .process(&row(ChangeAction::Insert, Some(r#"{"meta":{}}"#)), &cfg)
                .await
                .unwrap(),
        );
        assert_eq!(docs[0].title, "PG Row ID 42");
    }

    #[tokio::test]
    async fn delete_without_value_removes_first_chunk() {
        let docs = documents(
            processor(None)
                .process(&row(ChangeAction::Delete, None), &config(FieldType::Txt))
                .await
                .unwrap(),
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].action, IndexAction::Delete);
        assert_eq!(docs[0].id, "pg_crm_notes_42_0");
    }

    #[tokio::test]
    async fn delete_with_value_removes_every_chunk() {
        let store = Arc::new(MemoryStore::default());
        let text = "y".repeat(45_000);
        let docs = documents(
            processor(Some(store.clone() as Arc<dyn ObjectStore>))
                .process(&row(ChangeAction::Delete, Some(&text)), &config(FieldType::Txt))
                .await
                .unwrap(),
        );
        assert_eq!(docs.len(), 2);
        assert!(docs.iter().all(|d| d.action == IndexAction::Delete));
        assert_eq!(docs[1].id, "pg_crm_notes_42_1");
        assert!(store.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unreadable_delete_value_removes_first_chunk() {
        for (field_type, value) in [
            (FieldType::Docx, "not a zip"),
            (FieldType::Blob, "\\xzz"),
            (FieldType::Json, "{broken"),
        ] {
            let docs = documents(
                processor(None)
                    .process(&row(ChangeAction::Delete, Some(value)), &config(field_type))
                    .await
                    .unwrap(),
            );
            assert_eq!(docs.len(), 1);
            assert_eq!(docs[0].action, IndexAction::Delete);
            assert_eq!(docs[0].id, "pg_crm_notes_42_0");
        }
    }

    #[tokio::test]
    async fn null_value_on_insert_is_skipped() {
        let outcome = processor(None)
            .process(&row(ChangeAction::Insert, None), &config(FieldType::Txt))
            .await
            .unwrap();
        assert!(matches!(outcome, RowOutcome::Skipped(_)));
    }

    #[test]
    fn hex_values_decode_for_binary_types() {
        assert_eq!(resolve_bytes("\\x48656c6c6f", &FieldType::Blob).unwrap(), b"Hello");
        assert_eq!(resolve_bytes("\\x4869", &FieldType::Pdf).unwrap(), b"Hi");
        assert_eq!(resolve_bytes("\\x4869", &FieldType::Txt).unwrap(), b"\\x4869");
        assert_eq!(resolve_bytes("plain", &FieldType::Blob).unwrap(), b"plain");
        assert!(matches!(
            resolve_bytes("\\xzz", &FieldType::Blob),
            Err(ExtractError::Decode(_))
        ));
    }
}
