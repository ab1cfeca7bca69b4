//! Core data models used throughout the indexer.
//!
//! These types represent the source configurations, changelog rows, and
//! index documents that flow through the change-capture pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Content type an administrator declared for a column.
///
/// `Blob` means the type is unknown and must be sniffed from the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Txt,
    Json,
    Xml,
    Html,
    Xlsx,
    Pdf,
    Doc,
    Docx,
    Csv,
    Blob,
    Unsupported(String),
}

impl FieldType {
    /// Parse a declared type name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "TXT" => FieldType::Txt,
            "JSON" => FieldType::Json,
            "XML" => FieldType::Xml,
            "HTML" => FieldType::Html,
            "XLSX" => FieldType::Xlsx,
            "PDF" => FieldType::Pdf,
            "DOC" => FieldType::Doc,
            "DOCX" => FieldType::Docx,
            "CSV" => FieldType::Csv,
            "BLOB" => FieldType::Blob,
            _ => FieldType::Unsupported(name.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Txt => "TXT",
            FieldType::Json => "JSON",
            FieldType::Xml => "XML",
            FieldType::Html => "HTML",
            FieldType::Xlsx => "XLSX",
            FieldType::Pdf => "PDF",
            FieldType::Doc => "DOC",
            FieldType::Docx => "DOCX",
            FieldType::Csv => "CSV",
            FieldType::Blob => "BLOB",
            FieldType::Unsupported(name) => name,
        }
    }

    /// Whether the column holds binary bytes rather than text.
    pub fn is_binary(&self) -> bool {
        matches!(
            self,
            FieldType::Blob | FieldType::Xlsx | FieldType::Pdf | FieldType::Doc | FieldType::Docx
        )
    }
}

/// Normalized MIME label produced by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentType {
    Pdf,
    Docx,
    Doc,
    Xlsx,
    Xls,
    /// OLE2 compound file whose concrete Office flavour is unknown.
    Cfb,
    Pptx,
    Ppt,
    Csv,
    Xml,
    TextXml,
    Rtf,
    Json,
    Html,
    PlainText,
    Zip,
    Gzip,
    Png,
    Jpeg,
    Gif,
    OctetStream,
    Other(String),
}

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_DOC: &str = "application/msword";
pub const MIME_XLSX: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
pub const MIME_XLS: &str = "application/vnd.ms-excel";
pub const MIME_CFB: &str = "application/x-cfb";
pub const MIME_PPTX: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation";
pub const MIME_PPT: &str = "application/vnd.ms-powerpoint";
pub const MIME_OCTET_STREAM: &str = "application/octet-stream";

impl ContentType {
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            MIME_PDF => ContentType::Pdf,
            MIME_DOCX => ContentType::Docx,
            MIME_DOC => ContentType::Doc,
            MIME_XLSX => ContentType::Xlsx,
            MIME_XLS => ContentType::Xls,
            MIME_CFB => ContentType::Cfb,
            MIME_PPTX => ContentType::Pptx,
            MIME_PPT => ContentType::Ppt,
            "text/csv" => ContentType::Csv,
            "application/xml" => ContentType::Xml,
            "text/xml" => ContentType::TextXml,
            "application/rtf" => ContentType::Rtf,
            "application/json" => ContentType::Json,
            "text/html" => ContentType::Html,
            "text/plain" => ContentType::PlainText,
            "application/zip" => ContentType::Zip,
            "application/gzip" => ContentType::Gzip,
            "image/png" => ContentType::Png,
            "image/jpeg" => ContentType::Jpeg,
            "image/gif" => ContentType::Gif,
            MIME_OCTET_STREAM => ContentType::OctetStream,
            other => ContentType::Other(other.to_string()),
        }
    }

    pub fn as_mime(&self) -> &str {
        match self {
            ContentType::Pdf => MIME_PDF,
            ContentType::Docx => MIME_DOCX,
            ContentType::Doc => MIME_DOC,
            ContentType::Xlsx => MIME_XLSX,
            ContentType::Xls => MIME_XLS,
            ContentType::Cfb => MIME_CFB,
            ContentType::Pptx => MIME_PPTX,
            ContentType::Ppt => MIME_PPT,
            ContentType::Csv => "text/csv",
            ContentType::Xml => "application/xml",
            ContentType::TextXml => "text/xml",
            ContentType::Rtf => "application/rtf",
            ContentType::Json => "application/json",
            ContentType::Html => "text/html",
            ContentType::PlainText => "text/plain",
            ContentType::Zip => "application/zip",
            ContentType::Gzip => "application/gzip",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Gif => "image/gif",
            ContentType::OctetStream => MIME_OCTET_STREAM,
            ContentType::Other(mime) => mime,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Bytes paired with the type the classifier assigned them.
#[derive(Debug, Clone)]
pub struct ClassifiedContent {
    pub content_type: ContentType,
    pub bytes: Vec<u8>,
}

/// Connection coordinates of a tenant database.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DbCoordinates {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl: bool,
}

/// One (tenant, table, field) binding plus its checkpoint.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Id of the configuration document; doubles as the checkpoint record id.
    pub id: String,
    /// Configuration index the document was read from.
    pub config_index: String,
    pub tenant: String,
    pub db: DbCoordinates,
    pub table: String,
    pub field: String,
    pub field_type: FieldType,
    pub title_field: Option<String>,
    pub category: String,
    /// Destination search index.
    pub index_name: String,
    /// Dotted paths projected out of XML/JSON content, if any.
    pub extract_paths: Vec<String>,
    pub last_checkpoint: Option<DateTime<Utc>>,
}

impl SourceConfig {
    /// Short label used in logs and reports.
    pub fn label(&self) -> String {
        format!("{}/{}.{}", self.tenant, self.table, self.field)
    }
}

/// Kind of change recorded in a changelog row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeAction {
    Insert,
    Update,
    Delete,
    Other(String),
}

impl ChangeAction {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INSERT" => ChangeAction::Insert,
            "UPDATE" => ChangeAction::Update,
            "DELETE" => ChangeAction::Delete,
            _ => ChangeAction::Other(raw.to_string()),
        }
    }

    pub fn index_action(&self) -> IndexAction {
        match self {
            ChangeAction::Insert => IndexAction::Upload,
            ChangeAction::Delete => IndexAction::Delete,
            ChangeAction::Update | ChangeAction::Other(_) => IndexAction::MergeOrUpload,
        }
    }
}

/// One append to a `<table>_changelog` table.
#[derive(Debug, Clone)]
pub struct ChangeRow {
    pub row_id: String,
    pub change_time: DateTime<Utc>,
    pub action: ChangeAction,
    /// UTF-8 text, or a `\x`-prefixed hex string for binary columns.
    pub value: Option<String>,
    pub file_size: i64,
    pub uploaded_at: DateTime<Utc>,
}

/// Write verb for a single index document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IndexAction {
    #[serde(rename = "upload")]
    Upload,
    #[serde(rename = "mergeOrUpload")]
    MergeOrUpload,
    #[serde(rename = "delete")]
    Delete,
}

/// A single search-index document; one per (row, chunk).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexDocument {
    #[serde(rename = "@search.action")]
    pub action: IndexAction,
    pub id: String,
    pub content: String,
    pub title: String,
    pub description: String,
    pub image: Option<String>,
    pub category: String,
    #[serde(rename = "fileUrl")]
    pub file_url: String,
    #[serde(rename = "fileSize")]
    pub file_size: String,
    #[serde(rename = "uploadedAt")]
    pub uploaded_at: String,
}

/// Deterministic document id: `pg_<database>_<table>_<row>_<chunk>`.
///
/// Bytes the search index does not accept in keys are written as `=XX`
/// (uppercase hex), and `=` itself as `=3D`, so distinct inputs keep
/// distinct keys.
pub fn document_id(database: &str, table: &str, row_id: &str, chunk_index: usize) -> String {
    let raw = format!("pg_{}_{}_{}_{}", database, table, row_id, chunk_index);
    let mut id = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'_' | b'-') {
            id.push(byte as char);
        } else {
            id.push_str(&format!("={:02X}", byte));
        }
    }
    id
}

/// Byte count to megabytes with two decimals.
pub fn bytes_to_mb(bytes: i64) -> String {
    format!("{:.2}", bytes as f64 / (1024.0 * 1024.0))
}

/// Canonical wire form of a checkpoint.
pub fn format_checkpoint(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
