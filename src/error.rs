//! Typed errors for each pipeline stage.
//!
//! Every stage (extraction, changelog query, object staging, index write,
//! checkpoint update) has its own error enum. Row-level failures are wrapped
//! in [`RowError`] and never leave the row processor; source-level failures
//! are wrapped in [`SourceError`] and never leave the orchestrator's
//! per-source boundary.

use thiserror::Error;

/// Failure while turning bytes into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
    #[error("XML parse failed: {0}")]
    Xml(String),
    #[error("JSON parse failed: {0}")]
    Json(String),
    #[error("HTML parse failed: {0}")]
    Html(String),
    #[error("field decode failed: {0}")]
    Decode(String),
    #[error("extractor aborted: {0}")]
    Aborted(String),
}

/// Failure while reading a changelog table.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("database connection failed: {0}")]
    Connect(String),
    #[error("changelog query failed: {0}")]
    Query(String),
    #[error("unexpected row shape: {0}")]
    Decode(String),
}

/// Failure while staging an original file in object storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload of '{name}' failed: {message}")]
    Upload { name: String, message: String },
    #[error("object storage rejected '{name}' (HTTP {status}): {body}")]
    Rejected {
        name: String,
        status: u16,
        body: String,
    },
}

/// Failure while writing documents to the search index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("search index request failed: {0}")]
    Request(String),
    #[error("search index rejected batch (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("{failed} of {total} documents were not indexed (first: {first_key})")]
    Partial {
        failed: usize,
        total: usize,
        first_key: String,
    },
}

/// Failure while reading source configurations or advancing a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("configuration index request failed: {0}")]
    Request(String),
    #[error("configuration index returned HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed configuration index response: {0}")]
    Malformed(String),
}

/// Why a single changelog row could not be turned into documents.
#[derive(Debug, Error)]
pub enum RowError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Stage of the per-source sequence where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Poll,
    Process,
    Index,
    Advance,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Poll => "poll",
            Stage::Process => "process",
            Stage::Index => "index",
            Stage::Advance => "advance",
        };
        f.write_str(s)
    }
}

/// Discriminated failure kind used by the orchestrator to classify outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network or connection trouble; retried on the next scheduled run.
    Transient,
    /// Content could not be extracted.
    Extraction,
    /// The changelog query itself was rejected.
    Query,
    /// The search index refused all or part of a write.
    Write,
    /// The source configuration cannot work as written.
    Config,
}

/// A failure that aborted one source's sequence.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("poll failed: {0}")]
    Poll(#[from] QueryError),
    #[error("index write failed: {0}")]
    Index(#[from] IndexError),
    #[error("checkpoint advance failed: {0}")]
    Advance(#[from] CheckpointError),
}

impl SourceError {
    pub fn stage(&self) -> Stage {
        match self {
            SourceError::Poll(_) => Stage::Poll,
            SourceError::Index(_) => Stage::Index,
            SourceError::Advance(_) => Stage::Advance,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Poll(QueryError::InvalidIdentifier(_)) => ErrorKind::Config,
            SourceError::Poll(QueryError::Connect(_)) => ErrorKind::Transient,
            SourceError::Poll(QueryError::Query(_) | QueryError::Decode(_)) => ErrorKind::Query,
            SourceError::Index(IndexError::Request(_)) => ErrorKind::Transient,
            SourceError::Index(IndexError::Rejected { .. } | IndexError::Partial { .. }) => {
                ErrorKind::Write
            }
            SourceError::Advance(CheckpointError::Request(_)) => ErrorKind::Transient,
            SourceError::Advance(_) => ErrorKind::Write,
        }
    }
}

impl RowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RowError::Extract(_) => ErrorKind::Extraction,
            RowError::Storage(_) => ErrorKind::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_error_kinds() {
        let err = SourceError::from(QueryError::Connect("refused".into()));
        assert_eq!(err.kind(), ErrorKind::Transient);
        assert_eq!(err.stage(), Stage::Poll);

        let err = SourceError::from(QueryError::InvalidIdentifier("a;b".into()));
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = SourceError::from(IndexError::Partial {
            failed: 1,
            total: 3,
            first_key: "pg_db_t_1_0".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Write);
        assert_eq!(err.stage(), Stage::Index);
        assert!(err.to_string().contains("1 of 3"));
    }

    #[test]
    fn row_error_display_is_transparent() {
        let err = RowError::from(ExtractError::Pdf("bad xref".into()));
        assert_eq!(err.to_string(), "PDF extraction failed: bad xref");
        assert_eq!(err.kind(), ErrorKind::Extraction);
    }
}
