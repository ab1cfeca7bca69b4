//! Change poller.
//!
//! Reads `<table>_changelog` for rows newer than a source's checkpoint, in
//! ascending change-time order, and computes the candidate checkpoint: the
//! change time of the last row read, or the previous checkpoint when nothing
//! is new. The poller never commits; the orchestrator does, after indexing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::db::{classify_sqlx_error, PoolCache};
use crate::error::QueryError;
use crate::models::{ChangeAction, ChangeRow, SourceConfig};

/// Rows read for one source plus the checkpoint they would advance to.
#[derive(Debug, Clone)]
pub struct ChangeBatch {
    pub rows: Vec<ChangeRow>,
    pub new_checkpoint: Option<DateTime<Utc>>,
}

/// Anything that can produce the changelog rows of a source.
#[async_trait]
pub trait ChangeSource: Send + Sync {
    async fn fetch_changes(&self, config: &SourceConfig) -> Result<ChangeBatch, QueryError>;
}

/// Lower bound for the changelog query; the Unix epoch when never indexed.
pub fn lower_bound(checkpoint: Option<DateTime<Utc>>) -> DateTime<Utc> {
    checkpoint.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Candidate checkpoint after reading `rows` (ascending by change time).
///
/// Never earlier than `previous`.
pub fn next_checkpoint(
    rows: &[ChangeRow],
    previous: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    match rows.last() {
        Some(last) => Some(previous.map_or(last.change_time, |p| p.max(last.change_time))),
        None => previous,
    }
}

/// `[A-Za-z_][A-Za-z0-9_$]*`, optionally schema-qualified when `allow_schema`.
fn validate_identifier(name: &str, allow_schema: bool) -> Result<(), QueryError> {
    let parts: Vec<&str> = if allow_schema {
        name.split('.').collect()
    } else {
        vec![name]
    };
    let valid = parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(QueryError::InvalidIdentifier(name.to_string()))
    }
}

/// SQL reading one source's changelog. `$1` is the lower bound.
pub fn changelog_query(table: &str, field: &str) -> Result<String, QueryError> {
    validate_identifier(table, true)?;
    validate_identifier(field, false)?;
    Ok(format!(
        r#"SELECT row_id::text AS row_id,
       change_time::timestamptz AS change_time,
       new_value::text AS "{field}",
       action_type::text AS action_type,
       octet_length(new_value)::bigint AS file_size,
       now() AS uploaded_at
FROM {table}_changelog
WHERE change_time > $1
ORDER BY change_time ASC"#
    ))
}

/// [`ChangeSource`] over PostgreSQL changelog tables.
pub struct PgChangeSource {
    pools: Arc<PoolCache>,
}

impl PgChangeSource {
    pub fn new(pools: Arc<PoolCache>) -> Self {
        Self { pools }
    }
}

#[async_trait]
impl ChangeSource for PgChangeSource {
    async fn fetch_changes(&self, config: &SourceConfig) -> Result<ChangeBatch, QueryError> {
        let sql = changelog_query(&config.table, &config.field)?;
        let pool = self.pools.pool(&config.db)?;
        let since = lower_bound(config.last_checkpoint);

        tracing::debug!(source = %config.label(), since = %since, "polling changelog");

        let records = sqlx::query(&sql)
            .bind(since)
            .fetch_all(&pool)
            .await
            .map_err(classify_sqlx_error)?;

        let mut rows = Vec::with_capacity(records.len());
        for record in &records {
            rows.push(ChangeRow {
                row_id: record
                    .try_get::<Option<String>, _>("row_id")
                    .map_err(classify_sqlx_error)?
                    .unwrap_or_default(),
                change_time: record.try_get("change_time").map_err(classify_sqlx_error)?,
                action: ChangeAction::parse(
                    &record
                        .try_get::<Option<String>, _>("action_type")
                        .map_err(classify_sqlx_error)?
                        .unwrap_or_default(),
                ),
                value: record
                    .try_get::<Option<String>, _>(config.field.as_str())
                    .map_err(classify_sqlx_error)?,
                file_size: record
                    .try_get::<Option<i64>, _>("file_size")
                    .map_err(classify_sqlx_error)?
                    .unwrap_or(0),
                uploaded_at: record.try_get("uploaded_at").map_err(classify_sqlx_error)?,
            });
        }

        let new_checkpoint = next_checkpoint(&rows, config.last_checkpoint);
        Ok(ChangeBatch {
            rows,
            new_checkpoint,
        })
    }
}
