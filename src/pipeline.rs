//! Pipeline orchestrator.
//!
//! One run discovers every source configuration and drives each source
//! through its sequence:
//!
//! ```text
//! DISCOVER ─► for each source (bounded parallelism):
//!               POLL ─► PROCESS ROWS ─► INDEX ─► ADVANCE CHECKPOINT
//! ```
//!
//! Failures are contained per source. A source whose poll, index write or
//! checkpoint write fails keeps its previous checkpoint and is retried on the
//! next run; other sources are unaffected. Row-level failures are logged and
//! the row is skipped. The checkpoint only advances after every document of
//! the batch has been accepted by the search index.
//!
//! A source that is still running from a previous run is reported as
//! [`SourceOutcome::Busy`] and left alone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};

use crate::checkpoint::{commit_if_advanced, CheckpointStore, ElasticsearchCheckpointStore};
use crate::config::Config;
use crate::db::PoolCache;
use crate::error::{CheckpointError, ErrorKind, SourceError, Stage};
use crate::extract::ExtractorRegistry;
use crate::indexer::{AzureSearchIndex, SearchIndex};
use crate::models::{IndexDocument, SourceConfig};
use crate::poller::{ChangeSource, PgChangeSource};
use crate::process::{RowOutcome, RowProcessor};
use crate::storage::build_object_store;

/// Result of one source within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceOutcome {
    Indexed {
        rows: usize,
        skipped_rows: usize,
        documents: usize,
        checkpoint: Option<DateTime<Utc>>,
    },
    NoChanges,
    Failed {
        stage: Stage,
        kind: ErrorKind,
        message: String,
    },
    Busy,
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub config_index: String,
    pub config_id: String,
    pub source: String,
    pub outcome: SourceOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    /// Set when the configuration indices could not be listed.
    pub discovery_error: Option<String>,
}

impl RunReport {
    pub fn failed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.outcome, SourceOutcome::Failed { .. }))
            .count()
    }

    pub fn indexed_documents(&self) -> usize {
        self.sources
            .iter()
            .map(|s| match s.outcome {
                SourceOutcome::Indexed { documents, .. } => documents,
                _ => 0,
            })
            .sum()
    }

    /// Document ids are only unique within one configuration index, so a
    /// source is looked up by both.
    pub fn outcome(&self, config_index: &str, config_id: &str) -> Option<&SourceOutcome> {
        self.sources
            .iter()
            .find(|s| s.config_index == config_index && s.config_id == config_id)
            .map(|s| &s.outcome)
    }
}

/// Per-source single-flight flags, keyed by configuration index and id.
#[derive(Default)]
pub struct SourceLocks {
    flags: Mutex<HashMap<(String, String), Arc<AtomicBool>>>,
}

impl SourceLocks {
    /// `None` when the source is already running.
    pub fn try_acquire(&self, config_index: &str, config_id: &str) -> Option<RunGuard> {
        let flag = {
            let mut flags = self.flags.lock().ok()?;
            flags
                .entry((config_index.to_string(), config_id.to_string()))
                .or_insert_with(|| Arc::new(AtomicBool::new(false)))
                .clone()
        };
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard { flag })
    }

    pub fn is_running(&self, config_index: &str, config_id: &str) -> bool {
        let key = (config_index.to_string(), config_id.to_string());
        self.flags
            .lock()
            .ok()
            .and_then(|flags| flags.get(&key).map(|f| f.load(Ordering::SeqCst)))
            .unwrap_or(false)
    }
}

/// Releases the source's flag when dropped, including on panic.
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

pub struct Pipeline {
    store: Arc<dyn CheckpointStore>,
    changes: Arc<dyn ChangeSource>,
    processor: Arc<RowProcessor>,
    index: Arc<dyn SearchIndex>,
    locks: Arc<SourceLocks>,
    index_prefix: String,
    max_concurrent_sources: usize,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        changes: Arc<dyn ChangeSource>,
        processor: Arc<RowProcessor>,
        index: Arc<dyn SearchIndex>,
        index_prefix: impl Into<String>,
        max_concurrent_sources: usize,
    ) -> Self {
        Self {
            store,
            changes,
            processor,
            index,
            locks: Arc::new(SourceLocks::default()),
            index_prefix: index_prefix.into(),
            max_concurrent_sources: max_concurrent_sources.max(1),
        }
    }

    /// Wire the production collaborators from configuration.
    pub fn from_config(config: &Config, pools: Arc<PoolCache>) -> anyhow::Result<Self> {
        let store = ElasticsearchCheckpointStore::new(
            &config.elasticsearch,
            &config.discovery,
            config.database.default_port,
        )?;
        let processor = RowProcessor::new(
            Arc::new(ExtractorRegistry::default()),
            build_object_store(&config.storage)?,
            config.pipeline.chunk_max_chars,
        );
        let index = AzureSearchIndex::new(&config.search)?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(PgChangeSource::new(pools)),
            Arc::new(processor),
            Arc::new(index),
            config.discovery.index_prefix.clone(),
            config.pipeline.max_concurrent_sources,
        ))
    }

    pub fn locks(&self) -> Arc<SourceLocks> {
        Arc::clone(&self.locks)
    }

    /// All source configurations currently registered.
    pub async fn discover(&self) -> Result<Vec<SourceConfig>, CheckpointError> {
        self.store.list_source_configs(&self.index_prefix).await
    }

    /// One full pass over every source.
    pub async fn run_once(&self) -> RunReport {
        let configs = match self.discover().await {
            Ok(configs) => configs,
            Err(e) => {
                tracing::error!(error = %e, "source discovery failed");
                return RunReport {
                    sources: Vec::new(),
                    discovery_error: Some(e.to_string()),
                };
            }
        };

        if configs.is_empty() {
            tracing::info!(prefix = %self.index_prefix, "no source configurations found");
            return RunReport::default();
        }
        tracing::info!(sources = configs.len(), "starting run");

        let this = self;
        let mut sources: Vec<SourceReport> = stream::iter(configs)
            .map(move |config| async move {
                let outcome = this.run_source(&config).await;
                SourceReport {
                    config_index: config.config_index.clone(),
                    config_id: config.id.clone(),
                    source: config.label(),
                    outcome,
                }
            })
            .buffer_unordered(self.max_concurrent_sources)
            .collect()
            .await;
        sources.sort_by(|a, b| {
            a.source
                .cmp(&b.source)
                .then_with(|| a.config_index.cmp(&b.config_index))
                .then_with(|| a.config_id.cmp(&b.config_id))
        });

        let report = RunReport {
            sources,
            discovery_error: None,
        };
        tracing::info!(
            sources = report.sources.len(),
            failed = report.failed(),
            documents = report.indexed_documents(),
            "run complete"
        );
        report
    }

    /// Drive one source through poll, process, index and advance.
    pub async fn run_source(&self, config: &SourceConfig) -> SourceOutcome {
        let Some(_guard) = self.locks.try_acquire(&config.config_index, &config.id) else {
            tracing::info!(source = %config.label(), "source still running; skipping");
            return SourceOutcome::Busy;
        };

        match self.sync_source(config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    source = %config.label(),
                    stage = %e.stage(),
                    error = %e,
                    "source failed; checkpoint unchanged"
                );
                SourceOutcome::Failed {
                    stage: e.stage(),
                    kind: e.kind(),
                    message: e.to_string(),
                }
            }
        }
    }

    async fn sync_source(&self, config: &SourceConfig) -> Result<SourceOutcome, SourceError> {
        let batch = self.changes.fetch_changes(config).await?;
        if batch.rows.is_empty() {
            tracing::debug!(source = %config.label(), "no new changelog rows");
            return Ok(SourceOutcome::NoChanges);
        }

        let mut documents: Vec<IndexDocument> = Vec::new();
        let mut skipped_rows = 0;
        for row in &batch.rows {
            match self.processor.process(row, config).await {
                Ok(RowOutcome::Documents(docs)) => documents.extend(docs),
                Ok(RowOutcome::Skipped(reason)) => {
                    skipped_rows += 1;
                    tracing::debug!(
                        source = %config.label(),
                        row_id = %row.row_id,
                        reason = %reason,
                        "row skipped"
                    );
                }
                Err(e) => {
                    skipped_rows += 1;
                    tracing::warn!(
                        source = %config.label(),
                        stage = %Stage::Process,
                        row_id = %row.row_id,
                        kind = ?e.kind(),
                        error = %e,
                        "row failed; skipping"
                    );
                }
            }
        }

        if !documents.is_empty() {
            self.index.push(&config.index_name, &documents).await?;
        }

        let mut checkpoint = config.last_checkpoint;
        if let Some(candidate) = batch.new_checkpoint {
            if commit_if_advanced(self.store.as_ref(), config, candidate).await? {
                checkpoint = Some(candidate);
            }
        }

        tracing::info!(
            source = %config.label(),
            rows = batch.rows.len(),
            skipped = skipped_rows,
            documents = documents.len(),
            index = %config.index_name,
            "source indexed"
        );
        Ok(SourceOutcome::Indexed {
            rows: batch.rows.len(),
            skipped_rows,
            documents: documents.len(),
            checkpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_are_single_flight_per_source() {
        let locks = SourceLocks::default();
        let a = locks.try_acquire("idx_acme", "a");
        assert!(a.is_some());
        assert!(locks.try_acquire("idx_acme", "a").is_none());
        assert!(locks.try_acquire("idx_acme", "b").is_some());
        assert!(locks.is_running("idx_acme", "a"));

        drop(a);
        assert!(!locks.is_running("idx_acme", "a"));
        assert!(locks.try_acquire("idx_acme", "a").is_some());
    }

    #[test]
    fn same_id_in_another_index_is_a_different_source() {
        let locks = SourceLocks::default();
        let acme = locks.try_acquire("idx_acme", "1");
        assert!(acme.is_some());
        assert!(locks.try_acquire("idx_beta", "1").is_some());
        assert!(!locks.is_running("idx_beta", "1"));
        assert!(locks.is_running("idx_acme", "1"));
    }

    fn source_report(
        config_index: &str,
        config_id: &str,
        outcome: SourceOutcome,
    ) -> SourceReport {
        SourceReport {
            config_index: config_index.into(),
            config_id: config_id.into(),
            source: format!("t/{}.f", config_id),
            outcome,
        }
    }

    #[test]
    fn report_counts() {
        let report = RunReport {
            sources: vec![
                source_report(
                    "idx_acme",
                    "1",
                    SourceOutcome::Indexed {
                        rows: 2,
                        skipped_rows: 0,
                        documents: 3,
                        checkpoint: None,
                    },
                ),
                source_report(
                    "idx_acme",
                    "2",
                    SourceOutcome::Failed {
                        stage: Stage::Poll,
                        kind: ErrorKind::Transient,
                        message: "refused".into(),
                    },
                ),
                source_report("idx_beta", "2", SourceOutcome::NoChanges),
            ],
            discovery_error: None,
        };
        assert_eq!(report.failed(), 1);
        assert_eq!(report.indexed_documents(), 3);
        assert!(matches!(
            report.outcome("idx_acme", "2"),
            Some(SourceOutcome::Failed { .. })
        ));
        assert_eq!(
            report.outcome("idx_beta", "2"),
            Some(&SourceOutcome::NoChanges)
        );
        assert!(report.outcome("idx_acme", "3").is_none());
    }
}
