//! Run commands: a single pass (`clidx run`) and the scheduled loop
//! (`clidx watch`).

use anyhow::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::models::format_checkpoint;
use crate::pipeline::{Pipeline, RunReport, SourceOutcome};

pub async fn run_sync(pipeline: &Pipeline) -> Result<()> {
    let report = pipeline.run_once().await;
    print_report(&report);
    Ok(())
}

/// Run the pipeline every `interval` until interrupted.
///
/// A tick that arrives while a run is still in progress is dropped, so runs
/// never overlap.
pub async fn run_watch(pipeline: &Pipeline, interval: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = interval.as_secs(), "watching changelogs");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = pipeline.run_once().await;
                print_report(&report);
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested");
                break;
            }
        }
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    if let Some(ref err) = report.discovery_error {
        println!("discovery failed: {}", err);
        return;
    }
    if report.sources.is_empty() {
        println!("no sources");
        return;
    }

    for source in &report.sources {
        match &source.outcome {
            SourceOutcome::Indexed {
                rows,
                skipped_rows,
                documents,
                checkpoint,
            } => {
                println!("sync {}", source.source);
                println!("  rows: {} ({} skipped)", rows, skipped_rows);
                println!("  documents written: {}", documents);
                if let Some(cp) = checkpoint {
                    println!("  checkpoint: {}", format_checkpoint(cp));
                }
            }
            SourceOutcome::NoChanges => println!("sync {}: no changes", source.source),
            SourceOutcome::Busy => println!("sync {}: still running, skipped", source.source),
            SourceOutcome::Failed {
                stage,
                kind,
                message,
            } => {
                println!("sync {}: FAILED at {} ({:?})", source.source, stage, kind);
                println!("  {}", message);
            }
        }
    }
    println!(
        "{} sources, {} failed, {} documents",
        report.sources.len(),
        report.failed(),
        report.indexed_documents()
    );
}
