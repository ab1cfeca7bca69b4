//! # Changelog Indexer CLI (`clidx`)
//!
//! ## Usage
//!
//! ```bash
//! clidx --config ./config/clidx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `clidx run` | Index every source once |
//! | `clidx watch` | Index every source on a fixed interval |
//! | `clidx sources` | List registered sources and their checkpoints |
//! | `clidx classify <file>` | Print the sniffed content type of a file |
//! | `clidx extract <file>` | Print the text a file would be indexed as |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use changelog_indexer::config::{self, Config};
use changelog_indexer::db::PoolCache;
use changelog_indexer::pipeline::Pipeline;
use changelog_indexer::{ingest, inspect, sources};

/// Changelog Indexer CLI.
///
/// Mirrors PostgreSQL changelog tables into a full-text search index.
#[derive(Parser)]
#[command(
    name = "clidx",
    about = "Incrementally index PostgreSQL changelog rows into a search index",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/clidx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once over every registered source.
    Run,

    /// Run the pipeline on a fixed interval until interrupted.
    Watch {
        /// Override `schedule.interval_secs`.
        #[arg(long)]
        interval_secs: Option<u64>,
    },

    /// List registered sources.
    Sources,

    /// Print the content type the classifier assigns to a file.
    Classify {
        file: PathBuf,
    },

    /// Print the text a file would be indexed as.
    ///
    /// Without `--type` the file is treated as a BLOB and sniffed.
    Extract {
        file: PathBuf,

        /// Declared field type (txt, json, xml, html, csv, pdf, doc, docx, xlsx, blob).
        #[arg(long = "type")]
        field_type: Option<String>,

        /// Dotted path to project from JSON/XML content. Repeatable.
        #[arg(long = "path")]
        paths: Vec<String>,
    },
}

fn init_tracing(level: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn build_pipeline(cfg: &Config) -> Result<(Pipeline, Arc<PoolCache>)> {
    let pools = Arc::new(PoolCache::new(&cfg.database));
    let pipeline = Pipeline::from_config(cfg, Arc::clone(&pools))?;
    Ok((pipeline, pools))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Classify { file } => {
            init_tracing("warn")?;
            return inspect::run_classify(file);
        }
        Commands::Extract {
            file,
            field_type,
            paths,
        } => {
            init_tracing("warn")?;
            let chunk_max_chars = config::load_config(&cli.config)
                .map(|c| c.pipeline.chunk_max_chars)
                .unwrap_or(changelog_indexer::chunk::DEFAULT_MAX_CHARS);
            return inspect::run_extract(
                file,
                field_type.as_deref(),
                paths.clone(),
                chunk_max_chars,
            );
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level)?;

    let (pipeline, pools) = build_pipeline(&cfg)?;
    match cli.command {
        Commands::Run => {
            ingest::run_sync(&pipeline).await?;
        }
        Commands::Watch { interval_secs } => {
            let secs = interval_secs.unwrap_or(cfg.schedule.interval_secs).max(1);
            ingest::run_watch(&pipeline, Duration::from_secs(secs)).await?;
        }
        Commands::Sources => {
            sources::list_sources(&pipeline).await?;
        }
        Commands::Classify { .. } | Commands::Extract { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }
    pools.close_all().await;

    Ok(())
}
