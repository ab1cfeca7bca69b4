use anyhow::Result;

use crate::models::{format_checkpoint, SourceConfig};
use crate::pipeline::Pipeline;

/// Print every registered source with its destination and checkpoint.
pub async fn list_sources(pipeline: &Pipeline) -> Result<()> {
    let configs = pipeline.discover().await?;
    if configs.is_empty() {
        println!("No source configurations found.");
        return Ok(());
    }

    println!(
        "{:<32} {:<8} {:<24} {:<32}",
        "SOURCE", "TYPE", "INDEX", "CHECKPOINT"
    );
    for config in &configs {
        println!("{}", source_line(config));
    }
    Ok(())
}

fn source_line(config: &SourceConfig) -> String {
    let checkpoint = config
        .last_checkpoint
        .as_ref()
        .map(format_checkpoint)
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{:<32} {:<8} {:<24} {:<32}",
        config.label(),
        config.field_type.as_str(),
        config.index_name,
        checkpoint
    )
}
