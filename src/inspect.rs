//! Local inspection commands for checking how a file would be indexed,
//! without touching any database or index.

use anyhow::{Context, Result};
use std::path::Path;

use crate::chunk::chunk_text;
use crate::extract::{ExtractOptions, ExtractorRegistry};
use crate::models::FieldType;

pub fn run_classify(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let content_type = crate::classify::classify(&bytes);
    println!("{}\t{}", path.display(), content_type);
    Ok(())
}

/// Extract `path` as a declared field type, or sniff it as a BLOB when
/// `field_type` is absent.
pub fn run_extract(
    path: &Path,
    field_type: Option<&str>,
    paths: Vec<String>,
    chunk_max_chars: usize,
) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let registry = ExtractorRegistry::default();
    let options = ExtractOptions { paths };

    let field_type = field_type.map(FieldType::parse).unwrap_or(FieldType::Blob);
    let extraction = if field_type == FieldType::Blob {
        let content = registry.classify(bytes);
        println!("content type: {}", content.content_type);
        registry.extract_sniffed(&content, &options)?
    } else {
        registry.extract_declared(&field_type, &bytes, &options)?
    };

    let Some(extraction) = extraction else {
        println!("no extractor for {}", field_type.as_str());
        return Ok(());
    };

    let chunks = chunk_text(&extraction.text, chunk_max_chars);
    println!("characters: {}", extraction.text.chars().count());
    println!("chunks: {}", chunks.len());
    println!();
    println!("{}", extraction.text);
    Ok(())
}
