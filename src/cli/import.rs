use anyhow::{Context, Result};
use std::path::Path;

use super::export::{ExportData, EXPORT_VERSION};
use crate::config::StrataConfig;
use crate::engine::MemoryEngine;

/// Import facts from a file written by `export`.
///
/// Ids and timestamps are kept. Facts whose id already exists are skipped,
/// and a live fact that duplicates an existing one is merged into it.
pub async fn import(config: &StrataConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;

    let data: ExportData =
        serde_json::from_str(&json).context("failed to parse import JSON")?;
    anyhow::ensure!(
        data.version <= EXPORT_VERSION,
        "export version {} is newer than this build supports ({EXPORT_VERSION})",
        data.version
    );

    println!("Importing {} facts...", data.facts.len());

    let engine = MemoryEngine::open(config.clone())?;
    let summary = engine
        .import_facts(data.facts)
        .await
        .context("import failed")?;

    println!("Import complete:");
    println!("  Facts imported: {}", summary.imported);
    println!("  Facts skipped:  {} (existing id or duplicate)", summary.skipped);

    Ok(())
}
