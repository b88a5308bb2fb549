//! CLI `sweep` command: run one TTL sweep in the foreground.

use anyhow::Result;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::config::StrataConfig;
use crate::engine::MemoryEngine;

/// Run a single sweep pass. With `dry_run`, list what would expire.
pub async fn sweep(config: &StrataConfig, dry_run: bool) -> Result<()> {
    let engine = MemoryEngine::open(config.clone())?;
    let report = engine
        .run_sweep(dry_run, Arc::new(AtomicBool::new(false)))
        .await?;

    if report.expired == 0 {
        println!("Nothing expired ({} entries scanned).", report.scanned);
        return Ok(());
    }

    if dry_run {
        println!(
            "Found {} expired entr{} out of {} scanned (dry run, nothing removed):\n",
            report.expired,
            if report.expired == 1 { "y" } else { "ies" },
            report.scanned
        );
        println!("{:<38} {:<12}", "Key / ID", "Kind");
        println!("{}", "-".repeat(52));
        for key in &report.expired_cache_keys {
            println!("{:<38} {:<12}", key, "cache");
        }
        for id in &report.expired_fact_ids {
            println!("{:<38} {:<12}", id, "fact");
        }
    } else {
        println!(
            "Evicted {} of {} expired entries ({} scanned, {} errors).",
            report.evicted, report.expired, report.scanned, report.errors
        );
    }

    Ok(())
}
