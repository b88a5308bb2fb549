use anyhow::Result;

use super::{format_ts, preview};
use crate::config::StrataConfig;
use crate::engine::MemoryEngine;

/// Display the insights report in the terminal.
pub async fn insights(config: &StrataConfig, json: bool) -> Result<()> {
    let engine = MemoryEngine::open(config.clone())?;
    let report = engine.insights().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Memory Insights");
    println!("{}", "=".repeat(40));

    if let Some(ref ltm) = report.layers.ltm {
        println!("  Total facts:         {}", ltm.total);
        println!("  Active:              {}", ltm.active);
        println!("  Deleted:             {}", ltm.deleted);
        println!("  Avg confidence:      {:.3}", ltm.avg_confidence);
        println!();
        println!("By Category:");
        for (category, share) in &ltm.by_category {
            if share.count > 0 {
                println!("  {:<12} {:>6} ({:.1}%)", category, share.count, share.pct);
            }
        }
        println!();
    }

    if let Some(ref cache) = report.layers.cache {
        println!("Cache entries:         {}", cache.entries);
        println!("  Awaiting sweep:      {}", cache.expired_pending);
    }
    if let Some(ref c) = report.consolidation {
        println!(
            "Consolidation:         {} facts from {} turns ({:.1}%)",
            c.facts_created,
            c.turns_considered,
            c.conversion_rate * 100.0
        );
    }
    if let Some(ref d) = report.dedup_savings {
        println!(
            "Dedup savings:         {} duplicates, {} bytes",
            d.duplicates_avoided, d.bytes_saved
        );
        println!("Sweeps run:            {}", d.sweeps_run);
    }
    println!("Database size:         {} bytes", report.db_size_bytes);

    if !report.top_facts.is_empty() {
        println!();
        println!("Top facts:");
        for f in &report.top_facts {
            println!("  {:.2}  {}", f.confidence, preview(&f.text, 70));
        }
    }
    if let Some(newest) = report.recent_facts.first() {
        println!();
        println!("Newest fact:           {}", format_ts(newest.created_at));
    }

    if !report.errors.is_empty() {
        println!();
        println!("Sections unavailable:");
        for e in &report.errors {
            println!("  {e}");
        }
    }

    Ok(())
}
