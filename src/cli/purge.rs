use anyhow::Result;

use super::format_ts;
use crate::config::StrataConfig;
use crate::engine::MemoryEngine;
use crate::memory::now_ts;

const SECS_PER_DAY: i64 = 86_400;

/// Physically remove facts soft-deleted more than `older_than_days` ago.
pub async fn purge(config: &StrataConfig, older_than_days: u32, dry_run: bool) -> Result<()> {
    let before = now_ts() - i64::from(older_than_days) * SECS_PER_DAY;
    let engine = MemoryEngine::open(config.clone())?;
    let result = engine.purge(before, dry_run).await?;

    if result.candidates == 0 {
        println!("No deleted facts older than {}.", format_ts(before));
        return Ok(());
    }

    if dry_run {
        println!(
            "{} deleted fact(s) would be purged (dry run, nothing removed):",
            result.candidates
        );
        for id in &result.ids {
            println!("  {id}");
        }
    } else {
        println!("Purged {} deleted fact(s).", result.purged);
    }
    Ok(())
}
