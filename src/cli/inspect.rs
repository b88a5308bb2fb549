//! CLI `inspect` command: display full details for a single fact.

use anyhow::Result;

use super::format_ts;
use crate::config::StrataConfig;

/// Inspect a single fact by ID, including its audit history.
pub fn inspect(config: &StrataConfig, id: &str) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;

    let response = crate::memory::search::inspect_fact(&conn, id)?;

    let f = &response.fact;
    println!("Fact: {}", f.id);
    println!("{}", "=".repeat(50));
    println!("  Category:       {}", f.category);
    println!("  Source:         {}", f.source);
    println!("  Confidence:     {:.2}", f.confidence);
    println!("  Access count:   {}", f.access_count);
    if let Some(la) = f.last_accessed_at {
        println!("  Last accessed:  {}", format_ts(la));
    }
    println!("  Created:        {}", format_ts(f.created_at));
    println!("  Updated:        {}", format_ts(f.updated_at));
    if f.deleted {
        let when = f.deleted_at.map(format_ts).unwrap_or_else(|| "unknown".into());
        println!("  Deleted:        {when}");
    }
    if !f.tags.is_empty() {
        println!("  Tags:           {}", f.tags.join(", "));
    }
    if let Some(ref meta) = f.metadata {
        println!("  Metadata:       {}", serde_json::to_string_pretty(meta)?);
    }
    println!();
    println!("Text:");
    println!("  {}", f.text);

    if !response.history.is_empty() {
        println!();
        println!("Audit Log:");
        for entry in &response.history {
            let details = entry
                .details
                .as_ref()
                .map(|d| d.to_string())
                .unwrap_or_default();
            println!("  {} [{}] {}", format_ts(entry.created_at), entry.operation, details);
        }
    }

    Ok(())
}
