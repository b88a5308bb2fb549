//! CLI `reset` command: delete all facts and cache entries after confirmation.

use anyhow::{bail, Result};
use std::io::Write;

use crate::config::StrataConfig;

/// Delete every fact, cache entry, audit entry and counter after user confirmation.
pub fn reset(config: &StrataConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    println!("WARNING: This will permanently delete ALL facts, cache entries, and audit logs.");
    println!("Database: {}", db_path.display());
    print!("\nType YES to confirm: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;

    if input.trim() != "YES" {
        bail!("reset cancelled");
    }

    let conn = crate::db::open_database(&db_path)?;
    clear_all(&conn)?;

    println!("All facts deleted. Database reset complete.");
    Ok(())
}

pub(crate) fn clear_all(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "BEGIN;
         INSERT INTO facts_fts (facts_fts) VALUES ('delete-all');
         DELETE FROM facts;
         DELETE FROM memory_log;
         DELETE FROM cache_entries;
         UPDATE engine_counters SET value = 0;
         COMMIT;",
    )
}
