//! Forward-only schema migrations.
//!
//! `schema_meta.schema_version` records the last applied step. Each entry of
//! [`MIGRATIONS`] upgrades from the version before it and runs in its own
//! transaction together with the version bump.

use rusqlite::{Connection, OptionalExtension};

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// `(target version, description, step)`, in ascending order.
const MIGRATIONS: &[(u32, &str, Step)] = &[
    (2, "engine counters", add_engine_counters),
    (3, "index normalized text", reindex_normalized),
];

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// Counters seeded by the v2 step. Insights and the conversion rate read them.
pub const ENGINE_COUNTERS: &[&str] = &[
    "dedup_hits",
    "dedup_bytes_saved",
    "turns_considered",
    "facts_consolidated",
    "sweeps_run",
];

/// Stored schema version; an unparsable value reads as 0.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let raw: String = conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| row.get(0),
    )?;
    Ok(raw.parse().unwrap_or(0))
}

pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current = get_schema_version(conn)?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|(to, _, _)| *to > current).collect();
    if pending.is_empty() {
        tracing::debug!(schema_version = current, "schema up to date");
        return Ok(());
    }

    for (to, description, step) in pending {
        tracing::info!(to = *to, description = *description, "applying migration");
        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        tx.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [to.to_string()],
        )?;
        tx.commit()?;
    }
    Ok(())
}

fn add_engine_counters(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS engine_counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL DEFAULT 0
        );",
    )?;
    let mut seed = conn.prepare("INSERT OR IGNORE INTO engine_counters (name, value) VALUES (?1, 0)")?;
    for name in ENGINE_COUNTERS {
        seed.execute([name])?;
    }
    Ok(())
}

/// Rebuild `facts_fts` over `normalized` instead of the raw text, so indexed
/// terms match query terms ("don't" is one term, "dont").
fn reindex_normalized(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "DROP TABLE IF EXISTS facts_fts;
         CREATE VIRTUAL TABLE facts_fts USING fts5(
             normalized,
             id UNINDEXED,
             category UNINDEXED,
             content='facts',
             content_rowid='rowid'
         );
         INSERT INTO facts_fts (rowid, normalized, id, category)
             SELECT rowid, normalized, id, category FROM facts WHERE deleted = 0;",
    )
}

/// Add `delta` to a named counter, creating it if absent.
pub fn bump_counter(conn: &Connection, name: &str, delta: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO engine_counters (name, value) VALUES (?1, ?2)
         ON CONFLICT(name) DO UPDATE SET value = value + excluded.value",
        rusqlite::params![name, delta],
    )?;
    Ok(())
}

/// Read a named counter; absent counters read as zero.
pub fn read_counter(conn: &Connection, name: &str) -> rusqlite::Result<i64> {
    let value = conn
        .query_row(
            "SELECT value FROM engine_counters WHERE name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn migrated() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::schema::init_schema(&conn).unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn registry_ends_at_current_version() {
        let versions: Vec<u32> = MIGRATIONS.iter().map(|(v, _, _)| *v).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.last().copied(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn all_counters_are_seeded() {
        let conn = migrated();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM engine_counters", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, ENGINE_COUNTERS.len());
    }

    #[test]
    fn bump_creates_unknown_counters() {
        let conn = migrated();
        bump_counter(&conn, "custom", 2).unwrap();
        bump_counter(&conn, "custom", 5).unwrap();
        assert_eq!(read_counter(&conn, "custom").unwrap(), 7);
        assert_eq!(read_counter(&conn, "never_set").unwrap(), 0);
    }
}
