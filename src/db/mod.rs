pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

/// Open (or create) the strata database at the given path with schema and
/// migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub fact_count: i64,
    pub deleted_fact_count: i64,
    pub cache_count: i64,
    pub log_count: i64,
}

/// Run `PRAGMA integrity_check` and gather row counts.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn).context("failed to read schema version")?;

    let integrity_details: String = conn
        .query_row("PRAGMA integrity_check", [], |r| r.get(0))
        .context("integrity check failed to run")?;
    let integrity_ok = integrity_details == "ok";

    let count = |sql: &str| -> Result<i64> {
        conn.query_row(sql, [], |r| r.get(0))
            .with_context(|| format!("count query failed: {sql}"))
    };

    Ok(HealthReport {
        schema_version,
        integrity_ok,
        integrity_details,
        fact_count: count("SELECT COUNT(*) FROM facts WHERE deleted = 0")?,
        deleted_fact_count: count("SELECT COUNT(*) FROM facts WHERE deleted = 1")?,
        cache_count: count("SELECT COUNT(*) FROM cache_entries")?,
        log_count: count("SELECT COUNT(*) FROM memory_log")?,
    })
}
