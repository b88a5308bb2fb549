//! SQL DDL for all strata tables.
//!
//! Defines `facts`, `facts_fts` (FTS5, external content), `cache_entries`,
//! `memory_log`, and `schema_meta`. All DDL uses `IF NOT EXISTS` for
//! idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Long-term fact storage
CREATE TABLE IF NOT EXISTS facts (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    normalized TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT 'default',
    tags TEXT NOT NULL DEFAULT '[]',
    confidence REAL NOT NULL DEFAULT 1.0 CHECK(confidence >= 0.0 AND confidence <= 1.0),
    source TEXT NOT NULL DEFAULT 'manual' CHECK(source IN ('manual','auto','consolidated')),
    access_count INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    last_accessed_at INTEGER,
    deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at INTEGER,
    metadata TEXT
);

CREATE INDEX IF NOT EXISTS idx_facts_category ON facts(category, deleted);
CREATE INDEX IF NOT EXISTS idx_facts_created ON facts(created_at);
CREATE INDEX IF NOT EXISTS idx_facts_confidence ON facts(confidence);
CREATE UNIQUE INDEX IF NOT EXISTS idx_facts_live_normalized
    ON facts(category, normalized) WHERE deleted = 0;

-- Full-text search (BM25) over normalized text
CREATE VIRTUAL TABLE IF NOT EXISTS facts_fts USING fts5(
    normalized,
    id UNINDEXED,
    category UNINDEXED,
    content='facts',
    content_rowid='rowid'
);

-- Key/value cache with category-derived expiry
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    category TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);

-- Audit log
CREATE TABLE IF NOT EXISTS memory_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL CHECK(operation IN ('create','merge','delete','expire','purge','validate','consolidate')),
    fact_id TEXT NOT NULL,
    details TEXT,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_log_fact ON memory_log(fact_id);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
