//! Write path: validation, deduplication, storage, and audit logging.
//!
//! [`insert_fact`] is the only way a new fact reaches the `facts` table. It runs
//! inside one `BEGIN IMMEDIATE` transaction: dedup check against live facts of
//! the same category, then either a merge into the match or an insert with FTS5
//! sync, then an audit log entry. Holding the write lock across the check and
//! the insert keeps two near-duplicates from both landing.

use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::dedup::{dedup_check, normalize_text};
use super::now_ts;
use super::ttl::classify;
use super::types::{Category, Fact, FactSource};
use crate::config::DedupConfig;
use crate::db::migrations::bump_counter;
use crate::error::{MemoryError, Result};

/// Column list matching [`row_to_fact`].
pub(crate) const FACT_COLUMNS: &str = "id, text, normalized, category, tags, confidence, source, \
     access_count, created_at, updated_at, last_accessed_at, deleted, deleted_at, metadata";

/// Caller input for a fact write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFact {
    pub text: String,
    /// `None` lets the classifier pick.
    pub category: Option<Category>,
    pub confidence: f64,
    pub source: FactSource,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl NewFact {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: None,
            confidence: 1.0,
            source: FactSource::Manual,
            tags: Vec::new(),
            metadata: None,
        }
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn source(mut self, source: FactSource) -> Self {
        self.source = source;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Result returned from a fact write.
#[derive(Debug, Clone, Serialize)]
pub struct StoreFactResult {
    /// Id of the new fact, or of the existing fact it was merged into.
    pub id: String,
    /// `true` when an existing near-duplicate absorbed the write.
    pub deduped: bool,
    /// Confidence of the stored fact after the write.
    pub confidence: f64,
    pub category: Category,
    /// Similarity of the matched fact, when deduped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// One row of the `memory_log` audit table.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub operation: String,
    pub fact_id: String,
    pub details: Option<serde_json::Value>,
    pub created_at: i64,
}

/// Full write path at the current time.
pub fn insert_fact(conn: &mut Connection, fact: &NewFact, config: &DedupConfig) -> Result<StoreFactResult> {
    insert_fact_at(conn, fact, config, now_ts())
}

/// Full write path: validate → dedup → merge or insert → FTS sync → audit log.
pub fn insert_fact_at(
    conn: &mut Connection,
    fact: &NewFact,
    config: &DedupConfig,
    now: i64,
) -> Result<StoreFactResult> {
    let text = fact.text.trim();
    validate_new_fact(text, fact.confidence)?;
    let category = fact.category.unwrap_or_else(|| classify(text));

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let outcome = dedup_check(&tx, text, category, config)?;
    if let Some(existing) = outcome.matched {
        let merged = apply_merge(&tx, &existing, config.confidence_boost, now)?;
        write_audit_log(
            &tx,
            "merge",
            &existing.id,
            Some(&serde_json::json!({
                "reason": "deduplication",
                "similarity": outcome.similarity,
                "incoming": text,
            })),
            now,
        )?;
        bump_counter(&tx, "dedup_hits", 1)?;
        bump_counter(&tx, "dedup_bytes_saved", text.len() as i64)?;
        tx.commit()?;

        tracing::debug!(id = %existing.id, similarity = outcome.similarity, "merged duplicate fact");
        return Ok(StoreFactResult {
            id: existing.id,
            deduped: true,
            confidence: merged,
            category,
            similarity: Some(outcome.similarity),
        });
    }

    let id = uuid::Uuid::now_v7().to_string();
    let normalized = normalize_text(text);
    let rowid = insert_row(
        &tx,
        &InsertRow {
            id: &id,
            text,
            normalized: &normalized,
            category,
            tags: &fact.tags,
            confidence: fact.confidence,
            source: fact.source,
            metadata: fact.metadata.as_ref(),
            created_at: now,
            deleted_at: None,
        },
    )?;
    insert_fts(&tx, rowid, &normalized, &id, category)?;
    write_audit_log(
        &tx,
        "create",
        &id,
        Some(&serde_json::json!({"source": fact.source.as_str()})),
        now,
    )?;
    tx.commit()?;

    tracing::debug!(id = %id, category = %category, "stored new fact");
    Ok(StoreFactResult {
        id,
        deduped: false,
        confidence: fact.confidence,
        category,
        similarity: None,
    })
}

/// [`insert_fact_at`], retried once when a concurrent writer wins the race on
/// the live uniqueness index. The retry sees the winner and merges into it.
pub fn insert_fact_retrying(
    conn: &mut Connection,
    fact: &NewFact,
    config: &DedupConfig,
    now: i64,
) -> Result<StoreFactResult> {
    retry_on_conflict(|| insert_fact_at(conn, fact, config, now))
}

/// Run `op`, and run it once more if the first attempt lost a uniqueness race.
fn retry_on_conflict<T>(mut op: impl FnMut() -> Result<T>) -> Result<T> {
    match op() {
        Err(e) if e.is_conflict() => {
            tracing::debug!(error = %e, "write conflict, retrying dedup");
            op()
        }
        other => other,
    }
}

fn validate_new_fact(text: &str, confidence: f64) -> Result<()> {
    if text.is_empty() {
        return Err(MemoryError::Validation("fact text must not be empty".into()));
    }
    if normalize_text(text).is_empty() {
        return Err(MemoryError::Validation(
            "fact text must contain at least one letter or digit".into(),
        ));
    }
    if !(0.0..=1.0).contains(&confidence) {
        return Err(MemoryError::Validation(format!(
            "confidence must be within [0, 1], got {confidence}"
        )));
    }
    Ok(())
}

/// Boost a live fact's confidence (capped at 1.0) and record the hit.
pub fn merge_fact(conn: &Connection, id: &str, boost: f64) -> Result<Fact> {
    let existing = get_fact(conn, id)?;
    if existing.deleted {
        return Err(MemoryError::NotFound(format!("fact {id} is deleted")));
    }
    let now = now_ts();
    apply_merge(conn, &existing, boost, now)?;
    get_fact(conn, id)
}

fn apply_merge(conn: &Connection, existing: &Fact, boost: f64, now: i64) -> Result<f64> {
    let confidence = (existing.confidence + boost).clamp(0.0, 1.0);
    conn.execute(
        "UPDATE facts SET confidence = ?1, access_count = access_count + 1,
             last_accessed_at = ?2, updated_at = ?2
         WHERE id = ?3",
        params![confidence, now, existing.id],
    )?;
    Ok(confidence)
}

/// Fetch a fact by id, including soft-deleted facts.
pub fn get_fact(conn: &Connection, id: &str) -> Result<Fact> {
    let sql = format!("SELECT {FACT_COLUMNS} FROM facts WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_fact)
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(format!("fact {id}")))
}

/// All facts ordered by creation time.
pub fn list_facts(conn: &Connection, include_deleted: bool) -> Result<Vec<Fact>> {
    let sql = format!(
        "SELECT {FACT_COLUMNS} FROM facts {} ORDER BY created_at ASC, id ASC",
        if include_deleted { "" } else { "WHERE deleted = 0" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let facts = stmt
        .query_map([], row_to_fact)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Restore an exported fact, keeping its id and timestamps.
///
/// Still dedup-gated: a live near-duplicate absorbs it as a merge. Returns
/// `false` when the fact was merged or its id already exists.
pub fn restore_fact(conn: &mut Connection, fact: &Fact, config: &DedupConfig) -> Result<bool> {
    validate_new_fact(fact.text.trim(), fact.confidence)?;
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let exists: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM facts WHERE id = ?1)",
        params![fact.id],
        |r| r.get(0),
    )?;
    if exists {
        return Ok(false);
    }

    if !fact.deleted {
        let outcome = dedup_check(&tx, &fact.text, fact.category, config)?;
        if let Some(existing) = outcome.matched {
            apply_merge(&tx, &existing, config.confidence_boost, now_ts())?;
            bump_counter(&tx, "dedup_hits", 1)?;
            tx.commit()?;
            return Ok(false);
        }
    }

    let normalized = normalize_text(&fact.text);
    let rowid = insert_row(
        &tx,
        &InsertRow {
            id: &fact.id,
            text: fact.text.trim(),
            normalized: &normalized,
            category: fact.category,
            tags: &fact.tags,
            confidence: fact.confidence,
            source: fact.source,
            metadata: fact.metadata.as_ref(),
            created_at: fact.created_at,
            deleted_at: if fact.deleted { Some(fact.deleted_at.unwrap_or(fact.updated_at)) } else { None },
        },
    )?;
    tx.execute(
        "UPDATE facts SET updated_at = ?1, access_count = ?2, last_accessed_at = ?3 WHERE rowid = ?4",
        params![fact.updated_at, fact.access_count, fact.last_accessed_at, rowid],
    )?;
    if !fact.deleted {
        insert_fts(&tx, rowid, &normalized, &fact.id, fact.category)?;
    }
    write_audit_log(&tx, "create", &fact.id, Some(&serde_json::json!({"source": "import"})), now_ts())?;
    tx.commit()?;
    Ok(true)
}

/// Audit trail for one fact, oldest first.
pub fn fact_history(conn: &Connection, id: &str) -> Result<Vec<LogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT operation, fact_id, details, created_at FROM memory_log
         WHERE fact_id = ?1 ORDER BY id ASC",
    )?;
    let entries = stmt
        .query_map(params![id], |row| {
            let details: Option<String> = row.get(2)?;
            Ok(LogEntry {
                operation: row.get(0)?,
                fact_id: row.get(1)?,
                details: details.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}

struct InsertRow<'a> {
    id: &'a str,
    text: &'a str,
    normalized: &'a str,
    category: Category,
    tags: &'a [String],
    confidence: f64,
    source: FactSource,
    metadata: Option<&'a serde_json::Value>,
    created_at: i64,
    /// `Some` inserts the row already soft-deleted.
    deleted_at: Option<i64>,
}

/// Insert a fact row. Returns the SQLite rowid for FTS5 sync.
fn insert_row(conn: &Connection, row: &InsertRow<'_>) -> Result<i64> {
    let tags_json = serde_json::to_string(row.tags)?;
    let metadata_json = row.metadata.map(serde_json::to_string).transpose()?;

    conn.execute(
        "INSERT INTO facts (id, text, normalized, category, tags, confidence, source,
             access_count, created_at, updated_at, metadata, deleted, deleted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?8, ?9, ?10, ?11)",
        params![
            row.id,
            row.text,
            row.normalized,
            row.category.as_str(),
            tags_json,
            row.confidence,
            row.source.as_str(),
            row.created_at,
            metadata_json,
            row.deleted_at.is_some(),
            row.deleted_at,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Sync the FTS5 index after inserting into `facts`. Must reuse the row's
/// rowid. The index holds normalized text so it tokenizes like search queries.
fn insert_fts(conn: &Connection, rowid: i64, normalized: &str, id: &str, category: Category) -> Result<()> {
    conn.execute(
        "INSERT INTO facts_fts (rowid, normalized, id, category) VALUES (?1, ?2, ?3, ?4)",
        params![rowid, normalized, id, category.as_str()],
    )?;
    Ok(())
}

/// Remove a fact's FTS5 entry. External-content tables need the original values.
pub(crate) fn remove_fts(conn: &Connection, id: &str) -> Result<()> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT rowid, normalized, category FROM facts WHERE id = ?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    if let Some((rowid, normalized, category)) = row {
        conn.execute(
            "INSERT INTO facts_fts (facts_fts, rowid, normalized, id, category) VALUES ('delete', ?1, ?2, ?3, ?4)",
            params![rowid, normalized, id, category],
        )?;
    }
    Ok(())
}

/// Write an entry to the memory_log audit table.
pub(crate) fn write_audit_log(
    conn: &Connection,
    operation: &str,
    fact_id: &str,
    details: Option<&serde_json::Value>,
    now: i64,
) -> Result<()> {
    let details_json = details.map(|d| d.to_string());
    conn.execute(
        "INSERT INTO memory_log (operation, fact_id, details, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![operation, fact_id, details_json, now],
    )?;
    Ok(())
}

fn conversion_err(idx: usize, err: MemoryError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
}

/// Map a row selected with [`FACT_COLUMNS`] to a [`Fact`].
pub(crate) fn row_to_fact(row: &Row<'_>) -> rusqlite::Result<Fact> {
    let category: String = row.get(3)?;
    let tags: String = row.get(4)?;
    let source: String = row.get(6)?;
    let metadata: Option<String> = row.get(13)?;
    Ok(Fact {
        id: row.get(0)?,
        text: row.get(1)?,
        normalized: row.get(2)?,
        category: category.parse().map_err(|e| conversion_err(3, e))?,
        tags: serde_json::from_str(&tags).unwrap_or_default(),
        confidence: row.get(5)?,
        source: source.parse().map_err(|e| conversion_err(6, e))?,
        access_count: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        last_accessed_at: row.get(10)?,
        deleted: row.get(11)?,
        deleted_at: row.get(12)?,
        metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
    })
}
