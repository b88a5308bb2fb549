//! Soft deletion and purging of facts.
//!
//! Soft delete sets `deleted = 1` and drops the fact from the FTS5 index, so the
//! index only ever holds live facts; the row stays for audit. Purge removes the
//! row itself.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::now_ts;
use super::store::{remove_fts, write_audit_log};
use crate::error::{MemoryError, Result};

/// Result returned from a forget operation.
#[derive(Debug, Serialize)]
pub struct ForgetResult {
    pub id: String,
    /// `true` if the row was physically removed.
    pub hard_deleted: bool,
    /// `true` if the fact was already soft-deleted before this call.
    pub already_deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct PurgeResult {
    pub dry_run: bool,
    pub candidates: usize,
    pub purged: usize,
    pub ids: Vec<String>,
}

/// Forget a fact by id: soft delete by default, purge when `hard_delete`.
pub fn forget_fact(
    conn: &mut Connection,
    fact_id: &str,
    reason: Option<&str>,
    hard_delete: bool,
) -> Result<ForgetResult> {
    let tx = conn.transaction()?;
    let result = if hard_delete {
        purge_in_tx(&tx, fact_id, reason)?
    } else {
        let already_deleted = mark_deleted(&tx, fact_id, "delete", reason, now_ts())?;
        ForgetResult {
            id: fact_id.to_string(),
            hard_deleted: false,
            already_deleted,
        }
    };
    tx.commit()?;
    Ok(result)
}

/// Soft-delete one fact inside the caller's transaction. Idempotent: an
/// already-deleted fact is left alone and `Ok(true)` is returned.
pub(crate) fn mark_deleted(
    conn: &Connection,
    fact_id: &str,
    operation: &str,
    reason: Option<&str>,
    now: i64,
) -> Result<bool> {
    let deleted: Option<bool> = conn
        .query_row(
            "SELECT deleted FROM facts WHERE id = ?1",
            params![fact_id],
            |row| row.get(0),
        )
        .optional()?;
    match deleted {
        None => return Err(MemoryError::NotFound(format!("fact {fact_id}"))),
        Some(true) => return Ok(true),
        Some(false) => {}
    }

    remove_fts(conn, fact_id)?;
    conn.execute(
        "UPDATE facts SET deleted = 1, deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![now, fact_id],
    )?;
    write_audit_log(
        conn,
        operation,
        fact_id,
        Some(&serde_json::json!({ "reason": reason })),
        now,
    )?;
    Ok(false)
}

fn purge_in_tx(conn: &Connection, fact_id: &str, reason: Option<&str>) -> Result<ForgetResult> {
    let deleted: bool = conn
        .query_row(
            "SELECT deleted FROM facts WHERE id = ?1",
            params![fact_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| MemoryError::NotFound(format!("fact {fact_id}")))?;

    // Soft-deleted rows are already out of the index.
    if !deleted {
        remove_fts(conn, fact_id)?;
    }
    write_audit_log(
        conn,
        "purge",
        fact_id,
        Some(&serde_json::json!({ "reason": reason })),
        now_ts(),
    )?;
    conn.execute("DELETE FROM facts WHERE id = ?1", params![fact_id])?;

    Ok(ForgetResult {
        id: fact_id.to_string(),
        hard_deleted: true,
        already_deleted: deleted,
    })
}

/// Physically remove soft-deleted facts whose `deleted_at` is before `before`.
pub fn purge_deleted(conn: &mut Connection, before: i64, dry_run: bool) -> Result<PurgeResult> {
    let tx = conn.transaction()?;
    let ids: Vec<String> = {
        let mut stmt = tx.prepare(
            "SELECT id FROM facts WHERE deleted = 1 AND COALESCE(deleted_at, updated_at) < ?1",
        )?;
        let rows = stmt.query_map(params![before], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()?
    };

    let mut purged = 0;
    if !dry_run {
        for id in &ids {
            purge_in_tx(&tx, id, Some("retention"))?;
            purged += 1;
        }
    }
    tx.commit()?;

    tracing::info!(candidates = ids.len(), purged, dry_run, "purge of deleted facts finished");
    Ok(PurgeResult {
        dry_run,
        candidates: ids.len(),
        purged,
        ids,
    })
}
