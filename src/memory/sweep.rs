//! TTL sweep over cache entries and eligible facts.
//!
//! The sweep scans under one short lock hold, then evicts each expired entry
//! in its own transaction, re-taking the connection lock per entry so
//! foreground reads and writes interleave with a long sweep. A failure on one
//! entry is logged and counted; the sweep moves on.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::forget::mark_deleted;
use super::ttl::TtlPolicy;
use super::types::Category;
use crate::db::migrations::bump_counter;
use crate::error::{MemoryError, Result};

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Report what would be evicted without touching anything.
    pub dry_run: bool,
    /// Also expire non-manual facts past their category TTL.
    pub include_facts: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub dry_run: bool,
    /// Entries examined: all cache entries plus eligible live facts.
    pub scanned: usize,
    /// Entries found past their deadline.
    pub expired: usize,
    /// Entries actually removed (always 0 on a dry run).
    pub evicted: usize,
    /// Entries whose eviction failed.
    pub errors: usize,
    /// `true` when the cancel flag stopped the sweep early.
    pub cancelled: bool,
    pub expired_cache_keys: Vec<String>,
    pub expired_fact_ids: Vec<String>,
    /// Short-term turns aged out alongside the sweep. Filled in by the engine.
    pub stm_turns_pruned: usize,
}

enum Target {
    Cache(String),
    Fact(String),
}

// ── Sweep ────────────────────────────────────────────────────────────────────

/// One sweep pass at time `now`. Re-entrant; `cancel` is checked between
/// entries.
pub fn sweep(
    db: &Mutex<Connection>,
    policy: &TtlPolicy,
    now: i64,
    options: SweepOptions,
    cancel: &AtomicBool,
) -> Result<SweepReport> {
    let mut report = SweepReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    let targets = {
        let conn = db.lock()?;
        scan(&conn, policy, now, options.include_facts, &mut report)?
    };
    report.expired = targets.len();

    for target in &targets {
        match target {
            Target::Cache(key) => report.expired_cache_keys.push(key.clone()),
            Target::Fact(id) => report.expired_fact_ids.push(id.clone()),
        }
    }

    if !options.dry_run {
        for target in &targets {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                tracing::info!(evicted = report.evicted, "sweep cancelled");
                break;
            }
            match evict(db, target, now) {
                Ok(true) => report.evicted += 1,
                Ok(false) => {}
                Err(e) => {
                    report.errors += 1;
                    let (kind, id) = match target {
                        Target::Cache(k) => ("cache", k),
                        Target::Fact(i) => ("fact", i),
                    };
                    tracing::warn!(kind, id = %id, error = %e, "eviction failed, continuing");
                }
            }
        }

        if let Ok(conn) = db.lock() {
            if let Err(e) = bump_counter(&conn, "sweeps_run", 1) {
                tracing::warn!(error = %e, "failed to record sweep counter");
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        expired = report.expired,
        evicted = report.evicted,
        errors = report.errors,
        dry_run = report.dry_run,
        "sweep finished"
    );
    Ok(report)
}

fn scan(
    conn: &Connection,
    policy: &TtlPolicy,
    now: i64,
    include_facts: bool,
    report: &mut SweepReport,
) -> Result<Vec<Target>> {
    let mut targets = Vec::new();

    let mut stmt = conn.prepare("SELECT key, expires_at FROM cache_entries ORDER BY expires_at")?;
    let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
    for row in rows {
        let (key, expires_at) = row?;
        report.scanned += 1;
        if now > expires_at {
            targets.push(Target::Cache(key));
        }
    }

    if include_facts {
        let mut stmt = conn.prepare(
            "SELECT id, category, created_at FROM facts
             WHERE deleted = 0 AND source != 'manual'
             ORDER BY created_at",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, i64>(2)?))
        })?;
        for row in rows {
            let (id, category, created_at) = row?;
            report.scanned += 1;
            let category = category.parse().unwrap_or(Category::Default);
            if fact_expired(policy, category, created_at, now) {
                targets.push(Target::Fact(id));
            }
        }
    }

    Ok(targets)
}

/// A fact expires once `now > created_at + ttl(category)`.
pub fn fact_expired(policy: &TtlPolicy, category: Category, created_at: i64, now: i64) -> bool {
    let ttl = i64::try_from(policy.ttl_for(category)).unwrap_or(i64::MAX);
    now > created_at.saturating_add(ttl)
}

/// Evict one entry in its own transaction. `Ok(false)` means it was no
/// longer eligible (refreshed, already deleted, or gone).
fn evict(db: &Mutex<Connection>, target: &Target, now: i64) -> Result<bool> {
    let mut conn = db.lock()?;
    let tx = conn.transaction()?;
    let evicted = match target {
        Target::Cache(key) => {
            // A concurrent put may have refreshed the entry since the scan.
            tx.execute(
                "DELETE FROM cache_entries WHERE key = ?1 AND expires_at < ?2",
                params![key, now],
            )? > 0
        }
        Target::Fact(id) => match mark_deleted(&tx, id, "expire", Some("ttl"), now) {
            Ok(already_deleted) => !already_deleted,
            Err(MemoryError::NotFound(_)) => false,
            Err(e) => return Err(e),
        },
    };
    tx.commit()?;
    Ok(evicted)
}
