//! Read-only report over every memory layer.
//!
//! Sections are computed independently. A section that fails is left empty
//! and its error is listed in `errors`; the rest of the report still returns.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use super::consolidation::running_conversion_rate;
use super::stm::StmOccupancy;
use super::types::Category;
use crate::db::migrations::read_counter;
use crate::error::Result;

const TOP_FACTS: usize = 5;

#[derive(Debug, Serialize)]
pub struct InsightsReport {
    pub generated_at: i64,
    pub layers: Layers,
    pub top_facts: Vec<FactSummary>,
    pub recent_facts: Vec<FactSummary>,
    pub consolidation: Option<ConsolidationStats>,
    pub dedup_savings: Option<DedupSavings>,
    pub db_size_bytes: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Layers {
    pub stm: StmLayer,
    pub ltm: Option<LtmLayer>,
    pub cache: Option<CacheLayer>,
}

#[derive(Debug, Serialize)]
pub struct StmLayer {
    pub sessions: usize,
    pub turns: usize,
    pub capacity_per_session: usize,
    /// Turns held as a percentage of the capacity of all open sessions.
    pub usage_pct: f64,
}

#[derive(Debug, Serialize)]
pub struct LtmLayer {
    pub total: u64,
    pub active: u64,
    pub deleted: u64,
    pub avg_confidence: f64,
    pub by_category: BTreeMap<String, CategoryShare>,
}

#[derive(Debug, Serialize)]
pub struct CategoryShare {
    pub count: u64,
    pub pct: f64,
}

#[derive(Debug, Serialize)]
pub struct CacheLayer {
    pub entries: u64,
    /// Entries past their deadline that the sweep has not removed yet.
    pub expired_pending: u64,
}

#[derive(Debug, Serialize)]
pub struct FactSummary {
    pub id: String,
    pub text: String,
    pub category: String,
    pub confidence: f64,
    pub access_count: u32,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
pub struct ConsolidationStats {
    pub turns_considered: i64,
    pub facts_created: i64,
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct DedupSavings {
    pub duplicates_avoided: i64,
    pub bytes_saved: i64,
    pub sweeps_run: i64,
}

/// Build the report. Never fails as a whole.
pub fn insights(
    conn: &Connection,
    stm: StmOccupancy,
    db_path: Option<&Path>,
    now: i64,
) -> InsightsReport {
    let mut errors = Vec::new();

    let ltm = collect("ltm", &mut errors, || ltm_layer(conn));
    let cache = collect("cache", &mut errors, || cache_layer(conn, now));
    let top_facts = collect("top_facts", &mut errors, || {
        fact_summaries(conn, "confidence DESC, access_count DESC, created_at DESC")
    })
    .unwrap_or_default();
    let recent_facts = collect("recent_facts", &mut errors, || {
        fact_summaries(conn, "created_at DESC, id DESC")
    })
    .unwrap_or_default();
    let consolidation = collect("consolidation", &mut errors, || consolidation_stats(conn));
    let dedup_savings = collect("dedup_savings", &mut errors, || savings(conn));

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    InsightsReport {
        generated_at: now,
        layers: Layers {
            stm: stm_layer(stm),
            ltm,
            cache,
        },
        top_facts,
        recent_facts,
        consolidation,
        dedup_savings,
        db_size_bytes,
        errors,
    }
}

fn collect<T>(section: &str, errors: &mut Vec<String>, f: impl FnOnce() -> Result<T>) -> Option<T> {
    match f() {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(section, error = %e, "insights section failed");
            errors.push(format!("{section}: {e}"));
            None
        }
    }
}

fn stm_layer(stm: StmOccupancy) -> StmLayer {
    let capacity = stm.capacity_per_session * stm.sessions;
    StmLayer {
        sessions: stm.sessions,
        turns: stm.turns,
        capacity_per_session: stm.capacity_per_session,
        usage_pct: if capacity > 0 {
            stm.turns as f64 * 100.0 / capacity as f64
        } else {
            0.0
        },
    }
}

fn ltm_layer(conn: &Connection) -> Result<LtmLayer> {
    let (total, active, avg_confidence): (i64, i64, Option<f64>) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN deleted = 0 THEN 1 ELSE 0 END), 0),
                AVG(CASE WHEN deleted = 0 THEN confidence END)
         FROM facts",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let mut by_category: BTreeMap<String, CategoryShare> = Category::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), CategoryShare { count: 0, pct: 0.0 }))
        .collect();

    let mut stmt = conn.prepare(
        "SELECT category, COUNT(*) FROM facts WHERE deleted = 0 GROUP BY category",
    )?;
    let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
    for row in rows {
        let (category, count) = row?;
        let pct = if active > 0 {
            count as f64 * 100.0 / active as f64
        } else {
            0.0
        };
        by_category.insert(
            category,
            CategoryShare {
                count: count as u64,
                pct,
            },
        );
    }

    Ok(LtmLayer {
        total: total as u64,
        active: active as u64,
        deleted: (total - active) as u64,
        avg_confidence: avg_confidence.unwrap_or(0.0),
        by_category,
    })
}

fn cache_layer(conn: &Connection, now: i64) -> Result<CacheLayer> {
    let (entries, expired): (i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN expires_at < ?1 THEN 1 ELSE 0 END), 0)
         FROM cache_entries",
        params![now],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(CacheLayer {
        entries: entries as u64,
        expired_pending: expired as u64,
    })
}

fn fact_summaries(conn: &Connection, order_by: &str) -> Result<Vec<FactSummary>> {
    let sql = format!(
        "SELECT id, text, category, confidence, access_count, created_at
         FROM facts WHERE deleted = 0
         ORDER BY {order_by}
         LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![TOP_FACTS as i64], |row| {
            Ok(FactSummary {
                id: row.get(0)?,
                text: row.get(1)?,
                category: row.get(2)?,
                confidence: row.get(3)?,
                access_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn consolidation_stats(conn: &Connection) -> Result<ConsolidationStats> {
    Ok(ConsolidationStats {
        turns_considered: read_counter(conn, "turns_considered")?,
        facts_created: read_counter(conn, "facts_consolidated")?,
        conversion_rate: running_conversion_rate(conn)?,
    })
}

fn savings(conn: &Connection) -> Result<DedupSavings> {
    Ok(DedupSavings {
        duplicates_avoided: read_counter(conn, "dedup_hits")?,
        bytes_saved: read_counter(conn, "dedup_bytes_saved")?,
        sweeps_run: read_counter(conn, "sweeps_run")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DedupConfig;
    use crate::db;
    use crate::memory::cache::cache_put;
    use crate::memory::forget::forget_fact;
    use crate::memory::store::{insert_fact, NewFact};
    use crate::memory::ttl::TtlPolicy;

    fn occupancy() -> StmOccupancy {
        StmOccupancy {
            sessions: 2,
            turns: 50,
            capacity_per_session: 500,
        }
    }

    #[test]
    fn empty_store_reports_zeroes() {
        let conn = db::open_memory_database().unwrap();
        let report = insights(&conn, StmOccupancy::default(), None, 0);
        assert!(report.errors.is_empty());
        let ltm = report.layers.ltm.unwrap();
        assert_eq!(ltm.total, 0);
        assert_eq!(ltm.avg_confidence, 0.0);
        assert_eq!(ltm.by_category.len(), Category::ALL.len());
        assert_eq!(report.layers.stm.usage_pct, 0.0);
    }

    #[test]
    fn counts_layers_and_savings() {
        let mut conn = db::open_memory_database().unwrap();
        let dedup = DedupConfig::default();
        let a = insert_fact(&mut conn, &NewFact::new("Bitcoin halving happens every four years").confidence(0.6), &dedup).unwrap();
        insert_fact(&mut conn, &NewFact::new("bitcoin halving happens every four years!"), &dedup).unwrap();
        insert_fact(&mut conn, &NewFact::new("The Nile is the longest river").confidence(0.9), &dedup).unwrap();
        let gone = insert_fact(&mut conn, &NewFact::new("Ephemeral note"), &dedup).unwrap();
        forget_fact(&mut conn, &gone.id, None, false).unwrap();
        cache_put(&conn, "k", "v", Some(Category::Crypto), &TtlPolicy::default(), 0).unwrap();

        let report = insights(&conn, occupancy(), None, 1_000);
        assert!(report.errors.is_empty(), "{:?}", report.errors);

        let ltm = report.layers.ltm.unwrap();
        assert_eq!(ltm.total, 3);
        assert_eq!(ltm.active, 2);
        assert_eq!(ltm.deleted, 1);
        assert_eq!(ltm.by_category["crypto"].count, 1);
        assert!((ltm.by_category["geography"].pct - 50.0).abs() < 1e-9);

        let cache = report.layers.cache.unwrap();
        assert_eq!(cache.entries, 1);
        assert_eq!(cache.expired_pending, 1);

        assert_eq!(report.top_facts[0].text, "The Nile is the longest river");
        assert!(report.top_facts.iter().any(|f| f.id == a.id));
        assert_eq!(report.dedup_savings.unwrap().duplicates_avoided, 1);
        assert!((report.layers.stm.usage_pct - 5.0).abs() < 1e-9);
    }

    #[test]
    fn failing_section_is_isolated() {
        let conn = db::open_memory_database().unwrap();
        conn.execute_batch("DROP TABLE cache_entries").unwrap();

        let report = insights(&conn, occupancy(), None, 0);
        assert!(report.layers.cache.is_none());
        assert!(report.layers.ltm.is_some());
        assert!(report.dedup_savings.is_some());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("cache:"));
    }
}
