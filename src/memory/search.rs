//! Read path: FTS5 candidate retrieval and hybrid ranking.
//!
//! Candidates come from an FTS5 `MATCH` over the query's distinct terms.
//! Each candidate is scored as
//!
//! ```text
//! score = lexical × confidence × 0.5^(age_days / half_life_days)
//! ```
//!
//! where `lexical` is the fraction of distinct query terms the fact contains.
//! Returned facts get their access count bumped.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::dedup::normalize_text;
use super::store::{fact_history, get_fact, row_to_fact, LogEntry, FACT_COLUMNS};
use super::types::{Category, Fact};
use crate::config::RetrievalConfig;
use crate::error::{MemoryError, Result};

const SECS_PER_DAY: f64 = 86_400.0;

// ── Public types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Falls back to `retrieval.default_top_k`.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub category: Option<Category>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            category: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub category: Category,
    pub confidence: f64,
    pub score: f64,
    pub age_days: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub items: Vec<SearchHit>,
    pub count: usize,
}

/// Full inspection response for a single fact.
#[derive(Debug, Serialize)]
pub struct InspectResponse {
    pub fact: Fact,
    pub history: Vec<LogEntry>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Ranked search over live facts at time `now` (epoch seconds).
pub fn search(
    conn: &Connection,
    request: &SearchRequest,
    config: &RetrievalConfig,
    now: i64,
) -> Result<SearchResponse> {
    let top_k = request.top_k.unwrap_or(config.default_top_k);
    if top_k == 0 {
        return Err(MemoryError::Validation("top_k must be at least 1".into()));
    }

    let terms = query_terms(&request.query);
    if terms.is_empty() {
        return Err(MemoryError::Validation(
            "query must contain at least one letter or digit".into(),
        ));
    }

    let candidates = fts_candidates(conn, &terms, request.category, config.candidate_limit)?;

    let mut hits: Vec<(SearchHit, i64)> = candidates
        .into_iter()
        .filter_map(|fact| {
            let lexical = lexical_score(&terms, &fact.normalized);
            let age_days = ((now - fact.created_at).max(0) as f64) / SECS_PER_DAY;
            let score = lexical * fact.confidence * recency_decay(age_days, config.half_life_days);
            (score > config.min_score).then(|| {
                (
                    SearchHit {
                        id: fact.id,
                        text: fact.text,
                        category: fact.category,
                        confidence: fact.confidence,
                        score,
                        age_days,
                    },
                    fact.created_at,
                )
            })
        })
        .collect();

    hits.sort_by(|(a, a_created), (b, b_created)| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| b_created.cmp(a_created))
    });
    hits.truncate(top_k);

    let items: Vec<SearchHit> = hits.into_iter().map(|(hit, _)| hit).collect();
    let ids: Vec<&str> = items.iter().map(|h| h.id.as_str()).collect();
    update_access(conn, &ids, now)?;

    tracing::debug!(query = %request.query, results = items.len(), "search complete");
    Ok(SearchResponse {
        count: items.len(),
        items,
    })
}

/// `0.5^(age_days / half_life_days)`. A non-positive half-life disables decay.
pub fn recency_decay(age_days: f64, half_life_days: f64) -> f64 {
    if half_life_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days.max(0.0) / half_life_days)
}

/// Fraction of distinct query terms present in the fact's term set.
pub fn lexical_score(query_terms: &[String], fact_normalized: &str) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let fact_terms: HashSet<&str> = fact_normalized.split_whitespace().collect();
    let matched = query_terms
        .iter()
        .filter(|t| fact_terms.contains(t.as_str()))
        .count();
    matched as f64 / query_terms.len() as f64
}

/// Inspect a single fact with its audit trail. Does not count as an access.
pub fn inspect_fact(conn: &Connection, id: &str) -> Result<InspectResponse> {
    Ok(InspectResponse {
        fact: get_fact(conn, id)?,
        history: fact_history(conn, id)?,
    })
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Distinct normalized terms, in first-seen order.
fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalize_text(query)
        .split_whitespace()
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Quote each term and OR them, so any overlapping fact is a candidate.
fn fts_or_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn fts_candidates(
    conn: &Connection,
    terms: &[String],
    category: Option<Category>,
    limit: usize,
) -> Result<Vec<Fact>> {
    let columns = FACT_COLUMNS
        .split(", ")
        .map(|c| format!("f.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT {columns} FROM facts_fts
         JOIN facts f ON f.rowid = facts_fts.rowid
         WHERE facts_fts MATCH ?1 AND f.deleted = 0 AND (?2 IS NULL OR f.category = ?2)
         ORDER BY bm25(facts_fts)
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let facts = stmt
        .query_map(
            params![fts_or_query(terms), category.map(|c| c.as_str()), limit as i64],
            row_to_fact,
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(facts)
}

/// Batch update access_count and last_accessed_at for returned results.
fn update_access(conn: &Connection, ids: &[&str], now: i64) -> Result<()> {
    if ids.is_empty() {
        return Ok(());
    }
    let mut stmt = conn.prepare(
        "UPDATE facts SET access_count = access_count + 1, last_accessed_at = ?1 WHERE id = ?2",
    )?;
    for id in ids {
        stmt.execute(params![now, id])?;
    }
    Ok(())
}
