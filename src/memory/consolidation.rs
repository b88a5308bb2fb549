//! STM → LTM promotion.
//!
//! Each turn of a session window gets an importance score from four signals
//! (recency, content, length, position). Turns above the cutoff, or the top-K
//! when configured, go through a [`FactExtractor`] and then the normal
//! dedup-gated write path with `source = consolidated`.

use regex::Regex;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::OnceLock;

use super::store::{insert_fact_retrying, write_audit_log, NewFact};
use super::ttl::classify;
use super::types::{ConversationTurn, FactSource};
use crate::config::{ConsolidationConfig, DedupConfig};
use crate::db::migrations::{bump_counter, read_counter};
use crate::error::{MemoryError, Result};

const CODE_SIGNAL: f64 = 1.0;
const DECLARATIVE_SIGNAL: f64 = 0.7;
const QUESTION_SIGNAL: f64 = 0.5;
/// Leading turns that get the position bonus.
const HEAD_TURNS: usize = 2;

// ── Extraction ───────────────────────────────────────────────────────────────

/// Turns a selected conversation turn into fact text.
///
/// `Ok(None)` means the turn holds nothing worth keeping. Errors skip the
/// turn; they never abort a consolidation pass.
pub trait FactExtractor: Send + Sync {
    fn extract(&self, turn: &ConversationTurn) -> anyhow::Result<Option<String>>;
}

/// Default extractor: strips code-fence markers, trims, and truncates on a
/// char boundary.
#[derive(Debug, Clone)]
pub struct TruncatingExtractor {
    pub max_chars: usize,
}

impl TruncatingExtractor {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

impl FactExtractor for TruncatingExtractor {
    fn extract(&self, turn: &ConversationTurn) -> anyhow::Result<Option<String>> {
        let body = turn
            .content
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
        let body = body.trim();
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(body.chars().take(self.max_chars).collect()))
    }
}

// ── Scoring ──────────────────────────────────────────────────────────────────

fn declarative_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(is|are|was|were|has|have|means|equals|always|never|my name is|i am|i like|i prefer|remember)\b",
        )
        .map_err(|e| tracing::error!(error = %e, "invalid declarative pattern"))
        .ok()
    })
    .as_ref()
}

/// Strongest content signal present in the text, in `[0, 1]`.
pub fn content_signal(text: &str) -> f64 {
    let mut signal: f64 = 0.0;
    if text.contains("```") {
        signal = signal.max(CODE_SIGNAL);
    }
    if declarative_pattern().is_some_and(|re| re.is_match(text)) {
        signal = signal.max(DECLARATIVE_SIGNAL);
    }
    if text.contains('?') {
        signal = signal.max(QUESTION_SIGNAL);
    }
    signal
}

/// Importance of `turns[idx]` within its window, in `[0, 1]`.
///
/// The weighted sum is divided by the total weight, so custom weights need
/// not add up to one.
pub fn importance(turns: &[ConversationTurn], idx: usize, config: &ConsolidationConfig) -> f64 {
    let n = turns.len();
    if idx >= n {
        return 0.0;
    }
    let turn = &turns[idx];
    let w = config.weights;

    let recency = (idx + 1) as f64 / n as f64;
    let content = content_signal(&turn.content);
    let length = if config.length_cap == 0 {
        1.0
    } else {
        (turn.content.chars().count() as f64 / config.length_cap as f64).min(1.0)
    };
    let position = if idx < HEAD_TURNS || idx + config.tail_turns >= n {
        1.0
    } else {
        0.0
    };

    let total = w.recency + w.content + w.length + w.position;
    if total <= 0.0 {
        return 0.0;
    }
    (w.recency * recency + w.content * content + w.length * length + w.position * position) / total
}

/// Indices of the turns to promote, in chronological order.
pub fn select_turns(turns: &[ConversationTurn], config: &ConsolidationConfig) -> Vec<(usize, f64)> {
    let mut scored: Vec<(usize, f64)> = (0..turns.len())
        .map(|i| (i, importance(turns, i, config)))
        .collect();

    match config.top_k {
        Some(k) => {
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
            scored.truncate(k);
            scored.sort_by_key(|(i, _)| *i);
            scored
        }
        None => scored.into_iter().filter(|(_, s)| *s > config.cutoff).collect(),
    }
}

// ── Consolidation ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize)]
pub struct ConsolidationResult {
    pub turns_considered: usize,
    pub candidates: usize,
    pub facts_created: usize,
    /// Candidates absorbed by an existing fact.
    pub merged: usize,
    /// Candidates dropped by the extractor or rejected as empty.
    pub skipped: usize,
    /// `facts_created / turns_considered`.
    pub conversion_rate: f64,
    pub fact_ids: Vec<String>,
}

/// Promote the important turns of one window into long-term facts.
pub fn consolidate(
    conn: &mut Connection,
    turns: &[ConversationTurn],
    extractor: &dyn FactExtractor,
    config: &ConsolidationConfig,
    dedup: &DedupConfig,
    now: i64,
) -> Result<ConsolidationResult> {
    let mut result = ConsolidationResult {
        turns_considered: turns.len(),
        ..Default::default()
    };
    if turns.is_empty() {
        return Ok(result);
    }

    let selected = select_turns(turns, config);
    result.candidates = selected.len();

    let mut failure = None;
    for (idx, score) in selected {
        let turn = &turns[idx];
        let text = match extractor.extract(turn) {
            Ok(Some(text)) => text,
            Ok(None) => {
                result.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(session = %turn.session_id, turn = idx, error = %e, "extraction failed, skipping turn");
                result.skipped += 1;
                continue;
            }
        };

        let fact = NewFact::new(text.as_str())
            .category(classify(&text))
            .confidence(config.fact_confidence.clamp(0.0, 1.0))
            .source(FactSource::Consolidated)
            .metadata(serde_json::json!({
                "session_id": turn.session_id,
                "user_id": turn.user_id,
                "importance": score,
            }));

        match insert_fact_retrying(conn, &fact, dedup, now) {
            Ok(stored) if stored.deduped => result.merged += 1,
            Ok(stored) => {
                result.facts_created += 1;
                let logged = write_audit_log(
                    conn,
                    "consolidate",
                    &stored.id,
                    Some(&serde_json::json!({ "session_id": turn.session_id, "turn": idx })),
                    now,
                );
                result.fact_ids.push(stored.id);
                if let Err(e) = logged {
                    failure = Some(e);
                    break;
                }
            }
            Err(MemoryError::Validation(msg)) => {
                tracing::debug!(turn = idx, reason = %msg, "candidate rejected");
                result.skipped += 1;
            }
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }

    if let Some(e) = failure {
        // Facts created before the failure are committed and stay counted.
        // Turns are counted by the pass that completes the window; a retry
        // merges the facts already created instead of creating them again.
        if result.facts_created > 0 {
            if let Err(bump) = bump_counter(conn, "facts_consolidated", result.facts_created as i64) {
                tracing::warn!(error = %bump, "failed to record partial consolidation");
            }
        }
        tracing::warn!(
            created = result.facts_created,
            error = %e,
            "consolidation pass failed partway"
        );
        return Err(e);
    }

    result.conversion_rate = result.facts_created as f64 / result.turns_considered as f64;

    bump_counter(conn, "turns_considered", result.turns_considered as i64)?;
    bump_counter(conn, "facts_consolidated", result.facts_created as i64)?;

    tracing::info!(
        turns = result.turns_considered,
        candidates = result.candidates,
        created = result.facts_created,
        merged = result.merged,
        rate = result.conversion_rate,
        "consolidation pass finished"
    );
    Ok(result)
}

/// Lifetime `facts_consolidated / turns_considered`, or 0 before any pass.
pub fn running_conversion_rate(conn: &Connection) -> Result<f64> {
    let turns = read_counter(conn, "turns_considered")?;
    let facts = read_counter(conn, "facts_consolidated")?;
    Ok(if turns > 0 {
        facts as f64 / turns as f64
    } else {
        0.0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ImportanceWeights;
    use crate::db;
    use crate::memory::types::Role;

    fn turn(content: &str) -> ConversationTurn {
        ConversationTurn {
            user_id: "u".into(),
            session_id: "s".into(),
            role: Role::User,
            content: content.into(),
            timestamp: 0,
        }
    }

    fn content_only() -> ConsolidationConfig {
        ConsolidationConfig {
            weights: ImportanceWeights {
                recency: 0.0,
                content: 1.0,
                length: 0.0,
                position: 0.0,
            },
            ..Default::default()
        }
    }

    #[test]
    fn content_signals_rank_code_highest() {
        assert_eq!(content_signal("```rust\nfn main() {}\n```"), 1.0);
        assert_eq!(content_signal("The sky is blue"), 0.7);
        assert_eq!(content_signal("why?"), 0.5);
        assert_eq!(content_signal("ok"), 0.0);
    }

    #[test]
    fn importance_stays_in_unit_range() {
        let turns: Vec<_> = ["hi", "what is rust?", "```\nlet x = 1;\n```", "ok", "bye"]
            .iter()
            .map(|c| turn(c))
            .collect();
        let config = ConsolidationConfig::default();
        for i in 0..turns.len() {
            let s = importance(&turns, i, &config);
            assert!((0.0..=1.0).contains(&s), "turn {i} scored {s}");
        }
        assert_eq!(importance(&turns, 99, &config), 0.0);
    }

    #[test]
    fn later_turns_score_higher_all_else_equal() {
        let turns: Vec<_> = (0..10).map(|_| turn("ok")).collect();
        let config = ConsolidationConfig {
            weights: ImportanceWeights {
                recency: 1.0,
                content: 0.0,
                length: 0.0,
                position: 0.0,
            },
            ..Default::default()
        };
        assert!(importance(&turns, 7, &config) > importance(&turns, 3, &config));
    }

    #[test]
    fn top_k_selection_is_chronological() {
        let turns: Vec<_> = ["ok", "```a```", "ok", "x is y", "ok"].iter().map(|c| turn(c)).collect();
        let config = ConsolidationConfig {
            top_k: Some(2),
            ..content_only()
        };
        let picked: Vec<usize> = select_turns(&turns, &config).into_iter().map(|(i, _)| i).collect();
        assert_eq!(picked, vec![1, 3]);
    }

    #[test]
    fn extractor_strips_fences_and_truncates() {
        let ex = TruncatingExtractor::new(5);
        let out = ex.extract(&turn("```rust\nabcdefgh\n```")).unwrap();
        assert_eq!(out.as_deref(), Some("abcde"));
        assert_eq!(ex.extract(&turn("```\n```")).unwrap(), None);
    }

    struct FailingExtractor;

    impl FactExtractor for FailingExtractor {
        fn extract(&self, _turn: &ConversationTurn) -> anyhow::Result<Option<String>> {
            anyhow::bail!("model unavailable")
        }
    }

    #[test]
    fn extractor_failures_are_skipped() {
        let mut conn = db::open_memory_database().unwrap();
        let turns: Vec<_> = (0..4).map(|i| turn(&format!("```\nsnippet {i}\n```"))).collect();
        let result = consolidate(
            &mut conn,
            &turns,
            &FailingExtractor,
            &content_only(),
            &DedupConfig::default(),
            0,
        )
        .unwrap();
        assert_eq!(result.candidates, 4);
        assert_eq!(result.skipped, 4);
        assert_eq!(result.facts_created, 0);
        assert_eq!(result.conversion_rate, 0.0);
    }

    #[test]
    fn running_rate_accumulates() {
        let mut conn = db::open_memory_database().unwrap();
        let ex = TruncatingExtractor::new(200);
        let turns = vec![turn("```\nalpha beta gamma\n```"), turn("ok")];
        consolidate(&mut conn, &turns, &ex, &content_only(), &DedupConfig::default(), 0).unwrap();
        assert_eq!(running_conversion_rate(&conn).unwrap(), 0.5);
    }

    #[test]
    fn partial_failure_keeps_committed_facts_counted() {
        let mut conn = db::open_memory_database().unwrap();
        conn.execute_batch(
            "CREATE TRIGGER one_fact_only BEFORE INSERT ON facts
             WHEN (SELECT COUNT(*) FROM facts) >= 1
             BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
        )
        .unwrap();
        let turns = vec![
            turn("```\nfn parse_header(buf: &[u8]) -> Header\n```"),
            turn("```\nSELECT name FROM planets WHERE moons > 3\n```"),
        ];

        let err = consolidate(
            &mut conn,
            &turns,
            &TruncatingExtractor::new(200),
            &content_only(),
            &DedupConfig::default(),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, MemoryError::Storage(_)), "{err}");

        assert_eq!(read_counter(&conn, "facts_consolidated").unwrap(), 1);
        assert_eq!(read_counter(&conn, "turns_considered").unwrap(), 0);
        let stored: i64 = conn.query_row("SELECT COUNT(*) FROM facts", [], |r| r.get(0)).unwrap();
        assert_eq!(stored, 1);
    }
}
