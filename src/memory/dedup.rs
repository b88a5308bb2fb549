//! Fuzzy duplicate detection for facts.
//!
//! Text is normalized (lowercase, punctuation stripped, whitespace collapsed)
//! and compared with a character-level LCS ratio, `2·LCS / (|a| + |b|)`, which
//! reaches 1.0 for identical normalized strings. Only non-deleted facts in the
//! same category are candidates.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::store::get_fact;
use super::types::{Category, Fact};
use crate::config::DedupConfig;
use crate::error::Result;

/// Result of a duplicate check. `matched` is the best candidate at or above
/// the threshold; `similarity` is its score (or the best score seen).
#[derive(Debug, Clone, Serialize)]
pub struct DedupOutcome {
    pub matched: Option<Fact>,
    pub similarity: f64,
}

/// Lowercase, replace punctuation with spaces, collapse whitespace.
pub fn normalize_text(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else if c == '\'' || c == '\u{2019}' || c == '"' {
                // apostrophes join ("don't" -> "dont")
                '\0'
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\0')
        .flat_map(char::to_lowercase)
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// LCS ratio between two already-normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    (2 * lcs_len(&a, &b)) as f64 / total as f64
}

/// Best ratio two strings of these lengths could reach.
fn similarity_upper_bound(len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 1.0;
    }
    (2 * len_a.min(len_b)) as f64 / total as f64
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &lc in long {
        for (j, &sc) in short.iter().enumerate() {
            curr[j + 1] = if lc == sc {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Find the closest live fact in `category` to `text`.
///
/// Pure read: never writes. A fact is a duplicate when its similarity is
/// `>= config.threshold`.
pub fn dedup_check(
    conn: &Connection,
    text: &str,
    category: Category,
    config: &DedupConfig,
) -> Result<DedupOutcome> {
    let candidate = normalize_text(text);
    let candidate_len = candidate.chars().count();

    // Exact matches hit the live uniqueness index regardless of the scan cap.
    let exact: Option<String> = conn
        .query_row(
            "SELECT id FROM facts WHERE category = ?1 AND normalized = ?2 AND deleted = 0",
            params![category.as_str(), candidate],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(id) = exact {
        return Ok(DedupOutcome {
            matched: Some(get_fact(conn, &id)?),
            similarity: 1.0,
        });
    }

    let mut stmt = conn.prepare_cached(
        "SELECT id, normalized FROM facts
         WHERE category = ?1 AND deleted = 0
         ORDER BY updated_at DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(
        params![category.as_str(), config.max_candidates as i64],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    )?;

    let mut best: Option<(String, f64)> = None;
    for row in rows {
        let (id, existing) = row?;
        let bound = similarity_upper_bound(candidate_len, existing.chars().count());
        let best_score = best.as_ref().map_or(0.0, |(_, s)| *s);
        if bound < config.threshold || bound <= best_score {
            continue;
        }
        let score = similarity(&candidate, &existing);
        if score > best_score {
            let exact = score >= 1.0;
            best = Some((id, score));
            if exact {
                break;
            }
        }
    }

    match best {
        Some((id, score)) if score >= config.threshold => {
            let fact = get_fact(conn, &id)?;
            tracing::debug!(id = %id, similarity = score, "duplicate candidate found");
            Ok(DedupOutcome {
                matched: Some(fact),
                similarity: score,
            })
        }
        Some((_, score)) => Ok(DedupOutcome {
            matched: None,
            similarity: score,
        }),
        None => Ok(DedupOutcome {
            matched: None,
            similarity: 0.0,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(
            normalize_text("  Paris is the CAPITAL of France!  "),
            "paris is the capital of france"
        );
        assert_eq!(normalize_text("don't\tpanic,  ok?"), "dont panic ok");
        assert_eq!(normalize_text("fn main() {}"), "fn main");
        assert_eq!(normalize_text("..."), "");
    }

    #[test]
    fn identical_strings_score_one() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
    }

    #[test]
    fn disjoint_strings_score_zero() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("abc", ""), 0.0);
    }

    #[test]
    fn ratio_matches_lcs_definition() {
        // LCS 17 over 40 chars
        assert_eq!(similarity("abcdefghijklmnopqrst", "abcdefghijklmnopqxyz"), 0.85);
        // LCS 16 over 40 chars
        assert_eq!(similarity("abcdefghijklmnopqrst", "abcdefghijklmnopxyzw"), 0.8);
    }

    #[test]
    fn similarity_is_symmetric() {
        let a = "paris is the capital of france";
        let b = "paris is capital of france";
        assert_eq!(similarity(a, b), similarity(b, a));
        assert!((similarity(a, b) - 52.0 / 56.0).abs() < 1e-12);
    }

    #[test]
    fn upper_bound_never_below_actual() {
        let pairs = [("kitten", "sitting"), ("abc", "abcdef"), ("rust", "trust")];
        for (a, b) in pairs {
            assert!(similarity_upper_bound(a.len(), b.len()) >= similarity(a, b));
        }
    }
}
