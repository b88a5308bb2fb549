#![allow(dead_code)]

use rusqlite::{params, Connection};
use strata::config::DedupConfig;
use strata::db;
use strata::memory::store::{insert_fact_at, NewFact, StoreFactResult};
use strata::memory::types::{ConversationTurn, Role};

pub const DAY: i64 = 86_400;

/// Fixed reference time so tests never depend on the wall clock.
pub const T0: i64 = 1_700_000_000;

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Store a fact through the full write path at time `now`.
pub fn learn_at(conn: &mut Connection, fact: NewFact, now: i64) -> StoreFactResult {
    insert_fact_at(conn, &fact, &DedupConfig::default(), now).unwrap()
}

/// Store a fact with the given confidence at `T0`. Returns the fact id.
pub fn learn(conn: &mut Connection, text: &str, confidence: f64) -> String {
    learn_at(conn, NewFact::new(text).confidence(confidence), T0).id
}

/// Move a fact's creation time, as if it had been stored `days` before `T0`.
pub fn backdate(conn: &Connection, id: &str, days: i64) {
    conn.execute(
        "UPDATE facts SET created_at = ?1, updated_at = ?1 WHERE id = ?2",
        params![T0 - days * DAY, id],
    )
    .unwrap();
}

pub fn turn(content: &str, timestamp: i64) -> ConversationTurn {
    ConversationTurn {
        user_id: "tester".into(),
        session_id: "session-1".into(),
        role: Role::User,
        content: content.into(),
        timestamp,
    }
}

pub fn count(conn: &Connection, sql: &str) -> i64 {
    conn.query_row(sql, [], |r| r.get(0)).unwrap()
}
