mod helpers;

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use strata::config::StrataConfig;
use strata::db;
use strata::engine::MemoryEngine;
use strata::error::MemoryError;
use strata::memory::search::SearchRequest;
use strata::memory::store::NewFact;
use strata::memory::sweep::{sweep, SweepOptions};
use strata::memory::ttl::TtlPolicy;
use strata::memory::types::{Category, FactSource};
use tempfile::TempDir;

#[test]
fn garbage_file_is_rejected_not_panicked() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("garbage.db");
    std::fs::write(&path, vec![0xAB; 8192]).unwrap();

    assert!(db::open_database(&path).is_err());
}

#[test]
fn empty_file_is_initialized_as_a_new_database() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("empty.db");
    std::fs::write(&path, b"").unwrap();

    let conn = db::open_database(&path).unwrap();
    let report = db::check_database_health(&conn).unwrap();
    assert!(report.integrity_ok);
    assert_eq!(report.fact_count, 0);
}

#[test]
fn failed_fact_expiry_does_not_stop_the_sweep() {
    let mut conn = helpers::test_db();
    let fact = helpers::learn_at(
        &mut conn,
        NewFact::new("Bitcoin dipped below support overnight")
            .category(Category::Crypto)
            .source(FactSource::Auto),
        helpers::T0,
    );
    conn.execute(
        "INSERT INTO cache_entries (key, value, category, created_at, expires_at)
         VALUES ('quote', '42', 'stock', ?1, ?2)",
        rusqlite::params![helpers::T0, helpers::T0 + 60],
    )
    .unwrap();
    conn.execute_batch(
        "CREATE TRIGGER poison_expire BEFORE UPDATE OF deleted ON facts
         BEGIN SELECT RAISE(ABORT, 'poisoned'); END;",
    )
    .unwrap();

    let db = Mutex::new(conn);
    let report = sweep(
        &db,
        &TtlPolicy::default(),
        helpers::T0 + 3_600,
        SweepOptions {
            dry_run: false,
            include_facts: true,
        },
        &AtomicBool::new(false),
    )
    .unwrap();

    assert_eq!(report.expired, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.evicted, 1);

    let conn = db.lock().unwrap();
    assert_eq!(helpers::count(&conn, "SELECT COUNT(*) FROM cache_entries"), 0);
    let deleted: i64 = conn
        .query_row("SELECT deleted FROM facts WHERE id = ?1", [&fact.id], |r| r.get(0))
        .unwrap();
    assert_eq!(deleted, 0, "the failed expiry must roll back");
}

#[tokio::test]
async fn query_syntax_characters_are_searched_literally() {
    let engine = MemoryEngine::in_memory(StrataConfig::default()).unwrap();
    engine
        .learn_fact(NewFact::new("Rust NEAR zero-cost abstractions"))
        .await
        .unwrap();

    for query in ["NEAR(rust", "rust AND OR NOT", "\"rust*", "abstractions:^"] {
        let response = engine.search(SearchRequest::new(query)).await.unwrap();
        assert!(response.count <= 1, "{query}");
    }
}

#[tokio::test]
async fn insights_survive_a_missing_table() {
    let engine = MemoryEngine::in_memory(StrataConfig::default()).unwrap();
    engine
        .learn_fact(NewFact::new("Water boils at 100 degrees at sea level"))
        .await
        .unwrap();
    engine
        .connection()
        .lock()
        .unwrap()
        .execute_batch("DROP TABLE engine_counters")
        .unwrap();

    let report = engine.insights().await.unwrap();
    assert_eq!(report.layers.ltm.as_ref().unwrap().active, 1);
    assert!(report.layers.cache.is_some());
    assert!(report.consolidation.is_none());
    assert!(report.dedup_savings.is_none());
    assert_eq!(report.errors.len(), 2, "{:?}", report.errors);
}

#[tokio::test]
async fn poisoned_lock_surfaces_as_internal_error() {
    let engine = MemoryEngine::in_memory(StrataConfig::default()).unwrap();
    let db = engine.connection();
    let _ = std::thread::spawn(move || {
        let _guard = db.lock().unwrap();
        panic!("worker died holding the lock");
    })
    .join();

    let err = engine
        .learn_fact(NewFact::new("Anything at all"))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Internal(_)), "{err}");
    assert_eq!(err.http_status(), 500);

    let err = engine
        .run_sweep(false, Arc::new(AtomicBool::new(false)))
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Internal(_)));
}
