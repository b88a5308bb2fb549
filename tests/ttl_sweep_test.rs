mod helpers;

use helpers::{count, learn_at, test_db, T0};
use rusqlite::Connection;
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use strata::memory::cache::{cache_get, cache_put};
use strata::memory::store::{get_fact, NewFact};
use strata::memory::sweep::{sweep, SweepOptions, SweepReport};
use strata::memory::ttl::{classify, TtlPolicy};
use strata::memory::types::{Category, FactSource};

fn run(db: &Mutex<Connection>, now: i64, dry_run: bool) -> SweepReport {
    let options = SweepOptions {
        dry_run,
        include_facts: true,
    };
    sweep(db, &TtlPolicy::default(), now, options, &AtomicBool::new(false)).unwrap()
}

fn auto_fact(text: &str, category: Category) -> NewFact {
    NewFact::new(text).category(category).source(FactSource::Auto)
}

#[test]
fn bitcoin_headline_is_crypto_with_five_minute_ttl() {
    let category = classify("Bitcoin hits new high today");
    assert_eq!(category, Category::Crypto);
    assert_eq!(TtlPolicy::default().ttl_for(category), 300);
}

#[test]
fn crypto_fact_expires_strictly_after_ttl() {
    let mut conn = test_db();
    let id = learn_at(&mut conn, auto_fact("BTC trades at 64000 USD", Category::Crypto), T0).id;
    let db = Mutex::new(conn);

    let early = run(&db, T0 + 299, false);
    assert_eq!(early.expired, 0);
    assert!(!get_fact(&db.lock().unwrap(), &id).unwrap().deleted);

    let late = run(&db, T0 + 301, false);
    assert_eq!(late.expired_fact_ids, vec![id.clone()]);
    assert_eq!(late.evicted, 1);

    let conn = db.lock().unwrap();
    let fact = get_fact(&conn, &id).unwrap();
    assert!(fact.deleted);
    assert_eq!(fact.deleted_at, Some(T0 + 301));
    let expires = count(&conn, "SELECT COUNT(*) FROM memory_log WHERE operation = 'expire'");
    assert_eq!(expires, 1);
}

#[test]
fn manual_facts_never_expire() {
    let mut conn = test_db();
    let id = learn_at(
        &mut conn,
        NewFact::new("ETH moved to proof of stake").category(Category::Crypto),
        T0,
    )
    .id;
    let db = Mutex::new(conn);

    let report = run(&db, T0 + 10 * 365 * 86_400, false);
    assert_eq!(report.scanned, 0);
    assert!(!get_fact(&db.lock().unwrap(), &id).unwrap().deleted);
}

#[test]
fn dry_run_reports_without_mutating_and_matches_real_run() {
    let mut conn = test_db();
    let policy = TtlPolicy::default();
    let stale_fact = learn_at(&mut conn, auto_fact("AAPL closed at 190", Category::Stock), T0).id;
    let fresh_fact = learn_at(
        &mut conn,
        auto_fact("The Treaty of Westphalia was signed in 1648", Category::History),
        T0,
    )
    .id;
    cache_put(&conn, "btc", "64000", Some(Category::Crypto), &policy, T0).unwrap();
    cache_put(&conn, "rain", "likely", Some(Category::Weather), &policy, T0).unwrap();
    cache_put(&conn, "pi", "3.14159", Some(Category::Math), &policy, T0).unwrap();
    let db = Mutex::new(conn);

    let now = T0 + 3600;
    let preview = run(&db, now, true);
    assert!(preview.dry_run);
    assert_eq!(preview.scanned, 5);
    assert_eq!(preview.expired, 3);
    assert_eq!(preview.evicted, 0);
    {
        let conn = db.lock().unwrap();
        assert_eq!(count(&conn, "SELECT COUNT(*) FROM cache_entries"), 3);
        assert!(!get_fact(&conn, &stale_fact).unwrap().deleted);
    }

    let real = run(&db, now, false);
    assert_eq!(real.expired_cache_keys, preview.expired_cache_keys);
    assert_eq!(real.expired_fact_ids, preview.expired_fact_ids);
    assert_eq!(real.evicted, preview.expired);

    let conn = db.lock().unwrap();
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM cache_entries"), 1);
    assert!(get_fact(&conn, &stale_fact).unwrap().deleted);
    assert!(!get_fact(&conn, &fresh_fact).unwrap().deleted);

    let again = run(&db, now, false);
    assert_eq!(again.expired, 0);
}

#[test]
fn expired_cache_entry_reads_as_miss_before_sweep() {
    let conn = test_db();
    let policy = TtlPolicy::default();
    cache_put(&conn, "AAPL", "190.12", Some(Category::Stock), &policy, T0).unwrap();

    assert!(cache_get(&conn, "AAPL", T0 + 300).unwrap().is_some());
    assert!(cache_get(&conn, "AAPL", T0 + 301).unwrap().is_none());
    assert_eq!(count(&conn, "SELECT COUNT(*) FROM cache_entries"), 1);
}

#[test]
fn overridden_ttl_applies_to_sweep() {
    let mut conn = test_db();
    let id = learn_at(&mut conn, auto_fact("Lakers won last night", Category::Sports), T0).id;
    let db = Mutex::new(conn);

    let overrides = [("sports".to_string(), 60u64)].into_iter().collect();
    let policy = TtlPolicy::with_overrides(&overrides);
    let options = SweepOptions {
        dry_run: false,
        include_facts: true,
    };
    let report = sweep(&db, &policy, T0 + 61, options, &AtomicBool::new(false)).unwrap();
    assert_eq!(report.expired_fact_ids, vec![id]);
}
