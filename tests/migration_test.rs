mod helpers;

use strata::db;
use strata::db::migrations::{
    bump_counter, get_schema_version, read_counter, run_migrations, CURRENT_SCHEMA_VERSION,
    ENGINE_COUNTERS,
};

#[test]
fn fresh_db_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn migration_seeds_engine_counters() {
    let conn = helpers::test_db();
    for name in ENGINE_COUNTERS {
        assert_eq!(read_counter(&conn, name).unwrap(), 0, "{name}");
    }
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    bump_counter(&conn, "sweeps_run", 3).unwrap();

    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(read_counter(&conn, "sweeps_run").unwrap(), 3, "re-running must not reset counters");
}

#[test]
fn manual_v1_db_upgrades_correctly() {
    // A database initialized before the counters table existed.
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), 1);
    let has_counters: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'engine_counters'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(has_counters, 0);

    run_migrations(&conn).unwrap();

    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(read_counter(&conn, "dedup_hits").unwrap(), 0);
}

#[test]
fn raw_text_index_is_rebuilt_over_normalized_text() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    // Layout written by older binaries: the index tokenized the raw text.
    conn.execute_batch(
        "DROP TABLE facts_fts;
         CREATE VIRTUAL TABLE facts_fts USING fts5(
             text, id UNINDEXED, category UNINDEXED, content='facts', content_rowid='rowid'
         );
         INSERT INTO facts (id, text, normalized, category, created_at, updated_at)
             VALUES ('f1', 'Don''t panic', 'dont panic', 'default', 0, 0);
         INSERT INTO facts (id, text, normalized, category, created_at, updated_at, deleted)
             VALUES ('f2', 'Won''t return', 'wont return', 'default', 0, 0, 1);
         INSERT INTO facts_fts (rowid, text, id, category)
             SELECT rowid, text, id, category FROM facts WHERE deleted = 0;",
    )
    .unwrap();

    run_migrations(&conn).unwrap();

    let hits = |term: &str| -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM facts_fts WHERE facts_fts MATCH ?1",
            [format!("\"{term}\"")],
            |r| r.get(0),
        )
        .unwrap()
    };
    assert_eq!(hits("dont"), 1);
    assert_eq!(hits("wont"), 0, "deleted facts stay out of the index");
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}
