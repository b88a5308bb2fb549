mod helpers;

use helpers::{backdate, learn, learn_at, test_db, DAY, T0};
use strata::config::RetrievalConfig;
use strata::memory::search::{search, SearchRequest};
use strata::memory::store::{get_fact, NewFact};
use strata::memory::types::Category;

fn run(conn: &rusqlite::Connection, request: SearchRequest) -> strata::memory::search::SearchResponse {
    search(conn, &request, &RetrievalConfig::default(), T0).unwrap()
}

#[test]
fn newer_fact_outranks_older_one() {
    let mut conn = test_db();
    let old = learn(&mut conn, "Satellite data shows glacier retreat in Patagonia", 0.8);
    let new = learn(&mut conn, "Glacier retreat accelerated across the Alps last decade", 0.8);
    backdate(&conn, &old, 200);
    backdate(&conn, &new, 10);

    let response = run(&conn, SearchRequest::new("glacier retreat"));
    assert_eq!(response.count, 2);
    assert_eq!(response.items[0].id, new);
    assert!(response.items[0].score > response.items[1].score);
    assert!((response.items[0].age_days - 10.0).abs() < 1e-9);
}

#[test]
fn half_life_halves_the_score() {
    let mut conn = test_db();
    let id = learn(&mut conn, "Honey never spoils when sealed", 1.0);
    backdate(&conn, &id, 180);

    let response = run(&conn, SearchRequest::new("honey spoils"));
    assert!((response.items[0].score - 0.5).abs() < 1e-9);
}

#[test]
fn more_overlapping_terms_rank_higher() {
    let mut conn = test_db();
    let partial = learn(&mut conn, "Rust compiles to native machine code", 0.9);
    let full = learn(&mut conn, "The Rust borrow checker enforces aliasing rules", 0.9);

    let response = run(&conn, SearchRequest::new("rust borrow checker"));
    assert_eq!(response.items[0].id, full);
    assert_eq!(response.items[1].id, partial);
    assert!((response.items[1].score / response.items[0].score - 1.0 / 3.0).abs() < 1e-9);
}

#[test]
fn confidence_breaks_score_ties_through_the_product() {
    let mut conn = test_db();
    let weak = learn(&mut conn, "Octopuses have three hearts", 0.3);
    let strong = learn(&mut conn, "An octopus has three hearts and blue blood", 0.9);

    let response = run(&conn, SearchRequest::new("three hearts"));
    assert_eq!(response.items[0].id, strong);
    assert_eq!(response.items[1].id, weak);
}

#[test]
fn top_k_and_category_filter() {
    let mut conn = test_db();
    for text in [
        "Lisbon enjoys sunny winters",
        "Madrid summers are hot and sunny",
        "Rome has a sunny Mediterranean climate",
        "Athens is sunny most days of the year",
    ] {
        learn_at(&mut conn, NewFact::new(text).category(Category::Geography), T0);
    }
    learn_at(
        &mut conn,
        NewFact::new("The sunny forecast holds all week").category(Category::Weather),
        T0,
    );

    assert_eq!(run(&conn, SearchRequest::new("sunny").top_k(2)).count, 2);

    let weather = run(&conn, SearchRequest::new("sunny").category(Category::Weather));
    assert_eq!(weather.count, 1);
    assert_eq!(weather.items[0].category, Category::Weather);
}

#[test]
fn returned_facts_record_the_access() {
    let mut conn = test_db();
    let hit = learn(&mut conn, "Venus rotates backwards", 0.9);
    let miss = learn(&mut conn, "Mars has two moons", 0.9);

    run(&conn, SearchRequest::new("venus rotates"));

    let hit = get_fact(&conn, &hit).unwrap();
    assert_eq!(hit.access_count, 1);
    assert_eq!(hit.last_accessed_at, Some(T0));
    assert_eq!(get_fact(&conn, &miss).unwrap().access_count, 0);
}

#[test]
fn invalid_requests_are_rejected() {
    let conn = test_db();
    let config = RetrievalConfig::default();
    let err = search(&conn, &SearchRequest::new("anything").top_k(0), &config, T0).unwrap_err();
    assert_eq!(err.http_status(), 422);
    let err = search(&conn, &SearchRequest::new("?!"), &config, T0).unwrap_err();
    assert_eq!(err.http_status(), 422);
}

#[test]
fn future_timestamps_clamp_age_to_zero() {
    let mut conn = test_db();
    let id = learn_at(&mut conn, NewFact::new("Light travels fast").confidence(1.0), T0 + DAY).id;
    let response = run(&conn, SearchRequest::new("light"));
    assert_eq!(response.items[0].id, id);
    assert_eq!(response.items[0].age_days, 0.0);
}

#[test]
fn contractions_match_with_or_without_apostrophe() {
    let mut conn = test_db();
    let id = learn(&mut conn, "Don't feed gremlins after midnight", 1.0);

    for query in ["don't", "dont", "DON\u{2019}T"] {
        let response = run(&conn, SearchRequest::new(query));
        assert_eq!(response.count, 1, "{query}");
        assert_eq!(response.items[0].id, id);
        assert!((response.items[0].score - 1.0).abs() < 1e-9, "{query}");
    }
}
