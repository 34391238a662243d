//! Fixture matching, dedup, and persistence round-trips.

mod common;

use common::json_fixture;
use sitereplay::fixture::{FixtureMatcher, FixtureStore, deduplicate_fixtures, sort_by_priority};
use tempfile::TempDir;

#[test]
fn exact_path_beats_parameterized_pattern() {
    let fixtures = vec![
        json_fixture(0, "GET", "/api/users/42", serde_json::json!({"id": "42"})),
        json_fixture(1, "GET", "/api/users/me", serde_json::json!({"id": "me"})),
    ];
    let matcher = FixtureMatcher::new(fixtures);

    let me = matcher.find("GET", "/api/users/me").unwrap();
    assert_eq!(me.fixture.response.body["id"], "me");
    assert!(me.params.is_empty());

    let other = matcher.find("GET", "/api/users/7").unwrap();
    assert_eq!(other.fixture.request.pattern, "/api/users/:userId");
    assert_eq!(other.params["userId"], "7");
}

#[test]
fn matcher_is_stable_across_rebuilds() {
    let build = || {
        FixtureMatcher::new(vec![
            json_fixture(0, "GET", "/api/items/1", serde_json::json!({"n": 1})),
            json_fixture(1, "GET", "/api/items/2", serde_json::json!({"n": 2})),
            json_fixture(2, "GET", "/api/items/abc123", serde_json::json!({"n": 3})),
        ])
    };

    for _ in 0..5 {
        let matcher = build();
        let hit = matcher.find("GET", "/api/items/999").unwrap();
        assert_eq!(hit.fixture.response.body["n"], 1);
    }
}

#[test]
fn dedup_then_sort_keeps_unique_method_pattern_pairs() {
    let fixtures = vec![
        json_fixture(0, "GET", "/api/users/1", serde_json::json!({"first": true})),
        json_fixture(1, "GET", "/api/users/2", serde_json::json!({"first": false})),
        json_fixture(2, "POST", "/api/users/1", serde_json::json!({})),
        json_fixture(3, "GET", "/api/users/1/posts/9", serde_json::json!({})),
    ];

    let mut deduped = deduplicate_fixtures(fixtures);
    assert_eq!(deduped.len(), 3);
    // First occurrence won
    assert_eq!(
        deduped
            .iter()
            .find(|f| f.request.method == "GET" && f.request.pattern == "/api/users/:userId")
            .unwrap()
            .response
            .body["first"],
        true
    );

    sort_by_priority(&mut deduped);
    assert_eq!(deduped[0].request.pattern, "/api/users/:userId/posts/:postId");
}

#[tokio::test]
async fn store_round_trip_preserves_fixtures_and_order() {
    let dir = TempDir::new().unwrap();
    let store = FixtureStore::new(dir.path().join("fixtures"));

    let mut fixtures = vec![
        json_fixture(0, "GET", "/api/users/5", serde_json::json!({"id": "5"})),
        json_fixture(1, "POST", "/api/orders/77", serde_json::json!({"ok": true})),
    ];
    sort_by_priority(&mut fixtures);

    let index = store.save_all(&fixtures).await.unwrap();
    assert_eq!(index.count, 2);
    assert!(dir.path().join("fixtures/_index.json").exists());

    let loaded = store.load_all().await.unwrap();
    assert_eq!(loaded.len(), 2);
    for (a, b) in fixtures.iter().zip(loaded.iter()) {
        assert_eq!(a.id, b.id);
        assert_eq!(a.request.pattern, b.request.pattern);
        assert_eq!(a.response.body, b.response.body);
    }

    // A matcher built from the loaded set behaves like the original
    let matcher = FixtureMatcher::new(loaded);
    assert!(matcher.find("POST", "/api/orders/123").is_some());
    assert!(matcher.find("GET", "/api/orders/123").is_none());
}
