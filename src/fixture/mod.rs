//! Fixture model, deduplication, persistence, and matching.

pub mod matcher;
pub mod store;
pub mod types;

pub use matcher::{FixtureMatch, FixtureMatcher};
pub use store::{FixtureIndex, FixtureIndexEntry, FixtureStore, INDEX_FILE};
pub use types::{
    Asset, BodyKind, CapturedRequest, CapturedResponse, Fixture, FixtureMetadata, RedirectRecord,
    binary_body_marker,
};

use crate::pattern::pattern_priority;
use std::collections::HashSet;

/// Drop duplicate fixtures, keeping the first occurrence per
/// `(method, pattern)`.
///
/// Capture order is preserved for the survivors, so earlier responses win
/// over later ones for the same endpoint shape.
#[must_use]
pub fn deduplicate_fixtures(fixtures: Vec<Fixture>) -> Vec<Fixture> {
    partition_duplicates(fixtures).0
}

/// Split a fixture list into survivors and `(method, pattern)` duplicates,
/// both in capture order
#[must_use]
pub fn partition_duplicates(fixtures: Vec<Fixture>) -> (Vec<Fixture>, Vec<Fixture>) {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut kept = Vec::with_capacity(fixtures.len());
    let mut dropped = Vec::new();

    for fixture in fixtures {
        let key = (
            fixture.request.method.to_uppercase(),
            fixture.request.pattern.clone(),
        );
        if seen.insert(key) {
            kept.push(fixture);
        } else {
            dropped.push(fixture);
        }
    }
    (kept, dropped)
}

/// Stable sort by descending pattern priority.
///
/// Equal priorities keep capture order, which keeps replay deterministic
/// across runs over the same fixture set.
pub fn sort_by_priority(fixtures: &mut [Fixture]) {
    fixtures.sort_by_key(|f| std::cmp::Reverse(pattern_priority(&f.request.pattern)));
}


#[cfg(test)]
mod tests {
    use super::test_support::fixture_for;
    use super::*;

    #[test]
    fn dedup_keeps_first_occurrence() {
        let fixtures = vec![
            fixture_for(0, "GET", "/api/users/1", "/api/users/:userId"),
            fixture_for(1, "GET", "/api/users/2", "/api/users/:userId"),
            fixture_for(2, "POST", "/api/users/1", "/api/users/:userId"),
        ];

        let deduped = deduplicate_fixtures(fixtures);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].request.path, "/api/users/1");
        assert_eq!(deduped[1].request.method, "POST");
    }

    #[test]
    fn method_pattern_unique_after_dedup() {
        let fixtures: Vec<_> = (0..10)
            .map(|i| fixture_for(i, "GET", &format!("/api/items/{i}"), "/api/items/:itemId"))
            .collect();
        let deduped = deduplicate_fixtures(fixtures);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn priority_sort_is_stable() {
        let mut fixtures = vec![
            fixture_for(0, "GET", "/api/items/1", "/api/items/:itemId"),
            fixture_for(1, "GET", "/api/users/me/settings", "/api/users/me/settings"),
            fixture_for(2, "GET", "/api/items/2", "/api/items/:itemId"),
        ];
        sort_by_priority(&mut fixtures);

        assert_eq!(fixtures[0].request.pattern, "/api/users/me/settings");
        // Equal-priority fixtures stay in capture order
        assert_eq!(fixtures[1].request.path, "/api/items/1");
        assert_eq!(fixtures[2].request.path, "/api/items/2");
    }
}
