//! Fixture lookup for the replay server.
//!
//! Maps `(method, path)` to the best captured fixture: exact path match
//! first, then the highest-priority pattern whose regex accepts the path.
//! Methods never cross-contaminate; matching is deterministic and stable
//! across runs for the same fixture set.

use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use super::types::Fixture;
use crate::pattern::{pattern_priority, pattern_to_regex};

/// A fixture with its compiled pattern, ready for matching
struct CompiledFixture {
    fixture: Arc<Fixture>,
    regex: Regex,
    priority: i32,
    /// Capture order, used as the stable tiebreaker
    order: usize,
}

/// Successful lookup result
#[derive(Debug, Clone)]
pub struct FixtureMatch {
    pub fixture: Arc<Fixture>,
    /// Path parameter values extracted from the concrete path
    pub params: HashMap<String, String>,
}

/// Prebuilt per-method fixture index
#[derive(Default)]
pub struct FixtureMatcher {
    /// method -> exact request path -> fixture (first occurrence wins)
    exact: HashMap<String, HashMap<String, Arc<Fixture>>>,
    /// method -> fixtures sorted by descending priority, then capture order
    patterns: HashMap<String, Vec<CompiledFixture>>,
}

impl FixtureMatcher {
    /// Build a matcher over a fixture set.
    ///
    /// Fixtures whose pattern fails to compile are skipped with a warning;
    /// a single malformed pattern must not take down replay.
    #[must_use]
    pub fn new(fixtures: Vec<Fixture>) -> Self {
        let mut matcher = Self::default();

        for (order, fixture) in fixtures.into_iter().enumerate() {
            let fixture = Arc::new(fixture);
            let method = fixture.request.method.to_uppercase();

            matcher
                .exact
                .entry(method.clone())
                .or_default()
                .entry(fixture.request.path.clone())
                .or_insert_with(|| Arc::clone(&fixture));

            match pattern_to_regex(&fixture.request.pattern) {
                Ok(regex) => {
                    let priority = pattern_priority(&fixture.request.pattern);
                    matcher
                        .patterns
                        .entry(method)
                        .or_default()
                        .push(CompiledFixture {
                            fixture,
                            regex,
                            priority,
                            order,
                        });
                }
                Err(e) => {
                    tracing::warn!(
                        id = %fixture.id,
                        pattern = %fixture.request.pattern,
                        error = %e,
                        "Skipping fixture with uncompilable pattern"
                    );
                }
            }
        }

        for list in matcher.patterns.values_mut() {
            list.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.order.cmp(&b.order)));
        }

        matcher
    }

    /// Find the best fixture for a request, if any
    #[must_use]
    pub fn find(&self, method: &str, path: &str) -> Option<FixtureMatch> {
        let method = method.to_uppercase();

        if let Some(fixture) = self.exact.get(&method).and_then(|m| m.get(path)) {
            return Some(FixtureMatch {
                fixture: Arc::clone(fixture),
                params: HashMap::new(),
            });
        }

        let candidates = self.patterns.get(&method)?;
        for candidate in candidates {
            if let Some(caps) = candidate.regex.captures(path) {
                let params = candidate
                    .fixture
                    .request
                    .path_params
                    .iter()
                    .zip(caps.iter().skip(1).flatten())
                    .map(|(name, m)| (name.clone(), m.as_str().to_string()))
                    .collect();
                return Some(FixtureMatch {
                    fixture: Arc::clone(&candidate.fixture),
                    params,
                });
            }
        }

        None
    }

    /// Number of indexed fixtures across all methods
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
