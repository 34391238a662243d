//! Shared helpers for integration tests.

use std::collections::BTreeMap;

use sitereplay::fixture::{
    BodyKind, CapturedRequest, CapturedResponse, Fixture, FixtureMetadata,
};
use sitereplay::pattern::extract_pattern;

/// Build a GET fixture for `path` with a JSON body
pub fn json_fixture(index: u64, method: &str, path: &str, body: serde_json::Value) -> Fixture {
    let info = extract_pattern(path);
    Fixture {
        id: Fixture::make_id(index, method, &info.pattern),
        request: CapturedRequest {
            method: method.to_string(),
            url: format!("https://site.test{path}"),
            path: path.to_string(),
            pattern: info.pattern,
            path_params: info.path_params,
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        },
        response: CapturedResponse {
            status: 200,
            status_text: "OK".to_string(),
            headers: BTreeMap::from([(
                "content-type".to_string(),
                "application/json".to_string(),
            )]),
            body,
            body_kind: BodyKind::Json,
        },
        metadata: FixtureMetadata {
            captured_at: chrono::Utc::now(),
            response_time_ms: 5,
            source_page_url: "https://site.test/".to_string(),
        },
    }
}
