//! Captured request/response model.
//!
//! A `Fixture` is one captured API exchange, persisted as a standalone
//! JSON file and replayed by the mock server. Fixtures are created during
//! capture and never mutated afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a response body is represented inside a fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BodyKind {
    Json,
    Text,
    Binary,
}

/// The request half of a captured exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub method: String,
    /// Original URL as observed on the wire
    pub url: String,
    /// Path component, query stripped
    pub path: String,
    /// Parameterized form of `path`; deterministic from `path`
    pub pattern: String,
    pub path_params: Vec<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    /// Headers surviving the denylist filter
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Request body: parsed JSON when possible, raw text otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

/// The response half of a captured exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedResponse {
    pub status: u16,
    pub status_text: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Parsed JSON, raw text, or a binary marker string per `body_kind`
    pub body: serde_json::Value,
    #[serde(rename = "bodyType")]
    pub body_kind: BodyKind,
}

/// Capture provenance for one fixture
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureMetadata {
    pub captured_at: DateTime<Utc>,
    pub response_time_ms: u64,
    /// Page that triggered the request
    pub source_page_url: String,
}

/// One captured request/response pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    /// Opaque id of the form `NNNN_METHOD_pattern`, assigned in
    /// capture-completion order
    pub id: String,
    pub request: CapturedRequest,
    pub response: CapturedResponse,
    pub metadata: FixtureMetadata,
}

impl Fixture {
    /// Build the canonical fixture id from its capture index
    #[must_use]
    pub fn make_id(index: u64, method: &str, pattern: &str) -> String {
        let slug: String = pattern
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("{index:04}_{}_{}", method.to_uppercase(), slug.trim_matches('_'))
    }

    /// File name this fixture is persisted under
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.json", self.id)
    }
}

/// Marker string used for bodies that are not representable as UTF-8
#[must_use]
pub fn binary_body_marker(byte_len: usize) -> String {
    format!("<binary {byte_len} bytes>")
}

/// A captured static resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub url: String,
    /// Location relative to the static root
    pub local_path: String,
    pub content_type: String,
    pub size: u64,
    /// Whether this asset is the document served for `/`
    #[serde(default)]
    pub is_entrypoint: bool,
}

/// A redirect observed during capture, replayed verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedirectRecord {
    pub from: String,
    pub to: String,
    /// One of 301, 302, 303, 307, 308
    pub status: u16,
}
