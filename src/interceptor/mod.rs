//! Per-page XHR/fetch interception.
//!
//! Each crawl worker attaches one interceptor to its page. CDP network
//! events stream into two spawned tasks: request events populate a pending
//! map keyed by `url + method`, response events complete the pair into a
//! `Fixture`. Fixture indexes are assigned at capture-completion time, so
//! id order reflects the order responses finished, not the order requests
//! started.

use anyhow::{Context, Result};
use base64::Engine as _;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EventRequestWillBeSent, EventResponseReceived, GetResponseBodyParams, Headers, ResourceType,
};
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::CaptureConfig;
use crate::crawl::progress::{ProgressBus, ProgressEvent};
use crate::fixture::{
    BodyKind, CapturedRequest, CapturedResponse, Fixture, FixtureMetadata, binary_body_marker,
};
use crate::pattern::extract_pattern;
use crate::utils::constants::HEADER_DENYLIST;

/// Shared clock of the last XHR/fetch request start.
///
/// The crawl worker polls this to decide when a page has gone
/// network-idle.
#[derive(Clone)]
pub struct NetworkActivity {
    last: Arc<Mutex<Instant>>,
}

impl NetworkActivity {
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for NetworkActivity {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait until no XHR/fetch has started for `idle_time`, bounded by
/// `timeout` overall.
pub async fn wait_for_network_idle(activity: &NetworkActivity, idle_time: Duration, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        if activity.idle_for() >= idle_time {
            return;
        }
        if Instant::now() >= deadline {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

struct PendingRequest {
    method: String,
    url: String,
    headers: BTreeMap<String, String>,
    post_data: Option<String>,
    started: Instant,
}

/// Shared fixture sink for one capture session.
///
/// Workers append from event callbacks; dedup and priority sorting happen
/// once at flush time.
#[derive(Clone, Default)]
pub struct FixtureSink {
    fixtures: Arc<Mutex<Vec<Fixture>>>,
    next_index: Arc<AtomicU64>,
}

impl FixtureSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self) -> u64 {
        self.next_index.fetch_add(1, Ordering::SeqCst)
    }

    fn push(&self, fixture: Fixture) {
        self.fixtures.lock().push(fixture);
    }

    /// Drain all captured fixtures, in capture-completion order
    #[must_use]
    pub fn drain(&self) -> Vec<Fixture> {
        std::mem::take(&mut *self.fixtures.lock())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fixtures.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixtures.lock().is_empty()
    }
}

/// Per-page API observer
pub struct ApiInterceptor {
    filters: Arc<Vec<regex::Regex>>,
    capture_bodies: bool,
    max_body_size: usize,
    sink: FixtureSink,
    activity: NetworkActivity,
    progress: ProgressBus,
}

/// Handles for the listener tasks attached to one page; aborted when the
/// page is done
pub struct InterceptorGuard {
    tasks: Vec<JoinHandle<()>>,
}

impl InterceptorGuard {
    /// Stop the listener tasks and wait for them to wind down
    pub async fn detach(self) {
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
    }
}

impl ApiInterceptor {
    #[must_use]
    pub fn new(
        config: &CaptureConfig,
        sink: FixtureSink,
        activity: NetworkActivity,
        progress: ProgressBus,
    ) -> Self {
        Self {
            filters: Arc::new(config.api_filter_compiled().to_vec()),
            capture_bodies: config.capture_bodies(),
            max_body_size: config.max_body_size(),
            sink,
            activity,
            progress,
        }
    }

    /// Attach request/response listeners to a page.
    ///
    /// `source_page_url` is recorded into every fixture captured while
    /// these listeners are live.
    pub async fn attach(&self, page: &Page, source_page_url: String) -> Result<InterceptorGuard> {
        let pending: Arc<DashMap<String, PendingRequest>> = Arc::new(DashMap::new());
        let inflight: Arc<DashMap<String, String>> = Arc::new(DashMap::new());

        let mut request_events = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("Failed to attach request listener")?;
        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to attach response listener")?;

        let request_task = {
            let pending = Arc::clone(&pending);
            let inflight = Arc::clone(&inflight);
            let filters = Arc::clone(&self.filters);
            let activity = self.activity.clone();

            tokio::spawn(async move {
                while let Some(event) = request_events.next().await {
                    if !is_api_resource(event.r#type.as_ref()) {
                        continue;
                    }
                    activity.touch();

                    let url = event.request.url.clone();
                    if !matches_any(&filters, &url) {
                        continue;
                    }

                    let method = event.request.method.to_uppercase();
                    let key = pending_key(&url, &method);
                    inflight.insert(event.request_id.inner().clone(), key.clone());
                    pending.insert(
                        key,
                        PendingRequest {
                            method,
                            url,
                            headers: filter_headers(&event.request.headers),
                            post_data: event.request.post_data.clone(),
                            started: Instant::now(),
                        },
                    );
                }
            })
        };

        let response_task = {
            let pending = Arc::clone(&pending);
            let inflight = Arc::clone(&inflight);
            let page = page.clone();
            let sink = self.sink.clone();
            let progress = self.progress.clone();
            let capture_bodies = self.capture_bodies;
            let max_body_size = self.max_body_size;
            let source_page_url = source_page_url.clone();

            tokio::spawn(async move {
                while let Some(event) = response_events.next().await {
                    if !matches!(event.r#type, ResourceType::Xhr | ResourceType::Fetch) {
                        continue;
                    }

                    let request_id = event.request_id.inner().clone();
                    let Some((_, key)) = inflight.remove(&request_id) else {
                        continue;
                    };
                    let Some((_, pending_req)) = pending.remove(&key) else {
                        continue;
                    };

                    let elapsed_ms = pending_req.started.elapsed().as_millis() as u64;
                    let content_type = header_value(&event.response.headers, "content-type");

                    let (body, body_kind) = if capture_bodies {
                        let raw = fetch_response_body(&page, &request_id).await;
                        parse_body(raw, content_type.as_deref(), max_body_size)
                    } else {
                        (serde_json::Value::Null, BodyKind::Text)
                    };

                    let fixture = build_fixture(
                        sink.next_index(),
                        &pending_req,
                        &event,
                        body,
                        body_kind,
                        elapsed_ms,
                        &source_page_url,
                    );

                    progress.publish(ProgressEvent::api_capture(
                        fixture.id.clone(),
                        fixture.request.method.clone(),
                        fixture.request.pattern.clone(),
                        fixture.response.status,
                    ));
                    tracing::debug!(
                        id = %fixture.id,
                        url = %fixture.request.url,
                        status = fixture.response.status,
                        "Captured API fixture"
                    );
                    sink.push(fixture);
                }
            })
        };

        Ok(InterceptorGuard {
            tasks: vec![request_task, response_task],
        })
    }
}

fn is_api_resource(resource_type: Option<&ResourceType>) -> bool {
    matches!(resource_type, Some(ResourceType::Xhr | ResourceType::Fetch))
}

fn matches_any(filters: &[regex::Regex], url: &str) -> bool {
    // An empty filter list means capture everything XHR-shaped
    filters.is_empty() || filters.iter().any(|re| re.is_match(url))
}

fn pending_key(url: &str, method: &str) -> String {
    format!("{url} {method}")
}

/// Raw response body plus whether CDP base64-encoded it
struct RawBody {
    bytes: Vec<u8>,
    was_base64: bool,
}

async fn fetch_response_body(page: &Page, request_id: &str) -> Option<RawBody> {
    use chromiumoxide::cdp::browser_protocol::network::RequestId;

    let params = GetResponseBodyParams::new(RequestId::new(request_id.to_string()));
    match page.execute(params).await {
        Ok(response) => {
            let returns = response.result;
            let bytes = if returns.base64_encoded {
                base64::engine::general_purpose::STANDARD
                    .decode(returns.body.as_bytes())
                    .unwrap_or_default()
            } else {
                returns.body.into_bytes()
            };
            Some(RawBody {
                bytes,
                was_base64: returns.base64_encoded,
            })
        }
        Err(e) => {
            tracing::debug!(request_id, error = %e, "Response body unavailable");
            None
        }
    }
}

/// Classify and parse a response body by content type.
///
/// JSON parses or falls back to text; textual types stay text; everything
/// else (and anything over the size budget) becomes a binary marker with
/// the byte length.
fn parse_body(
    raw: Option<RawBody>,
    content_type: Option<&str>,
    max_body_size: usize,
) -> (serde_json::Value, BodyKind) {
    let Some(raw) = raw else {
        return (serde_json::Value::Null, BodyKind::Text);
    };

    if raw.bytes.len() > max_body_size {
        return (
            serde_json::Value::String(binary_body_marker(raw.bytes.len())),
            BodyKind::Binary,
        );
    }

    let ct = content_type.unwrap_or("").to_ascii_lowercase();
    let is_json = ct.contains("json");
    let is_text = ct.starts_with("text/")
        || ct.contains("xml")
        || ct.contains("javascript")
        || ct.contains("urlencoded");

    if is_json {
        if let Ok(text) = String::from_utf8(raw.bytes.clone()) {
            return match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value) => (value, BodyKind::Json),
                Err(_) => (serde_json::Value::String(text), BodyKind::Text),
            };
        }
    } else if is_text || !raw.was_base64 {
        if let Ok(text) = String::from_utf8(raw.bytes.clone()) {
            return (serde_json::Value::String(text), BodyKind::Text);
        }
    }

    (
        serde_json::Value::String(binary_body_marker(raw.bytes.len())),
        BodyKind::Binary,
    )
}

/// Headers from a CDP `Headers` object, lowercased and filtered against
/// the denylist
fn filter_headers(headers: &Headers) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(map) = headers.inner().as_object() {
        for (name, value) in map {
            let name_lower = name.to_ascii_lowercase();
            if HEADER_DENYLIST.contains(&name_lower.as_str()) {
                continue;
            }
            if let Some(value) = value.as_str() {
                out.insert(name_lower, value.to_string());
            }
        }
    }
    out
}

fn header_value(headers: &Headers, name: &str) -> Option<String> {
    headers.inner().as_object().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string)
    })
}

fn build_fixture(
    index: u64,
    pending: &PendingRequest,
    event: &EventResponseReceived,
    body: serde_json::Value,
    body_kind: BodyKind,
    elapsed_ms: u64,
    source_page_url: &str,
) -> Fixture {
    let (path, query) = split_url(&pending.url);
    let info = extract_pattern(&path);

    let request_body = pending.post_data.as_ref().map(|data| {
        serde_json::from_str::<serde_json::Value>(data)
            .unwrap_or_else(|_| serde_json::Value::String(data.clone()))
    });

    Fixture {
        id: Fixture::make_id(index, &pending.method, &info.pattern),
        request: CapturedRequest {
            method: pending.method.clone(),
            url: pending.url.clone(),
            path,
            pattern: info.pattern,
            path_params: info.path_params,
            query,
            headers: pending.headers.clone(),
            body: request_body,
        },
        response: CapturedResponse {
            status: event.response.status as u16,
            status_text: event.response.status_text.clone(),
            headers: filter_headers(&event.response.headers),
            body,
            body_kind,
        },
        metadata: FixtureMetadata {
            captured_at: chrono::Utc::now(),
            response_time_ms: elapsed_ms,
            source_page_url: source_page_url.to_string(),
        },
    }
}

/// Split a URL into its path and a query map (last value wins per key)
fn split_url(url: &str) -> (String, BTreeMap<String, String>) {
    match url::Url::parse(url) {
        Ok(parsed) => {
            let query = parsed
                .query_pairs()
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            (parsed.path().to_string(), query)
        }
        Err(_) => (url.to_string(), BTreeMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_body_json_or_text_fallback() {
        let raw = RawBody {
            bytes: br#"{"ok":true}"#.to_vec(),
            was_base64: false,
        };
        let (value, kind) = parse_body(Some(raw), Some("application/json"), 1024);
        assert_eq!(kind, BodyKind::Json);
        assert_eq!(value["ok"], serde_json::Value::Bool(true));

        let raw = RawBody {
            bytes: b"not json at all".to_vec(),
            was_base64: false,
        };
        let (value, kind) = parse_body(Some(raw), Some("application/json"), 1024);
        assert_eq!(kind, BodyKind::Text);
        assert_eq!(value, serde_json::Value::String("not json at all".to_string()));
    }

    #[test]
    fn parse_body_binary_marker_includes_length() {
        let raw = RawBody {
            bytes: vec![0u8; 64],
            was_base64: true,
        };
        let (value, kind) = parse_body(Some(raw), Some("image/png"), 1024);
        assert_eq!(kind, BodyKind::Binary);
        assert_eq!(value, serde_json::Value::String("<binary 64 bytes>".to_string()));
    }

    #[test]
    fn oversized_body_is_dropped_to_marker() {
        let raw = RawBody {
            bytes: vec![b'a'; 2048],
            was_base64: false,
        };
        let (value, kind) = parse_body(Some(raw), Some("application/json"), 1024);
        assert_eq!(kind, BodyKind::Binary);
        assert_eq!(value, serde_json::Value::String("<binary 2048 bytes>".to_string()));
    }

    #[test]
    fn split_url_separates_path_and_query() {
        let (path, query) = split_url("https://x.test/api/users/7?expand=profile&page=2");
        assert_eq!(path, "/api/users/7");
        assert_eq!(query.get("expand").unwrap(), "profile");
        assert_eq!(query.get("page").unwrap(), "2");
    }

    #[test]
    fn glob_filters_select_urls() {
        let filters =
            vec![crate::utils::glob_to_regex("https://x.test/api/**").unwrap()];
        assert!(matches_any(&filters, "https://x.test/api/users/1"));
        assert!(!matches_any(&filters, "https://x.test/assets/logo.png"));
        assert!(matches_any(&[], "anything"));
    }

    #[tokio::test]
    async fn network_activity_tracks_idle_time() {
        let activity = NetworkActivity::new();
        activity.touch();
        assert!(activity.idle_for() < Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(activity.idle_for() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn idle_wait_respects_overall_timeout() {
        let activity = NetworkActivity::new();
        let started = Instant::now();
        // Activity keeps getting touched, so only the timeout can end the wait
        let toucher = {
            let activity = activity.clone();
            tokio::spawn(async move {
                loop {
                    activity.touch();
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
        };

        wait_for_network_idle(
            &activity,
            Duration::from_secs(5),
            Duration::from_millis(120),
        )
        .await;
        assert!(started.elapsed() < Duration::from_secs(2));
        toucher.abort();
    }
}
