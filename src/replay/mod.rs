//! Fixture replay server.
//!
//! Serves a captured site from its `_server/` directory: captured
//! redirects first, then fixture matching, then static files with SPA
//! fallback, then a diagnostic 404. Optional request logging, CORS, and
//! artificial delay wrap the whole chain in a fixed order.

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use rand::Rng as _;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::fixture::{BodyKind, Fixture, FixtureMatcher, FixtureStore};
use crate::manifest::{DelaySettings, FIXTURES_DIR, Manifest, STATIC_DIR};
use crate::materialize::sanitize_rel_path;

/// Runtime options layered over the manifest's server defaults
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Override the manifest's default port
    pub port: Option<u16>,
    /// Override the manifest's CORS setting
    pub cors: Option<bool>,
    /// Override the manifest's delay settings
    pub delay: Option<DelaySettings>,
    /// Log each request at info level
    pub log_requests: bool,
}

struct ReplayState {
    manifest: Manifest,
    matcher: FixtureMatcher,
    static_root: PathBuf,
    delay: DelaySettings,
}

/// HTTP server replaying a captured site
pub struct ReplayServer {
    state: Arc<ReplayState>,
    cors: bool,
    log_requests: bool,
    port: u16,
}

impl ReplayServer {
    /// Load the manifest and all fixtures from a capture's `_server/`
    /// directory.
    pub async fn load(server_dir: &Path, options: ReplayOptions) -> Result<Self> {
        let manifest = Manifest::load(server_dir)
            .await
            .context("Failed to load capture manifest")?;

        let store = FixtureStore::new(server_dir.join(FIXTURES_DIR));
        let fixtures = store
            .load_all()
            .await
            .context("Failed to load fixtures")?;
        tracing::info!(
            fixtures = fixtures.len(),
            name = %manifest.name,
            "Replay server loaded capture"
        );

        let matcher = FixtureMatcher::new(fixtures);
        let port = options.port.unwrap_or(manifest.server.default_port);
        let cors = options.cors.unwrap_or(manifest.server.cors);
        let delay = options
            .delay
            .clone()
            .unwrap_or_else(|| manifest.server.delay.clone());

        Ok(Self {
            state: Arc::new(ReplayState {
                static_root: server_dir.join(STATIC_DIR),
                matcher,
                delay,
                manifest,
            }),
            cors,
            log_requests: options.log_requests,
            port,
        })
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build the router with the fixed middleware order: logger, CORS,
    /// delay, then the replay chain.
    #[must_use]
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .fallback(handle_request)
            .with_state(Arc::clone(&self.state));

        if self.state.delay.enabled {
            router = router.layer(middleware::from_fn_with_state(
                Arc::clone(&self.state),
                delay_middleware,
            ));
        }
        if self.cors {
            router = router.layer(CorsLayer::permissive());
        }
        if self.log_requests {
            router = router.layer(middleware::from_fn(log_middleware));
        }
        router
    }

    /// Bind and serve until the task is aborted; returns the bound
    /// address and the serving task.
    pub async fn spawn(self) -> Result<(SocketAddr, JoinHandle<()>)> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                tracing::error!(error = %e, "Replay server stopped");
            }
        });

        tracing::info!(addr = %local_addr, "Replay server listening");
        Ok((local_addr, task))
    }

    /// Serve on the configured port until the process exits
    pub async fn serve(self) -> Result<()> {
        let (_, task) = self.spawn().await?;
        task.await.context("Replay server task failed")
    }
}

async fn log_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;
    tracing::info!(%method, path, status = response.status().as_u16(), "request");
    response
}

async fn delay_middleware(
    State(state): State<Arc<ReplayState>>,
    request: Request,
    next: Next,
) -> Response {
    let DelaySettings { min_ms, max_ms, .. } = state.delay;
    let wait_ms = if max_ms > min_ms {
        rand::rng().random_range(min_ms..=max_ms)
    } else {
        min_ms
    };
    if wait_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(wait_ms)).await;
    }
    next.run(request).await
}

/// The replay chain: redirects → root prefix → fixtures → static → 404
async fn handle_request(State(state): State<Arc<ReplayState>>, request: Request) -> Response {
    let mut response = replay_chain(&state, request).await;
    // Every response from this server is marked as mocked
    response
        .headers_mut()
        .insert("x-mock-server", HeaderValue::from_static("true"));
    response
}

async fn replay_chain(state: &ReplayState, request: Request) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();

    // Captured redirects replay verbatim
    if let Some(redirects) = &state.manifest.redirects
        && let Some(redirect) = redirects
            .iter()
            .find(|r| r.from == path && r.from != r.to)
    {
        return redirect_response(redirect.status, &redirect.to);
    }

    // Captures of sub-path sites answer `/` with a hop to the prefix
    if path == "/"
        && let Some(prefix) = &state.manifest.static_info.path_prefix
        && prefix != "/"
    {
        return redirect_response(302, prefix);
    }

    if let Some(hit) = state.matcher.find(&method, &path) {
        return fixture_response(&hit.fixture);
    }

    if state.manifest.static_info.enabled {
        if let Some(response) = serve_static(&state.static_root, &path).await {
            return response;
        }
        // SPA fallback: unknown GET paths get the entrypoint
        if method == "GET"
            && let Some(response) =
                serve_static(&state.static_root, &state.manifest.static_info.entrypoint).await
        {
            return response;
        }
    }

    not_found(&method, &path)
}

fn redirect_response(status: u16, location: &str) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::FOUND);
    let mut response = Response::builder().status(status);
    if let Ok(value) = HeaderValue::from_str(location) {
        response = response.header(header::LOCATION, value);
    }
    response
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// Build the HTTP response for a matched fixture: captured status and
/// headers (minus transport framing), the marker headers, and the body
/// re-encoded per its kind.
fn fixture_response(fixture: &Fixture) -> Response {
    let status = StatusCode::from_u16(fixture.response.status).unwrap_or(StatusCode::OK);
    let mut builder = Response::builder().status(status);

    for (name, value) in &fixture.response.headers {
        // Framing headers would contradict the re-encoded body
        if matches!(
            name.as_str(),
            "content-encoding" | "transfer-encoding" | "content-length"
        ) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name.as_str()),
            HeaderValue::from_str(value),
        ) {
            builder = builder.header(name, value);
        }
    }

    builder = builder.header("x-fixture-id", fixture.id.as_str());

    let body = match fixture.response.body_kind {
        BodyKind::Json => {
            builder = ensure_content_type(builder, "application/json");
            serde_json::to_vec(&fixture.response.body).unwrap_or_default()
        }
        BodyKind::Text | BodyKind::Binary => fixture
            .response
            .body
            .as_str()
            .map(|s| s.as_bytes().to_vec())
            .unwrap_or_default(),
    };

    builder
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

fn ensure_content_type(
    builder: axum::http::response::Builder,
    content_type: &str,
) -> axum::http::response::Builder {
    let has_content_type = builder
        .headers_ref()
        .is_some_and(|h| h.contains_key(header::CONTENT_TYPE));
    if has_content_type {
        builder
    } else {
        builder.header(header::CONTENT_TYPE, content_type)
    }
}

async fn serve_static(static_root: &Path, path: &str) -> Option<Response> {
    let mut rel = sanitize_rel_path(path)?;
    if path.ends_with('/') {
        rel = format!("{rel}/index.html");
    }

    let mut file_path = static_root.join(&rel);
    if tokio::fs::metadata(&file_path).await.ok()?.is_dir() {
        file_path = file_path.join("index.html");
    }

    let bytes = tokio::fs::read(&file_path).await.ok()?;
    let content_type = content_type_for(&file_path);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .body(Body::from(bytes))
        .ok()
}

fn not_found(method: &str, path: &str) -> Response {
    let body = serde_json::json!({
        "error": "not_found",
        "message": format!("No fixture or static file matches {method} {path}"),
        "hint": "Check the fixture index (_server/fixtures/_index.json) for captured patterns",
    });
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Minimal extension-based content-type lookup for static serving.
///
/// Captured assets carry their real content type in the manifest; this
/// fallback only needs to cover what a web root plausibly holds.
fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") | Some("mjs") => "text/javascript",
        Some("json") | Some("map") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("txt") => "text/plain; charset=utf-8",
        Some("xml") => "application/xml",
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_cover_web_roots() {
        assert_eq!(
            content_type_for(Path::new("a/index.html")),
            "text/html; charset=utf-8"
        );
        assert_eq!(content_type_for(Path::new("app.js")), "text/javascript");
        assert_eq!(content_type_for(Path::new("x.bin")), "application/octet-stream");
    }

    #[test]
    fn not_found_body_is_diagnostic_json() {
        let response = not_found("GET", "/missing");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
