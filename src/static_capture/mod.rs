//! Static resource capture and URL rewriting.
//!
//! Captures the document and every same-origin sub-resource the browser
//! requests (images, CSS, JS, fonts, media, manifests), harvests the
//! responsive URLs the browser did not request (`srcset`, `image-set`),
//! rewrites captured HTML to reference local paths, and records redirects
//! for the replay server.

pub mod srcset;

use anyhow::{Context, Result};
use base64::Engine as _;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::network::{
    EventResponseReceived, GetResponseBodyParams, RequestId, ResourceType,
};
use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::crawl::progress::{ProgressBus, ProgressEvent};
use crate::fixture::{Asset, RedirectRecord};
use crate::materialize::sanitize_rel_path;
use crate::utils::constants::REDIRECT_STATUSES;
use crate::utils::resolve_url;

pub use srcset::{parse_css_urls, parse_image_set_urls, parse_srcset};

/// Shared static-capture state for one session.
///
/// Append-only from event callbacks; the orchestrator reads the collected
/// assets and redirects once at flush time.
pub struct StaticCapturer {
    /// Capture origin (`scheme://host[:port]`); updated once after the
    /// seed redirect resolves
    origin: Mutex<String>,
    static_root: PathBuf,
    assets: DashMap<String, Asset>,
    redirects: Mutex<Vec<RedirectRecord>>,
    client: reqwest::Client,
    progress: ProgressBus,
}

/// Listener task handle for one page
pub struct CapturerGuard {
    task: JoinHandle<()>,
}

impl CapturerGuard {
    pub async fn detach(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

impl StaticCapturer {
    #[must_use]
    pub fn new(
        start_url: &str,
        static_root: PathBuf,
        client: reqwest::Client,
        progress: ProgressBus,
    ) -> Self {
        Self {
            origin: Mutex::new(origin_of(start_url).unwrap_or_default()),
            static_root,
            assets: DashMap::new(),
            redirects: Mutex::new(Vec::new()),
            client,
            progress,
        }
    }

    /// Update the capture origin after the seed redirect resolved
    pub fn set_origin_from(&self, final_url: &str) {
        if let Some(origin) = origin_of(final_url) {
            *self.origin.lock() = origin;
        }
    }

    #[must_use]
    pub fn origin(&self) -> String {
        self.origin.lock().clone()
    }

    /// Collected assets, ordered by local path for deterministic manifests
    #[must_use]
    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self.assets.iter().map(|e| e.value().clone()).collect();
        assets.sort_by(|a, b| a.local_path.cmp(&b.local_path));
        assets
    }

    #[must_use]
    pub fn redirects(&self) -> Vec<RedirectRecord> {
        self.redirects.lock().clone()
    }

    /// Attach the sub-resource listener to a page
    pub async fn attach(self: Arc<Self>, page: &Page) -> Result<CapturerGuard> {
        let mut response_events = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to attach static-capture listener")?;

        let capturer = self;
        let page = page.clone();

        let task = tokio::spawn(async move {
            while let Some(event) = response_events.next().await {
                capturer.handle_response(&page, &event).await;
            }
        });

        Ok(CapturerGuard { task })
    }

    async fn handle_response(&self, page: &Page, event: &EventResponseReceived) {
        let url = event.response.url.clone();
        let status = event.response.status as u16;

        if REDIRECT_STATUSES.contains(&status) {
            self.record_redirect(&url, event);
            return;
        }

        if !is_static_resource(&event.r#type) || !self.is_same_origin(&url) {
            return;
        }
        if !(200..300).contains(&status) {
            return;
        }
        if self.assets.contains_key(&url) {
            return;
        }

        let Some(body) = fetch_body(page, event.request_id.inner()).await else {
            return;
        };

        let mime = event.response.mime_type.clone();
        if let Err(e) = self.store_asset(&url, &body, &mime, false).await {
            tracing::warn!(url, error = %e, "Failed to store asset");
            return;
        }

        // Stylesheets reference further resources the browser may never
        // request at this viewport; harvest them from the raw CSS.
        if event.r#type == ResourceType::Stylesheet
            && let Ok(css) = String::from_utf8(body)
        {
            let mut candidates = parse_image_set_urls(&css);
            candidates.extend(parse_css_urls(&css));
            self.harvest_urls(candidates, &url).await;
        }
    }

    fn record_redirect(&self, url: &str, event: &EventResponseReceived) {
        let Some(location) = header_value(&event.response.headers, "location") else {
            return;
        };
        let Ok(to_abs) = resolve_url(url, &location) else {
            return;
        };

        let from = path_of(url);
        let to = if self.is_same_origin(&to_abs) {
            path_of(&to_abs)
        } else {
            to_abs
        };
        if from == to {
            return;
        }

        let record = RedirectRecord {
            from,
            to,
            status: event.response.status as u16,
        };
        let mut redirects = self.redirects.lock();
        if !redirects.contains(&record) {
            tracing::debug!(from = %record.from, to = %record.to, status = record.status, "Recorded redirect");
            redirects.push(record);
        }
    }

    /// Capture the page document: rewrite same-origin URLs to local paths
    /// and store it as the entrypoint (or a per-path HTML asset for
    /// non-seed pages).
    pub async fn capture_document(&self, html: &str, page_url: &str, entrypoint: bool) -> Result<String> {
        let rewritten = self.rewrite_html(html)?;
        let local_path = self
            .local_path_for(page_url)
            .unwrap_or_else(|| "index.html".to_string());

        self.store_asset_content(
            page_url,
            rewritten.as_bytes(),
            "text/html",
            &local_path,
            entrypoint,
        )
        .await?;
        Ok(local_path)
    }

    /// Resolve and fetch URLs the browser did not request itself
    /// (`srcset` candidates, `image-set` members). Relative URLs resolve
    /// against the enclosing document or stylesheet.
    pub async fn harvest_urls(&self, candidates: Vec<String>, base_url: &str) {
        for candidate in candidates {
            if candidate.starts_with("data:") {
                continue;
            }
            let Ok(absolute) = resolve_url(base_url, &candidate) else {
                continue;
            };
            if !self.is_same_origin(&absolute) || self.assets.contains_key(&absolute) {
                continue;
            }

            match self.client.get(&absolute).send().await {
                Ok(response) if response.status().is_success() => {
                    let mime = response
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("application/octet-stream")
                        .split(';')
                        .next()
                        .unwrap_or_default()
                        .to_string();
                    match response.bytes().await {
                        Ok(bytes) => {
                            if let Err(e) = self.store_asset(&absolute, &bytes, &mime, false).await {
                                tracing::debug!(url = absolute, error = %e, "Harvest store failed");
                            }
                        }
                        Err(e) => tracing::debug!(url = absolute, error = %e, "Harvest read failed"),
                    }
                }
                Ok(response) => {
                    tracing::debug!(url = absolute, status = %response.status(), "Harvest skipped");
                }
                Err(e) => tracing::debug!(url = absolute, error = %e, "Harvest fetch failed"),
            }
        }
    }

    /// Rewrite same-origin absolute URLs in a document to root-relative
    /// local paths.
    pub fn rewrite_html(&self, html: &str) -> Result<String> {
        use lol_html::{HtmlRewriter, Settings, element};

        let origin = self.origin();
        let mut output = Vec::with_capacity(html.len());

        let url_attrs: &[(&str, &str)] = &[
            ("a[href]", "href"),
            ("link[href]", "href"),
            ("script[src]", "src"),
            ("img[src]", "src"),
            ("source[src]", "src"),
            ("video[src]", "src"),
            ("video[poster]", "poster"),
            ("audio[src]", "src"),
            ("iframe[src]", "src"),
        ];

        let mut handlers = Vec::new();
        for (selector, attr) in url_attrs {
            let origin = origin.clone();
            let attr = (*attr).to_string();
            handlers.push(element!(selector, move |el| {
                if let Some(value) = el.get_attribute(&attr)
                    && let Some(local) = localize_url(&value, &origin)
                {
                    el.set_attribute(&attr, &local)?;
                }
                Ok(())
            }));
        }
        for selector in ["img[srcset]", "source[srcset]"] {
            let origin = origin.clone();
            handlers.push(element!(selector, move |el| {
                if let Some(value) = el.get_attribute("srcset") {
                    let rewritten = localize_srcset(&value, &origin);
                    el.set_attribute("srcset", &rewritten)?;
                }
                Ok(())
            }));
        }

        let mut rewriter = HtmlRewriter::new(
            Settings {
                element_content_handlers: handlers,
                ..Settings::default()
            },
            |chunk: &[u8]| output.extend_from_slice(chunk),
        );
        rewriter
            .write(html.as_bytes())
            .context("HTML rewrite failed")?;
        rewriter.end().context("HTML rewrite failed")?;

        String::from_utf8(output).context("Rewritten HTML is not UTF-8")
    }

    /// Local path (relative to the static root) an asset URL maps to
    #[must_use]
    pub fn local_path_for(&self, url: &str) -> Option<String> {
        let parsed = url::Url::parse(url).ok()?;
        let raw_path = parsed.path();
        let needs_index = raw_path.ends_with('/') || raw_path.is_empty();
        let mut rel = sanitize_rel_path(raw_path).unwrap_or_default();
        if needs_index || rel.is_empty() {
            if !rel.is_empty() {
                rel.push('/');
            }
            rel.push_str("index.html");
        }
        Some(rel)
    }

    fn is_same_origin(&self, url: &str) -> bool {
        origin_of(url).is_some_and(|o| o == *self.origin.lock())
    }

    async fn store_asset(&self, url: &str, body: &[u8], mime: &str, entrypoint: bool) -> Result<()> {
        let Some(local_path) = self.local_path_for(url) else {
            return Ok(());
        };
        self.store_asset_content(url, body, mime, &local_path, entrypoint)
            .await
    }

    async fn store_asset_content(
        &self,
        url: &str,
        body: &[u8],
        mime: &str,
        local_path: &str,
        entrypoint: bool,
    ) -> Result<()> {
        let dest = self.static_root.join(local_path);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&dest, body)
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        let asset = Asset {
            url: url.to_string(),
            local_path: local_path.to_string(),
            content_type: mime.to_string(),
            size: body.len() as u64,
            is_entrypoint: entrypoint,
        };
        self.progress.publish(ProgressEvent::asset_capture(
            asset.url.clone(),
            asset.local_path.clone(),
            asset.size,
        ));
        self.assets.insert(url.to_string(), asset);
        Ok(())
    }
}

fn is_static_resource(resource_type: &ResourceType) -> bool {
    matches!(
        resource_type,
        ResourceType::Document
            | ResourceType::Stylesheet
            | ResourceType::Script
            | ResourceType::Image
            | ResourceType::Font
            | ResourceType::Media
            | ResourceType::Manifest
            | ResourceType::TextTrack
    )
}

async fn fetch_body(page: &Page, request_id: &str) -> Option<Vec<u8>> {
    let params = GetResponseBodyParams::new(RequestId::new(request_id.to_string()));
    match page.execute(params).await {
        Ok(response) => {
            let returns = response.result;
            if returns.base64_encoded {
                base64::engine::general_purpose::STANDARD
                    .decode(returns.body.as_bytes())
                    .ok()
            } else {
                Some(returns.body.into_bytes())
            }
        }
        Err(e) => {
            tracing::debug!(request_id, error = %e, "Asset body unavailable");
            None
        }
    }
}

fn header_value(
    headers: &chromiumoxide::cdp::browser_protocol::network::Headers,
    name: &str,
) -> Option<String> {
    headers.inner().as_object().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string)
    })
}

/// `scheme://host[:port]` of a URL, lowercased, default ports removed
fn origin_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    let scheme = parsed.scheme();
    match parsed.port() {
        Some(80) if scheme == "http" => Some(format!("{scheme}://{host}")),
        Some(443) if scheme == "https" => Some(format!("{scheme}://{host}")),
        Some(port) => Some(format!("{scheme}://{host}:{port}")),
        None => Some(format!("{scheme}://{host}")),
    }
}

fn path_of(url: &str) -> String {
    url::Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| url.to_string())
}

/// Rewrite an absolute same-origin URL to a root-relative path; returns
/// `None` for anything that should stay untouched.
fn localize_url(value: &str, origin: &str) -> Option<String> {
    if origin.is_empty() || value.starts_with("data:") {
        return None;
    }

    let absolute = if let Some(rest) = value.strip_prefix("//") {
        // Protocol-relative: borrow the origin's scheme
        let scheme = origin.split("://").next().unwrap_or("https");
        format!("{scheme}://{rest}")
    } else if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        return None;
    };

    if origin_of(&absolute)? != origin {
        return None;
    }

    let parsed = url::Url::parse(&absolute).ok()?;
    let mut local = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        local.push('?');
        local.push_str(query);
    }
    Some(local)
}

/// Rewrite every candidate URL in a `srcset` value, preserving descriptors
fn localize_srcset(value: &str, origin: &str) -> String {
    value
        .split(',')
        .map(|candidate| {
            let candidate = candidate.trim();
            let mut parts = candidate.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or_default();
            let descriptor = parts.next();
            let localized = localize_url(url, origin).unwrap_or_else(|| url.to_string());
            match descriptor {
                Some(d) => format!("{localized} {d}"),
                None => localized,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capturer() -> StaticCapturer {
        StaticCapturer::new(
            "https://site.test/app/",
            std::env::temp_dir().join("sitereplay-test-static"),
            reqwest::Client::new(),
            ProgressBus::default(),
        )
    }

    #[test]
    fn origin_derivation_removes_default_ports() {
        assert_eq!(
            origin_of("https://Site.test:443/x").as_deref(),
            Some("https://site.test")
        );
        assert_eq!(
            origin_of("http://site.test:8080/x").as_deref(),
            Some("http://site.test:8080")
        );
    }

    #[test]
    fn localize_rewrites_same_origin_only() {
        assert_eq!(
            localize_url("https://site.test/assets/app.js", "https://site.test").as_deref(),
            Some("/assets/app.js")
        );
        assert_eq!(
            localize_url("https://cdn.other.test/lib.js", "https://site.test"),
            None
        );
        assert_eq!(localize_url("/already/relative.js", "https://site.test"), None);
        assert_eq!(
            localize_url("//site.test/img/a.png", "https://site.test").as_deref(),
            Some("/img/a.png")
        );
    }

    #[test]
    fn srcset_rewrite_preserves_descriptors() {
        let rewritten = localize_srcset(
            "https://site.test/i/a.png 1x, https://site.test/i/a@2x.png 2x",
            "https://site.test",
        );
        assert_eq!(rewritten, "/i/a.png 1x, /i/a@2x.png 2x");
    }

    #[test]
    fn html_rewrite_localizes_matching_origins() {
        let capturer = capturer();
        capturer.set_origin_from("https://site.test/");
        let html = r#"<html><head>
            <script src="https://site.test/static/app.js"></script>
            <link rel="stylesheet" href="https://other.test/ext.css">
        </head><body>
            <img src="https://site.test/img/logo.png" srcset="https://site.test/img/logo.png 1x, https://site.test/img/logo@2x.png 2x">
        </body></html>"#;

        let out = capturer.rewrite_html(html).unwrap();
        assert!(out.contains(r#"src="/static/app.js""#));
        assert!(out.contains(r#"href="https://other.test/ext.css""#));
        assert!(out.contains(r#"srcset="/img/logo.png 1x, /img/logo@2x.png 2x""#));
    }

    #[test]
    fn local_path_derivation() {
        let capturer = capturer();
        assert_eq!(
            capturer.local_path_for("https://site.test/assets/app.js").as_deref(),
            Some("assets/app.js")
        );
        assert_eq!(
            capturer.local_path_for("https://site.test/").as_deref(),
            Some("index.html")
        );
        assert_eq!(
            capturer.local_path_for("https://site.test/docs/").as_deref(),
            Some("docs/index.html")
        );
    }
}
