//! Per-worker page driver.
//!
//! Wraps one `chromiumoxide::Page` with the operations the crawl worker
//! needs: navigation with timeout, incremental auto-scroll, link and
//! bundle harvesting. One page belongs to exactly one worker; pages are
//! never shared.

use anyhow::{Context, Result};
use chromiumoxide::Page;
use std::future::Future;
use std::time::Duration;

use super::js_scripts;

/// Wrap an async page operation with an explicit timeout.
///
/// Prevents indefinite hangs on page operations; the error distinguishes
/// timeouts from operation failures.
pub async fn with_page_timeout<F, T>(
    operation: F,
    timeout: Duration,
    operation_name: &str,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!(
            "{operation_name} timeout after {} ms",
            timeout.as_millis()
        )),
    }
}

/// One worker's handle to its browser page
pub struct PageDriver {
    page: Page,
}

impl PageDriver {
    #[must_use]
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    #[must_use]
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Navigate and wait for the load event, both bounded by `timeout`
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        with_page_timeout(
            async {
                self.page
                    .goto(url)
                    .await
                    .map_err(|e| anyhow::anyhow!("navigation failed: {e}"))?;
                Ok(())
            },
            timeout,
            "Page navigation",
        )
        .await?;

        with_page_timeout(
            async {
                self.page
                    .wait_for_navigation()
                    .await
                    .map_err(|e| anyhow::anyhow!("load wait failed: {e}"))?;
                Ok(())
            },
            timeout,
            "Page load",
        )
        .await
    }

    /// URL the page actually landed on, after any redirects
    pub async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read page URL: {e}"))?
            .context("page has no URL")
    }

    pub async fn title(&self) -> Result<String> {
        self.evaluate_value(js_scripts::TITLE_SCRIPT).await
    }

    /// Serialized DOM as currently rendered
    pub async fn rendered_html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read page content: {e}"))
    }

    /// All absolute link targets found in the document
    pub async fn extract_links(&self) -> Result<Vec<String>> {
        self.evaluate_value(js_scripts::LINKS_SCRIPT).await
    }

    /// JS/CSS bundle URLs referenced by the document
    pub async fn extract_bundle_urls(&self) -> Result<Vec<String>> {
        self.evaluate_value(js_scripts::BUNDLE_URLS_SCRIPT).await
    }

    /// Raw `srcset`/`src` attribute values for responsive asset harvesting
    pub async fn extract_srcset_values(&self) -> Result<Vec<String>> {
        self.evaluate_value(js_scripts::SRCSET_SCRIPT).await
    }

    /// Scroll the document in fixed-size steps until its height stops
    /// growing or `max_scrolls` is reached, then jump back to the top.
    pub async fn auto_scroll(&self, step_px: u64, delay: Duration, max_scrolls: u32) -> Result<()> {
        let script = js_scripts::SCROLL_STEP_SCRIPT.replace("{STEP}", &step_px.to_string());
        let mut last_height: i64 = -1;

        for _ in 0..max_scrolls {
            let height: i64 = self.evaluate_value(&script).await?;
            if height == last_height {
                break;
            }
            last_height = height;
            tokio::time::sleep(delay).await;
        }

        let _: bool = self.evaluate_value(js_scripts::SCROLL_TOP_SCRIPT).await?;
        Ok(())
    }

    async fn evaluate_value<T: serde::de::DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| anyhow::anyhow!("script evaluation failed: {e}"))?
            .into_value()
            .map_err(|e| anyhow::anyhow!("script result deserialization failed: {e}"))
    }
}
