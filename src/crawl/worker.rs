//! Crawl worker: one logical worker per browser page.
//!
//! Each worker loops over the shared queue until it drains: take an item,
//! drive the page through its lifecycle (navigate → network-idle → scroll
//! → settle → extract), then report success or hand the item back for
//! retry with exponential backoff. The only shared mutable state is the
//! queue itself and a small first-page record.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::progress::{LifecycleStage, PagePhase, ProgressBus, ProgressEvent};
use super::queue::{CrawlQueue, QueueItem};
use crate::browser::PageDriver;
use crate::config::CaptureConfig;
use crate::interceptor::{ApiInterceptor, FixtureSink, NetworkActivity, wait_for_network_idle};
use crate::state::{StateManager, WalEventPayload};
use crate::state::types::DiscoveredUrl;
use crate::static_capture::StaticCapturer;
use crate::utils::{normalize_url, same_origin};

/// Exponential retry backoff: `min(base * 2^retries, cap)`
#[must_use]
pub fn backoff_delay(base_ms: u64, cap_ms: u64, retries: u32) -> Duration {
    let factor = 1u64.checked_shl(retries.min(32)).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(factor).min(cap_ms))
}

/// First-page coordination between workers.
///
/// Whichever worker finishes the seed first records the final URL (the
/// seed may redirect) and captures the entry document; everyone else
/// skips that work.
pub struct SharedCrawlState {
    first_page_handled: AtomicBool,
    final_url: parking_lot::Mutex<Option<String>>,
}

impl SharedCrawlState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            first_page_handled: AtomicBool::new(false),
            final_url: parking_lot::Mutex::new(None),
        }
    }

    /// Claim first-page handling; true for exactly one caller
    fn claim_first_page(&self) -> bool {
        !self.first_page_handled.swap(true, Ordering::SeqCst)
    }

    fn set_final_url(&self, url: String) {
        *self.final_url.lock() = Some(url);
    }

    #[must_use]
    pub fn final_url(&self) -> Option<String> {
        self.final_url.lock().clone()
    }
}

impl Default for SharedCrawlState {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one worker needs, cloned per worker
#[derive(Clone)]
pub struct WorkerContext {
    pub worker_id: usize,
    pub browser: Arc<Browser>,
    pub queue: Arc<CrawlQueue>,
    pub config: Arc<CaptureConfig>,
    pub progress: ProgressBus,
    pub state: Arc<StateManager>,
    pub sink: FixtureSink,
    pub capturer: Arc<StaticCapturer>,
    pub shared: Arc<SharedCrawlState>,
    pub cancel: CancellationToken,
}

/// Run one worker until the queue drains or the session is cancelled
pub async fn run_worker(ctx: WorkerContext) -> Result<()> {
    loop {
        if ctx.cancel.is_cancelled() || ctx.queue.is_done() {
            break;
        }

        let item = match ctx.queue.take() {
            Some(item) => item,
            None => {
                // Queue is momentarily empty while other workers are
                // mid-page; their link discoveries may refill it.
                if ctx.queue.is_done() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };

        let rate_delay = ctx.config.rate_limit_delay();
        if !rate_delay.is_zero() {
            tokio::time::sleep(rate_delay).await;
        }

        if let Err(e) = ctx.state.append(WalEventPayload::CapturePageStarted {
            url: item.url.clone(),
            depth: item.depth,
        }) {
            tracing::warn!(error = %e, "Failed to journal page start");
        }

        match process_page(&ctx, &item).await {
            Ok(links_added) => {
                ctx.queue.complete(&item.url);
                if let Err(e) = ctx.state.append(WalEventPayload::CapturePageCompleted {
                    url: item.url.clone(),
                }) {
                    tracing::warn!(error = %e, "Failed to journal page completion");
                }
                ctx.progress
                    .publish(ProgressEvent::page_progress(&item.url, PagePhase::Completed));
                tracing::info!(
                    worker = ctx.worker_id,
                    url = %item.url,
                    depth = item.depth,
                    links_added,
                    "Page captured"
                );
            }
            Err(e) => {
                tracing::warn!(worker = ctx.worker_id, url = %item.url, error = %e, "Page failed");
                ctx.progress.publish(ProgressEvent::page_progress_detail(
                    &item.url,
                    PagePhase::Error,
                    e.to_string(),
                ));

                if ctx.queue.retry(&item) {
                    let delay = backoff_delay(
                        ctx.config.backoff_base_ms(),
                        ctx.config.backoff_cap_ms(),
                        item.retries,
                    );
                    ctx.progress.publish(ProgressEvent::page_progress_detail(
                        &item.url,
                        PagePhase::BackingOff,
                        format!("{} ms", delay.as_millis()),
                    ));
                    tokio::select! {
                        () = ctx.cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                } else if let Err(journal_err) =
                    ctx.state.append(WalEventPayload::CapturePageFailed {
                        url: item.url.clone(),
                        error: e.to_string(),
                    })
                {
                    tracing::warn!(error = %journal_err, "Failed to journal page failure");
                }
            }
        }
    }

    tracing::debug!(worker = ctx.worker_id, "Worker finished");
    Ok(())
}

/// Drive one page through its full lifecycle; returns the number of new
/// links enqueued.
async fn process_page(ctx: &WorkerContext, item: &QueueItem) -> Result<usize> {
    let page = ctx
        .browser
        .new_page("about:blank")
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create page: {e}"))?;
    let driver = PageDriver::new(page);

    let activity = NetworkActivity::new();
    let interceptor = ApiInterceptor::new(
        &ctx.config,
        ctx.sink.clone(),
        activity.clone(),
        ctx.progress.clone(),
    );
    let interceptor_guard = interceptor
        .attach(driver.page(), item.url.clone())
        .await
        .context("Failed to attach API interceptor")?;

    let capturer_guard = if ctx.config.capture_static() {
        Some(
            Arc::clone(&ctx.capturer)
                .attach(driver.page())
                .await
                .context("Failed to attach static capturer")?,
        )
    } else {
        None
    };

    let result = drive_page(ctx, item, &driver, &activity).await;

    // Let in-flight response handlers finish before tearing down
    interceptor_guard.detach().await;
    if let Some(guard) = capturer_guard {
        guard.detach().await;
    }
    if let Err(e) = driver.page().clone().close().await {
        tracing::debug!(error = %e, "Page close failed");
    }

    result
}

async fn drive_page(
    ctx: &WorkerContext,
    item: &QueueItem,
    driver: &PageDriver,
    activity: &NetworkActivity,
) -> Result<usize> {
    let config = &ctx.config;

    ctx.progress
        .publish(ProgressEvent::page_progress(&item.url, PagePhase::Navigating));
    driver.navigate(&item.url, config.page_timeout()).await?;

    ctx.progress
        .publish(ProgressEvent::page_progress(&item.url, PagePhase::NetworkIdle));
    wait_for_network_idle(
        activity,
        config.network_idle_time(),
        config.network_idle_timeout(),
    )
    .await;

    if config.auto_scroll() {
        ctx.progress
            .publish(ProgressEvent::page_progress(&item.url, PagePhase::Scrolling));
        driver
            .auto_scroll(
                config.scroll_step_px(),
                config.scroll_delay(),
                config.max_scrolls(),
            )
            .await?;
    }

    ctx.progress
        .publish(ProgressEvent::page_progress(&item.url, PagePhase::Settling));
    tokio::time::sleep(config.page_settle_time()).await;

    if ctx.shared.claim_first_page() {
        handle_first_page(ctx, item, driver).await?;
    }

    let mut links_added = 0usize;
    if item.depth < config.crawl_max_depth() {
        ctx.progress.publish(ProgressEvent::page_progress(
            &item.url,
            PagePhase::ExtractingLinks,
        ));
        links_added = extract_and_enqueue_links(ctx, item, driver).await?;
    }

    Ok(links_added)
}

/// Seed-page duties: resolve the final URL (the seed may redirect), pin
/// the capture origin, and capture the entry document.
async fn handle_first_page(ctx: &WorkerContext, item: &QueueItem, driver: &PageDriver) -> Result<()> {
    let final_url = driver.current_url().await.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not read final URL, keeping seed");
        item.url.clone()
    });

    if normalize_url(&final_url).ok() != normalize_url(&item.url).ok() {
        tracing::info!(seed = %item.url, final_url = %final_url, "Seed redirected");
    }
    ctx.capturer.set_origin_from(&final_url);
    ctx.shared.set_final_url(final_url.clone());
    ctx.progress
        .publish(ProgressEvent::lifecycle(LifecycleStage::CrawlStarted));

    if ctx.config.capture_static() {
        ctx.progress.publish(ProgressEvent::page_progress(
            &item.url,
            PagePhase::CapturingHtml,
        ));
        // The rendered DOM is what an SPA replica needs; the original
        // server document is already captured as a Document asset.
        let html = driver.rendered_html().await?;
        if ctx.config.capture_rendered_html() || !document_asset_exists(ctx, &final_url) {
            ctx.capturer
                .capture_document(&html, &final_url, true)
                .await?;
        }

        // Harvest responsive candidates the browser never requested
        let mut candidates = Vec::new();
        for value in driver.extract_srcset_values().await.unwrap_or_default() {
            candidates.extend(crate::static_capture::parse_srcset(&value));
        }
        if !candidates.is_empty() {
            ctx.capturer.harvest_urls(candidates, &final_url).await;
        }
    }

    Ok(())
}

fn document_asset_exists(ctx: &WorkerContext, url: &str) -> bool {
    let Some(local) = ctx.capturer.local_path_for(url) else {
        return false;
    };
    ctx.capturer
        .assets()
        .iter()
        .any(|a| a.local_path == local)
}

async fn extract_and_enqueue_links(
    ctx: &WorkerContext,
    item: &QueueItem,
    driver: &PageDriver,
) -> Result<usize> {
    let links = driver.extract_links().await?;
    let base = ctx
        .shared
        .final_url()
        .unwrap_or_else(|| ctx.config.start_url().to_string());

    let mut discovered = Vec::new();
    for link in links {
        if !same_origin(&link, &base) {
            continue;
        }
        if ctx.queue.add(&link, item.depth + 1) {
            discovered.push(DiscoveredUrl {
                url: link,
                depth: item.depth + 1,
            });
        }
    }

    if !discovered.is_empty() {
        if let Err(e) = ctx.state.append(WalEventPayload::CaptureUrlsDiscovered {
            urls: discovered.clone(),
        }) {
            tracing::warn!(error = %e, "Failed to journal discovered URLs");
        }
    }

    Ok(discovered.len())
}
