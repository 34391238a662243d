//! Capture orchestration: phases, workers, and artifact flushing.
//!
//! The orchestrator owns the crawl queue, the shared browser, the fixture
//! sink, the static capturer, and the state manager. It drives the
//! `scrape → extract → capture` phases, skipping phases a resumed session
//! already completed, and always leaves a flushed WAL + compacted snapshot
//! behind, even on cancellation or fatal errors.

use anyhow::{Context, Result};
use chromiumoxide::browser::Browser;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::browser::{PageDriver, launch_browser};
use crate::config::CaptureConfig;
use crate::crawl::{
    CrawlQueue, LifecycleStage, ProgressBus, ProgressEvent, SharedCrawlState, WorkerContext,
    run_worker,
};
use crate::error::{CaptureError, CaptureResult};
use crate::fixture::{Fixture, FixtureStore, partition_duplicates, sort_by_priority};
use crate::interceptor::FixtureSink;
use crate::manifest::{
    FIXTURES_DIR, FixturesInfo, Manifest, RouteSettings, SERVER_DIR, STATIC_DIR, ServerSettings,
    StaticInfo,
};
use crate::materialize::SourceWriter;
use crate::sourcemap::{FetchLimits, SourceFilters, SourceMapPipeline};
use crate::state::{PhaseName, PhaseStatus, StateManager, WalEventPayload};
use crate::static_capture::StaticCapturer;
use crate::utils::constants::CHROME_USER_AGENT;

/// Directory extracted source trees are materialized into
pub const SOURCES_DIR: &str = "_sources";

/// Summary of a finished (or cancelled) capture session
#[derive(Debug, Clone, Default)]
pub struct CaptureReport {
    pub pages_visited: usize,
    pub pages_skipped: usize,
    pub links_discovered: usize,
    pub fixtures_captured: usize,
    pub assets_captured: usize,
    pub sources_extracted: usize,
    pub max_depth_reached: bool,
    pub max_pages_reached: bool,
}

/// Drives one capture session end to end
pub struct CaptureOrchestrator {
    config: Arc<CaptureConfig>,
    progress: ProgressBus,
    cancel: CancellationToken,
}

impl CaptureOrchestrator {
    #[must_use]
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config: Arc::new(config),
            progress: ProgressBus::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Bus consumers subscribe to for live progress
    #[must_use]
    pub fn progress(&self) -> &ProgressBus {
        &self.progress
    }

    /// Token that cancels the session cooperatively
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the full capture session.
    ///
    /// On every exit path (success, cancellation, fatal error) the WAL is
    /// flushed, a compacted snapshot is written, and the browser is torn
    /// down.
    pub async fn run(&self) -> CaptureResult<CaptureReport> {
        let config = &self.config;
        let state_exists = config.output_dir().join(crate::state::STATE_FILE).exists();

        let state = if config.resume() && state_exists {
            StateManager::resume_with_threshold(
                config.output_dir(),
                config.start_url(),
                config.truncate_corrupted_wal(),
                config.compaction_threshold(),
            )?
        } else {
            StateManager::create_with_threshold(
                config.output_dir(),
                config.start_url(),
                config.compaction_threshold(),
            )?
        };
        let state = Arc::new(state);

        // Each session gets its own browser profile; concurrent captures
        // must not contend on a shared Chrome profile lock.
        let profile_dir = config.chrome_data_dir().cloned().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("sitereplay-profile-{}", uuid::Uuid::new_v4()))
        });
        let (browser, handler_task, user_data_dir) =
            launch_browser(config.headless(), Some(profile_dir))
                .await
                .map_err(|e| CaptureError::Browser(e.to_string()))?;
        let browser = Arc::new(browser);
        self.progress
            .publish(ProgressEvent::lifecycle(LifecycleStage::BrowserLaunched));

        let result = self.run_phases(&state, &browser).await;

        // Teardown happens on every path: flush state, stop the handler,
        // close the browser, drop the profile directory.
        if let Err(e) = state.finalize() {
            tracing::warn!(error = %e, "State finalize failed");
        }
        handler_task.abort();
        let _ = handler_task.await;
        match Arc::try_unwrap(browser) {
            Ok(mut owned) => {
                let _ = owned.close().await;
                let _ = owned.wait().await;
            }
            Err(arc) => {
                tracing::warn!(
                    refs = Arc::strong_count(&arc),
                    "Browser still referenced, cleanup happens on drop"
                );
            }
        }
        if config.chrome_data_dir().is_none() {
            let _ = std::fs::remove_dir_all(&user_data_dir);
        }

        match result {
            Ok(report) => {
                self.progress
                    .publish(ProgressEvent::lifecycle(LifecycleStage::Finished));
                Ok(report)
            }
            Err(e) => {
                self.progress
                    .publish(ProgressEvent::lifecycle(LifecycleStage::Cancelled));
                Err(e)
            }
        }
    }

    async fn run_phases(
        &self,
        state: &Arc<StateManager>,
        browser: &Arc<Browser>,
    ) -> CaptureResult<CaptureReport> {
        let snapshot = state.snapshot();

        if snapshot.phases.scrape.status != PhaseStatus::Completed {
            self.run_scrape(state, browser).await?;
        }
        if snapshot.phases.extract.status != PhaseStatus::Completed {
            self.run_extract(state).await?;
        }

        let mut report = CaptureReport::default();
        if state.snapshot().phases.capture.status != PhaseStatus::Completed {
            report = self.run_capture(state, browser).await?;
        }

        report.sources_extracted = state
            .snapshot()
            .extract
            .map(|e| e.sources_extracted)
            .unwrap_or_default();
        Ok(report)
    }

    /// Scrape phase: load the seed once and record the final URL after
    /// redirects, the title, and the bundles feeding the extract phase.
    async fn run_scrape(&self, state: &Arc<StateManager>, browser: &Arc<Browser>) -> CaptureResult<()> {
        let config = &self.config;
        state.start_phase(PhaseName::Scrape)?;

        let scrape = async {
            let page = browser
                .new_page("about:blank")
                .await
                .map_err(|e| anyhow::anyhow!("Failed to create scrape page: {e}"))?;
            let driver = PageDriver::new(page);

            driver
                .navigate(config.start_url(), config.page_timeout())
                .await?;
            tokio::time::sleep(config.page_settle_time()).await;

            let final_url = driver.current_url().await.ok();
            let title = driver.title().await.ok().filter(|t| !t.is_empty());
            let bundle_urls = driver.extract_bundle_urls().await.unwrap_or_default();

            let _ = driver.page().clone().close().await;
            Ok::<_, anyhow::Error>(crate::state::ScrapeResult {
                bundle_urls,
                final_url,
                title,
            })
        };

        let result = tokio::select! {
            () = self.cancel.cancelled() => Err(anyhow::anyhow!("cancelled")),
            r = scrape => r,
        };

        match result {
            Ok(scrape_result) => {
                tracing::info!(
                    bundles = scrape_result.bundle_urls.len(),
                    "Scrape phase finished"
                );
                state.append(WalEventPayload::ScrapeResult {
                    result: scrape_result,
                })?;
                state.complete_phase(PhaseName::Scrape)?;
                Ok(())
            }
            Err(e) => {
                state.fail_phase(PhaseName::Scrape, e.to_string())?;
                if self.cancel.is_cancelled() {
                    Err(CaptureError::Cancelled)
                } else {
                    Err(CaptureError::Network(e.to_string()))
                }
            }
        }
    }

    /// Extract phase: run the source-map pipeline over every bundle the
    /// scrape found and materialize the reconstructed trees.
    async fn run_extract(&self, state: &Arc<StateManager>) -> CaptureResult<()> {
        let config = &self.config;
        state.start_phase(PhaseName::Extract)?;
        self.progress
            .publish(ProgressEvent::lifecycle(LifecycleStage::ExtractStarted));

        let bundles = state
            .snapshot()
            .scrape
            .map(|s| s.bundle_urls)
            .unwrap_or_default();

        let client = http_client().map_err(CaptureError::Other)?;
        let pipeline = SourceMapPipeline::new(
            client,
            FetchLimits {
                max_size: config.sourcemap_max_size(),
                timeout: config.sourcemap_timeout(),
            },
            SourceFilters {
                include_node_modules: config.include_node_modules(),
                internal_packages: config.internal_packages().clone(),
                exclude_patterns: config.exclude_patterns_compiled().to_vec(),
            },
        );

        let mut writer = SourceWriter::new(config.output_dir().join(SOURCES_DIR));

        for bundle_url in bundles {
            if self.cancel.is_cancelled() {
                state.fail_phase(PhaseName::Extract, "cancelled")?;
                return Err(CaptureError::Cancelled);
            }

            let report = pipeline.process_bundle(&bundle_url, &self.cancel).await;
            if let Err(e) = writer.write_all(&report.sources).await {
                tracing::warn!(bundle = %bundle_url, error = %e, "Source materialization failed");
            }

            state.append(WalEventPayload::ExtractBundle {
                bundle_url: bundle_url.clone(),
                extracted: report.stats.extracted_count,
                null_content: report.stats.null_content_count,
                skipped: report.stats.skipped_count,
                errors: report.errors.iter().map(ToString::to_string).collect(),
            })?;

            self.progress.publish(ProgressEvent::verbose(format!(
                "bundle {bundle_url}: {} sources, {} errors",
                report.stats.extracted_count,
                report.errors.len()
            )));
        }

        state.complete_phase(PhaseName::Extract)?;
        self.progress
            .publish(ProgressEvent::lifecycle(LifecycleStage::ExtractCompleted));
        Ok(())
    }

    /// Capture phase: fan out N workers over the crawl queue, then flush
    /// fixtures, assets, and the manifest.
    async fn run_capture(
        &self,
        state: &Arc<StateManager>,
        browser: &Arc<Browser>,
    ) -> CaptureResult<CaptureReport> {
        let config = &self.config;
        state.start_phase(PhaseName::Capture)?;

        let queue = Arc::new(CrawlQueue::new(
            config.crawl_max_depth(),
            config.crawl_max_pages(),
            config.page_retries(),
        ));

        // Seed with the post-redirect URL when the scrape learned one
        let seed = state
            .snapshot()
            .scrape
            .and_then(|s| s.final_url)
            .unwrap_or_else(|| config.start_url().to_string());
        queue.add(&seed, 0);

        // A resumed session re-queues begun-but-unfinished pages and
        // journaled discoveries; completed pages are never re-crawled.
        for pending in state.pending_capture_urls() {
            queue.add(&pending.url, pending.depth);
        }

        let client = http_client().map_err(CaptureError::Other)?;
        let sink = FixtureSink::new();
        let capturer = Arc::new(StaticCapturer::new(
            &seed,
            config
                .output_dir()
                .join(SERVER_DIR)
                .join(STATIC_DIR),
            client,
            self.progress.clone(),
        ));
        let shared = Arc::new(SharedCrawlState::new());

        let mut workers = JoinSet::new();
        for worker_id in 0..config.concurrency() {
            let ctx = WorkerContext {
                worker_id,
                browser: Arc::clone(browser),
                queue: Arc::clone(&queue),
                config: Arc::clone(&self.config),
                progress: self.progress.clone(),
                state: Arc::clone(state),
                sink: sink.clone(),
                capturer: Arc::clone(&capturer),
                shared: Arc::clone(&shared),
                cancel: self.cancel.clone(),
            };
            workers.spawn(run_worker(ctx));
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Worker ended with error"),
                Err(e) => tracing::error!(error = %e, "Worker task panicked"),
            }
        }
        self.progress
            .publish(ProgressEvent::lifecycle(LifecycleStage::CrawlCompleted));

        // Flush artifacts even when cancelled: a partial capture that
        // replays is worth more than a clean abort.
        let report = self
            .flush_artifacts(&queue, &sink, &capturer, &seed, shared.final_url())
            .await?;

        if self.cancel.is_cancelled() {
            state.fail_phase(PhaseName::Capture, "cancelled")?;
            return Err(CaptureError::Cancelled);
        }

        state.complete_phase(PhaseName::Capture)?;
        Ok(report)
    }

    async fn flush_artifacts(
        &self,
        queue: &CrawlQueue,
        sink: &FixtureSink,
        capturer: &StaticCapturer,
        seed: &str,
        final_url: Option<String>,
    ) -> CaptureResult<CaptureReport> {
        let config = &self.config;
        self.progress
            .publish(ProgressEvent::lifecycle(LifecycleStage::Flushing));

        let captured = sink.drain();
        let (mut fixtures, duplicates): (Vec<Fixture>, Vec<Fixture>) =
            partition_duplicates(captured);
        for dup in &duplicates {
            self.progress.publish(ProgressEvent::duplicate_skipped(
                dup.request.method.clone(),
                dup.request.pattern.clone(),
            ));
        }
        sort_by_priority(&mut fixtures);

        let total = fixtures.len();
        self.progress
            .publish(ProgressEvent::flush_progress(0, total));

        let server_dir = config.output_dir().join(SERVER_DIR);
        let store = FixtureStore::new(server_dir.join(FIXTURES_DIR));
        store
            .save_all(&fixtures)
            .await
            .map_err(CaptureError::Other)?;
        self.progress
            .publish(ProgressEvent::flush_progress(total, total));

        let assets = capturer.assets();
        let redirects = capturer.redirects();

        let effective_url = final_url.unwrap_or_else(|| seed.to_string());
        let path_prefix = path_prefix_of(&effective_url);
        let name = url::Url::parse(&effective_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "capture".to_string());

        let manifest = Manifest {
            name,
            source_url: config.start_url().to_string(),
            captured_at: chrono::Utc::now(),
            server: ServerSettings::default(),
            routes: RouteSettings::default(),
            fixtures: FixturesInfo {
                count: fixtures.len(),
                index_file: format!("{FIXTURES_DIR}/{}", crate::fixture::INDEX_FILE),
            },
            static_info: StaticInfo {
                enabled: config.capture_static(),
                entrypoint: "index.html".to_string(),
                asset_count: assets.len(),
                path_prefix: path_prefix.clone(),
            },
            redirects: if redirects.is_empty() {
                None
            } else {
                Some(redirects)
            },
        };
        manifest.save(&server_dir).await.map_err(CaptureError::Other)?;

        let stats = queue.stats();
        Ok(CaptureReport {
            pages_visited: stats.completed,
            pages_skipped: stats.skipped,
            links_discovered: stats.links_discovered,
            fixtures_captured: fixtures.len(),
            assets_captured: assets.len(),
            sources_extracted: 0,
            max_depth_reached: stats.max_depth_reached,
            max_pages_reached: stats.max_pages_reached,
        })
    }

    /// Record the result of the external rebuild tool into the state file
    pub fn record_rebuild_result(
        &self,
        state: &StateManager,
        success: bool,
        detail: Option<String>,
    ) -> CaptureResult<()> {
        state.start_phase(PhaseName::Rebuild)?;
        state.append(WalEventPayload::RebuildResult {
            result: crate::state::RebuildResult { success, detail },
        })?;
        if success {
            state.complete_phase(PhaseName::Rebuild)?;
        } else {
            state.fail_phase(PhaseName::Rebuild, "rebuild failed")?;
        }
        Ok(())
    }
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(CHROME_USER_AGENT)
        .build()
        .context("Failed to build HTTP client")
}

/// Sub-path of the capture URL, used for the root-prefix redirect on
/// replay (`/` → `/app` when the site was captured at `/app`)
fn path_prefix_of(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let path = parsed.path().trim_end_matches('/');
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Convenience: run a full capture with the given config
pub async fn capture(config: CaptureConfig) -> CaptureResult<CaptureReport> {
    CaptureOrchestrator::new(config).run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_detection() {
        assert_eq!(path_prefix_of("https://x.test/"), None);
        assert_eq!(path_prefix_of("https://x.test"), None);
        assert_eq!(path_prefix_of("https://x.test/app/"), Some("/app".to_string()));
        assert_eq!(
            path_prefix_of("https://x.test/docs/v2"),
            Some("/docs/v2".to_string())
        );
    }
}
