//! Type-safe builder for `CaptureConfig` using the typestate pattern
//!
//! This module provides a fluent builder interface with compile-time
//! validation ensuring that both required fields (`output_dir` and
//! `start_url`) are set before building a `CaptureConfig`.

use anyhow::{Result, anyhow};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::path::PathBuf;

use super::types::CaptureConfig;
use crate::utils::glob_to_regex;

// Type states for the builder
pub struct WithOutputDir;
pub struct WithStartUrl;
pub struct Complete;

/// All optional knobs, carried unchanged across typestate transitions
#[derive(Debug, Clone)]
pub(crate) struct BuilderOptions {
    pub(crate) concurrency: usize,
    pub(crate) crawl_max_depth: u32,
    pub(crate) crawl_max_pages: usize,
    pub(crate) page_retries: u32,
    pub(crate) page_timeout_ms: u64,
    pub(crate) rate_limit_delay_ms: u64,
    pub(crate) network_idle_timeout_ms: u64,
    pub(crate) network_idle_time_ms: u64,
    pub(crate) scroll_delay_ms: u64,
    pub(crate) scroll_step_px: u64,
    pub(crate) max_scrolls: u32,
    pub(crate) page_settle_time_ms: u64,
    pub(crate) auto_scroll: bool,
    pub(crate) capture_static: bool,
    pub(crate) capture_rendered_html: bool,
    pub(crate) headless: bool,
    pub(crate) backoff_base_ms: u64,
    pub(crate) backoff_cap_ms: u64,
    pub(crate) api_filter: Vec<String>,
    pub(crate) capture_bodies: bool,
    pub(crate) max_body_size: usize,
    pub(crate) compaction_threshold: usize,
    pub(crate) truncate_corrupted_wal: bool,
    pub(crate) resume: bool,
    pub(crate) sourcemap_max_size: usize,
    pub(crate) sourcemap_timeout_ms: u64,
    pub(crate) include_node_modules: bool,
    pub(crate) internal_packages: HashSet<String>,
    pub(crate) exclude_patterns: Vec<String>,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        let defaults = CaptureConfig::default();
        Self {
            concurrency: defaults.concurrency,
            crawl_max_depth: defaults.crawl_max_depth,
            crawl_max_pages: defaults.crawl_max_pages,
            page_retries: defaults.page_retries,
            page_timeout_ms: defaults.page_timeout_ms,
            rate_limit_delay_ms: defaults.rate_limit_delay_ms,
            network_idle_timeout_ms: defaults.network_idle_timeout_ms,
            network_idle_time_ms: defaults.network_idle_time_ms,
            scroll_delay_ms: defaults.scroll_delay_ms,
            scroll_step_px: defaults.scroll_step_px,
            max_scrolls: defaults.max_scrolls,
            page_settle_time_ms: defaults.page_settle_time_ms,
            auto_scroll: defaults.auto_scroll,
            capture_static: defaults.capture_static,
            capture_rendered_html: defaults.capture_rendered_html,
            headless: defaults.headless,
            backoff_base_ms: defaults.backoff_base_ms,
            backoff_cap_ms: defaults.backoff_cap_ms,
            api_filter: defaults.api_filter,
            capture_bodies: defaults.capture_bodies,
            max_body_size: defaults.max_body_size,
            compaction_threshold: defaults.compaction_threshold,
            truncate_corrupted_wal: defaults.truncate_corrupted_wal,
            resume: defaults.resume,
            sourcemap_max_size: defaults.sourcemap_max_size,
            sourcemap_timeout_ms: defaults.sourcemap_timeout_ms,
            include_node_modules: defaults.include_node_modules,
            internal_packages: defaults.internal_packages,
            exclude_patterns: defaults.exclude_patterns,
        }
    }
}

pub struct CaptureConfigBuilder<State = ()> {
    pub(crate) output_dir: Option<PathBuf>,
    pub(crate) start_url: Option<String>,
    pub(crate) options: BuilderOptions,
    pub(crate) _phantom: PhantomData<State>,
}

impl Default for CaptureConfigBuilder<()> {
    fn default() -> Self {
        Self {
            output_dir: None,
            start_url: None,
            options: BuilderOptions::default(),
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfig {
    /// Create a builder for configuring a `CaptureConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> CaptureConfigBuilder<()> {
        CaptureConfigBuilder::default()
    }
}

impl CaptureConfigBuilder<()> {
    pub fn output_dir(self, dir: impl Into<PathBuf>) -> CaptureConfigBuilder<WithOutputDir> {
        CaptureConfigBuilder {
            output_dir: Some(dir.into()),
            start_url: self.start_url,
            options: self.options,
            _phantom: PhantomData,
        }
    }

    pub fn start_url(self, url: impl Into<String>) -> CaptureConfigBuilder<WithStartUrl> {
        CaptureConfigBuilder {
            output_dir: self.output_dir,
            start_url: Some(url.into()),
            options: self.options,
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfigBuilder<WithOutputDir> {
    pub fn start_url(self, url: impl Into<String>) -> CaptureConfigBuilder<Complete> {
        CaptureConfigBuilder {
            output_dir: self.output_dir,
            start_url: Some(url.into()),
            options: self.options,
            _phantom: PhantomData,
        }
    }
}

impl CaptureConfigBuilder<WithStartUrl> {
    pub fn output_dir(self, dir: impl Into<PathBuf>) -> CaptureConfigBuilder<Complete> {
        CaptureConfigBuilder {
            output_dir: Some(dir.into()),
            start_url: self.start_url,
            options: self.options,
            _phantom: PhantomData,
        }
    }
}

// Optional knobs, available in every state
impl<State> CaptureConfigBuilder<State> {
    #[must_use]
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.options.concurrency = workers;
        self
    }

    #[must_use]
    pub fn crawl_max_depth(mut self, depth: u32) -> Self {
        self.options.crawl_max_depth = depth;
        self
    }

    #[must_use]
    pub fn crawl_max_pages(mut self, pages: usize) -> Self {
        self.options.crawl_max_pages = pages;
        self
    }

    #[must_use]
    pub fn page_retries(mut self, retries: u32) -> Self {
        self.options.page_retries = retries;
        self
    }

    #[must_use]
    pub fn page_timeout_ms(mut self, ms: u64) -> Self {
        self.options.page_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn rate_limit_delay_ms(mut self, ms: u64) -> Self {
        self.options.rate_limit_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn network_idle_timeout_ms(mut self, ms: u64) -> Self {
        self.options.network_idle_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn network_idle_time_ms(mut self, ms: u64) -> Self {
        self.options.network_idle_time_ms = ms;
        self
    }

    #[must_use]
    pub fn scroll_delay_ms(mut self, ms: u64) -> Self {
        self.options.scroll_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn scroll_step_px(mut self, px: u64) -> Self {
        self.options.scroll_step_px = px;
        self
    }

    #[must_use]
    pub fn max_scrolls(mut self, count: u32) -> Self {
        self.options.max_scrolls = count;
        self
    }

    #[must_use]
    pub fn page_settle_time_ms(mut self, ms: u64) -> Self {
        self.options.page_settle_time_ms = ms;
        self
    }

    #[must_use]
    pub fn auto_scroll(mut self, enabled: bool) -> Self {
        self.options.auto_scroll = enabled;
        self
    }

    #[must_use]
    pub fn capture_static(mut self, enabled: bool) -> Self {
        self.options.capture_static = enabled;
        self
    }

    /// Capture the rendered DOM instead of the original server response
    #[must_use]
    pub fn capture_rendered_html(mut self, enabled: bool) -> Self {
        self.options.capture_rendered_html = enabled;
        self
    }

    #[must_use]
    pub fn headless(mut self, enabled: bool) -> Self {
        self.options.headless = enabled;
        self
    }

    #[must_use]
    pub fn backoff_base_ms(mut self, ms: u64) -> Self {
        self.options.backoff_base_ms = ms;
        self
    }

    #[must_use]
    pub fn backoff_cap_ms(mut self, ms: u64) -> Self {
        self.options.backoff_cap_ms = ms;
        self
    }

    /// URL globs selecting which XHR/fetch traffic becomes fixtures.
    ///
    /// `**` crosses path segments, `*` stays within one, `?` matches a
    /// single character.
    #[must_use]
    pub fn api_filter(mut self, globs: Vec<String>) -> Self {
        self.options.api_filter = globs;
        self
    }

    #[must_use]
    pub fn capture_bodies(mut self, enabled: bool) -> Self {
        self.options.capture_bodies = enabled;
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.options.max_body_size = bytes;
        self
    }

    #[must_use]
    pub fn compaction_threshold(mut self, events: usize) -> Self {
        self.options.compaction_threshold = events;
        self
    }

    /// Authorize truncating a torn trailing WAL line during resume
    #[must_use]
    pub fn truncate_corrupted_wal(mut self, enabled: bool) -> Self {
        self.options.truncate_corrupted_wal = enabled;
        self
    }

    #[must_use]
    pub fn resume(mut self, enabled: bool) -> Self {
        self.options.resume = enabled;
        self
    }

    #[must_use]
    pub fn sourcemap_max_size(mut self, bytes: usize) -> Self {
        self.options.sourcemap_max_size = bytes;
        self
    }

    #[must_use]
    pub fn sourcemap_timeout_ms(mut self, ms: u64) -> Self {
        self.options.sourcemap_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn include_node_modules(mut self, enabled: bool) -> Self {
        self.options.include_node_modules = enabled;
        self
    }

    /// Packages treated as first-party even when resolved under `node_modules/`
    #[must_use]
    pub fn internal_packages(mut self, packages: HashSet<String>) -> Self {
        self.options.internal_packages = packages;
        self
    }

    /// Regex patterns for source paths to skip during extraction
    #[must_use]
    pub fn exclude_patterns(mut self, patterns: Vec<String>) -> Self {
        self.options.exclude_patterns = patterns;
        self
    }
}

impl CaptureConfigBuilder<Complete> {
    /// Build the final `CaptureConfig`, validating values and compiling
    /// filter patterns.
    ///
    /// # Errors
    ///
    /// Returns an error when the start URL fails to parse, a glob or regex
    /// pattern is invalid, or a numeric option is out of range.
    pub fn build(self) -> Result<CaptureConfig> {
        let output_dir = self
            .output_dir
            .ok_or_else(|| anyhow!("output_dir is required"))?;
        let start_url = self
            .start_url
            .ok_or_else(|| anyhow!("start_url is required"))?;

        url::Url::parse(&start_url).map_err(|e| anyhow!("Invalid start URL '{start_url}': {e}"))?;

        if self.options.concurrency == 0 {
            return Err(anyhow!("concurrency must be at least 1"));
        }

        // Normalize to an absolute path so downstream path math never
        // depends on the process working directory.
        let output_dir = if output_dir.is_absolute() {
            output_dir
        } else {
            std::env::current_dir()?.join(output_dir)
        };

        let api_filter_compiled = self
            .options
            .api_filter
            .iter()
            .map(|g| glob_to_regex(g))
            .collect::<Result<Vec<_>>>()?;

        let exclude_patterns_compiled = self
            .options
            .exclude_patterns
            .iter()
            .map(|p| regex::Regex::new(p).map_err(|e| anyhow!("Invalid exclude pattern '{p}': {e}")))
            .collect::<Result<Vec<_>>>()?;

        let o = self.options;
        Ok(CaptureConfig {
            output_dir,
            start_url,
            concurrency: o.concurrency,
            crawl_max_depth: o.crawl_max_depth,
            crawl_max_pages: o.crawl_max_pages,
            page_retries: o.page_retries,
            page_timeout_ms: o.page_timeout_ms,
            rate_limit_delay_ms: o.rate_limit_delay_ms,
            network_idle_timeout_ms: o.network_idle_timeout_ms,
            network_idle_time_ms: o.network_idle_time_ms,
            scroll_delay_ms: o.scroll_delay_ms,
            scroll_step_px: o.scroll_step_px,
            max_scrolls: o.max_scrolls,
            page_settle_time_ms: o.page_settle_time_ms,
            auto_scroll: o.auto_scroll,
            capture_static: o.capture_static,
            capture_rendered_html: o.capture_rendered_html,
            headless: o.headless,
            backoff_base_ms: o.backoff_base_ms,
            backoff_cap_ms: o.backoff_cap_ms,
            api_filter: o.api_filter,
            api_filter_compiled,
            capture_bodies: o.capture_bodies,
            max_body_size: o.max_body_size,
            compaction_threshold: o.compaction_threshold,
            truncate_corrupted_wal: o.truncate_corrupted_wal,
            resume: o.resume,
            sourcemap_max_size: o.sourcemap_max_size,
            sourcemap_timeout_ms: o.sourcemap_timeout_ms,
            include_node_modules: o.include_node_modules,
            internal_packages: o.internal_packages,
            exclude_patterns: o.exclude_patterns,
            exclude_patterns_compiled,
            chrome_data_dir: None,
        })
    }
}
