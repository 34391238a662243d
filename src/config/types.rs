//! Core configuration types for capture sessions
//!
//! This module contains the main `CaptureConfig` struct that defines all
//! parameters for a capture-and-replay session: crawl limits, interception
//! filters, source-map budgets, and state-manager behavior.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::utils::constants::*;

/// Main configuration struct for capture sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Output directory for all captured artifacts.
    ///
    /// **INVARIANT:** Always an absolute path (normalized in builder).
    /// The state files, `_server/` tree, and extracted sources all live
    /// under this root.
    pub(crate) output_dir: PathBuf,

    /// Seed URL the capture starts from
    pub(crate) start_url: String,

    // Crawl
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

    /// Retry backoff parameters: `min(base * 2^retries, cap)`
    pub(crate) backoff_base_ms: u64,
    pub(crate) backoff_cap_ms: u64,

    /// URL globs selecting which XHR/fetch traffic becomes fixtures
    pub(crate) api_filter: Vec<String>,

    /// Compiled form of `api_filter`
    ///
    /// Pre-compiled at config creation to avoid hot-path regex compilation.
    #[serde(skip)]
    pub(crate) api_filter_compiled: Vec<regex::Regex>,

    // Interception
    pub(crate) capture_bodies: bool,
    pub(crate) max_body_size: usize,

    // State manager
    pub(crate) compaction_threshold: usize,
    pub(crate) truncate_corrupted_wal: bool,
    pub(crate) resume: bool,

    // Source maps
    pub(crate) sourcemap_max_size: usize,
    pub(crate) sourcemap_timeout_ms: u64,
    pub(crate) include_node_modules: bool,
    pub(crate) internal_packages: HashSet<String>,
    pub(crate) exclude_patterns: Vec<String>,

    /// Compiled form of `exclude_patterns`
    #[serde(skip)]
    pub(crate) exclude_patterns_compiled: Vec<regex::Regex>,

    /// Chrome user data directory for browser profile isolation
    ///
    /// When set, each capture session uses its own Chrome profile,
    /// preventing profile lock contention in long-running processes.
    #[serde(skip)]
    pub(crate) chrome_data_dir: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./capture"),
            start_url: String::new(),
            concurrency: DEFAULT_CONCURRENCY,
            crawl_max_depth: DEFAULT_MAX_DEPTH,
            crawl_max_pages: DEFAULT_MAX_PAGES,
            page_retries: DEFAULT_PAGE_RETRIES,
            page_timeout_ms: DEFAULT_PAGE_TIMEOUT_MS,
            rate_limit_delay_ms: 0,
            network_idle_timeout_ms: DEFAULT_NETWORK_IDLE_TIMEOUT_MS,
            network_idle_time_ms: DEFAULT_NETWORK_IDLE_TIME_MS,
            scroll_delay_ms: DEFAULT_SCROLL_DELAY_MS,
            scroll_step_px: DEFAULT_SCROLL_STEP_PX,
            max_scrolls: DEFAULT_MAX_SCROLLS,
            page_settle_time_ms: DEFAULT_PAGE_SETTLE_TIME_MS,
            auto_scroll: true,
            capture_static: true,
            capture_rendered_html: false,
            headless: true,
            backoff_base_ms: DEFAULT_BACKOFF_BASE_MS,
            backoff_cap_ms: DEFAULT_BACKOFF_CAP_MS,
            api_filter: vec!["**/api/**".to_string()],
            api_filter_compiled: Vec::new(),
            capture_bodies: true,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            truncate_corrupted_wal: false,
            resume: false,
            sourcemap_max_size: DEFAULT_SOURCEMAP_MAX_SIZE,
            sourcemap_timeout_ms: DEFAULT_SOURCEMAP_TIMEOUT_MS,
            include_node_modules: false,
            internal_packages: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_patterns_compiled: Vec::new(),
            chrome_data_dir: None,
        }
    }
}

impl CaptureConfig {
    /// Set Chrome user data directory for browser profile isolation
    #[must_use]
    pub fn with_chrome_data_dir(mut self, dir: PathBuf) -> Self {
        self.chrome_data_dir = Some(dir);
        self
    }

    /// Get the Chrome user data directory if configured
    #[must_use]
    pub fn chrome_data_dir(&self) -> Option<&PathBuf> {
        self.chrome_data_dir.as_ref()
    }

    /// Get the pre-compiled API filter patterns
    #[must_use]
    pub fn api_filter_compiled(&self) -> &[regex::Regex] {
        &self.api_filter_compiled
    }

    /// Get the pre-compiled source-path exclusion patterns
    #[must_use]
    pub fn exclude_patterns_compiled(&self) -> &[regex::Regex] {
        &self.exclude_patterns_compiled
    }
}
