//! Getter methods for `CaptureConfig`
//!
//! This module provides all the accessor methods for retrieving
//! configuration values from a `CaptureConfig` instance.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::types::CaptureConfig;

impl CaptureConfig {
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    #[must_use]
    pub fn start_url(&self) -> &str {
        &self.start_url
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn crawl_max_depth(&self) -> u32 {
        self.crawl_max_depth
    }

    #[must_use]
    pub fn crawl_max_pages(&self) -> usize {
        self.crawl_max_pages
    }

    #[must_use]
    pub fn page_retries(&self) -> u32 {
        self.page_retries
    }

    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.page_timeout_ms)
    }

    #[must_use]
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    #[must_use]
    pub fn network_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.network_idle_timeout_ms)
    }

    #[must_use]
    pub fn network_idle_time(&self) -> Duration {
        Duration::from_millis(self.network_idle_time_ms)
    }

    #[must_use]
    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    #[must_use]
    pub fn scroll_step_px(&self) -> u64 {
        self.scroll_step_px
    }

    #[must_use]
    pub fn max_scrolls(&self) -> u32 {
        self.max_scrolls
    }

    #[must_use]
    pub fn page_settle_time(&self) -> Duration {
        Duration::from_millis(self.page_settle_time_ms)
    }

    #[must_use]
    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    #[must_use]
    pub fn capture_static(&self) -> bool {
        self.capture_static
    }

    #[must_use]
    pub fn capture_rendered_html(&self) -> bool {
        self.capture_rendered_html
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn backoff_base_ms(&self) -> u64 {
        self.backoff_base_ms
    }

    #[must_use]
    pub fn backoff_cap_ms(&self) -> u64 {
        self.backoff_cap_ms
    }

    #[must_use]
    pub fn api_filter(&self) -> &[String] {
        &self.api_filter
    }

    #[must_use]
    pub fn capture_bodies(&self) -> bool {
        self.capture_bodies
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }

    #[must_use]
    pub fn compaction_threshold(&self) -> usize {
        self.compaction_threshold
    }

    #[must_use]
    pub fn truncate_corrupted_wal(&self) -> bool {
        self.truncate_corrupted_wal
    }

    #[must_use]
    pub fn resume(&self) -> bool {
        self.resume
    }

    #[must_use]
    pub fn sourcemap_max_size(&self) -> usize {
        self.sourcemap_max_size
    }

    #[must_use]
    pub fn sourcemap_timeout(&self) -> Duration {
        Duration::from_millis(self.sourcemap_timeout_ms)
    }

    #[must_use]
    pub fn sourcemap_timeout_ms(&self) -> u64 {
        self.sourcemap_timeout_ms
    }

    #[must_use]
    pub fn include_node_modules(&self) -> bool {
        self.include_node_modules
    }

    #[must_use]
    pub fn internal_packages(&self) -> &HashSet<String> {
        &self.internal_packages
    }

    #[must_use]
    pub fn exclude_patterns(&self) -> &[String] {
        &self.exclude_patterns
    }
}
