//! Shared configuration constants for sitereplay
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default number of concurrent crawl workers
///
/// Each worker owns one browser page. Five pages keeps memory use of a
/// single Chromium instance reasonable while saturating most targets.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default maximum crawl depth from the seed URL
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// Default maximum number of pages visited in one capture
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Default per-page retry attempts for transient failures
pub const DEFAULT_PAGE_RETRIES: u32 = 2;

/// Default navigation timeout in milliseconds
pub const DEFAULT_PAGE_TIMEOUT_MS: u64 = 30_000;

/// Network is considered idle when no XHR/fetch has started for this long
pub const DEFAULT_NETWORK_IDLE_TIME_MS: u64 = 1_000;

/// Upper bound on waiting for network idle
pub const DEFAULT_NETWORK_IDLE_TIMEOUT_MS: u64 = 5_000;

/// Delay between programmatic scroll steps
pub const DEFAULT_SCROLL_DELAY_MS: u64 = 50;

/// Pixel increment for one scroll step
pub const DEFAULT_SCROLL_STEP_PX: u64 = 400;

/// Hard cap on scroll iterations per page
pub const DEFAULT_MAX_SCROLLS: u32 = 50;

/// Settle time after scrolling before extraction begins
pub const DEFAULT_PAGE_SETTLE_TIME_MS: u64 = 1_000;

/// Base delay for exponential retry backoff
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// Ceiling for exponential retry backoff
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 15_000;

/// WAL events accumulated before a compaction is triggered
pub const DEFAULT_COMPACTION_THRESHOLD: usize = 100;

/// Largest intercepted response body persisted into a fixture: 10 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Largest source map accepted by the fetch stage: 100 MiB
pub const DEFAULT_SOURCEMAP_MAX_SIZE: usize = 100 * 1024 * 1024;

/// Source-map fetch timeout in milliseconds
pub const DEFAULT_SOURCEMAP_TIMEOUT_MS: u64 = 30_000;

/// Responses larger than this are consumed as a stream rather than buffered
pub const SOURCEMAP_STREAMING_THRESHOLD: usize = 8 * 1024 * 1024;

/// State file format version; snapshots from other versions refuse to resume
pub const STATE_FILE_VERSION: u32 = 1;

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
/// Next update: 2025-04-29 (quarterly schedule)
///
/// Chrome releases new stable versions ~every 4 weeks.
/// Update quarterly to stay within reasonable version window.
///
/// Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";

/// Headers never persisted into fixtures.
///
/// Cookie and authorization material must not leak into a replayable
/// artifact; timing and cache-identity headers vary per run and would
/// make fixture diffs noisy.
pub const HEADER_DENYLIST: &[&str] = &[
    "cookie",
    "set-cookie",
    "authorization",
    "proxy-authorization",
    "x-csrf-token",
    "x-xsrf-token",
    "date",
    "age",
    "expires",
    "last-modified",
    "etag",
    "if-none-match",
    "if-modified-since",
    "server-timing",
    "x-request-id",
    "x-trace-id",
    "cf-ray",
];

/// Redirect status codes recorded during capture and replayed verbatim
pub const REDIRECT_STATUSES: &[u16] = &[301, 302, 303, 307, 308];
