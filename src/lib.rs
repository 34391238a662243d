//! sitereplay: capture a live website and replay it offline.
//!
//! Given a seed URL, the capture pipeline drives a real browser through
//! the site, intercepts XHR/fetch traffic into replayable fixtures,
//! mirrors static assets, reconstructs original source trees from source
//! maps, and journals every step to a crash-safe write-ahead log. The
//! replay server then serves the captured artifacts through URL-pattern
//! matching.

pub mod browser;
pub mod config;
pub mod crawl;
pub mod error;
pub mod fixture;
pub mod interceptor;
pub mod manifest;
pub mod materialize;
pub mod orchestrator;
pub mod pattern;
pub mod replay;
pub mod sourcemap;
pub mod state;
pub mod static_capture;
pub mod utils;

pub use browser::{launch_browser, PageDriver};
pub use config::{CaptureConfig, CaptureConfigBuilder};
pub use crawl::{
    CrawlQueue, LifecycleStage, PagePhase, ProgressBus, ProgressEvent, QueueItem, QueueStats,
};
pub use error::{CaptureError, CaptureResult, SourceMapError, StateError, ValidationCode};
pub use fixture::{
    Asset, BodyKind, CapturedRequest, CapturedResponse, Fixture, FixtureIndex, FixtureMatch,
    FixtureMatcher, FixtureStore, RedirectRecord, deduplicate_fixtures, sort_by_priority,
};
pub use manifest::Manifest;
pub use materialize::{SourceWriter, WriteOutcome, WriteStats, sanitize_rel_path};
pub use orchestrator::{CaptureOrchestrator, CaptureReport, capture};
pub use pattern::{PatternInfo, extract_pattern, pattern_priority, pattern_to_regex};
pub use replay::{ReplayOptions, ReplayServer};
pub use sourcemap::{
    BundleReport, ExtractedSource, SourceFilters, SourceMap, SourceMapPipeline, parse_source_map,
};
pub use state::{PhaseName, PhaseStatus, StateFile, StateManager, WalEvent, WalEventPayload};
pub use static_capture::StaticCapturer;
