//! Structured progress events published during capture.
//!
//! Consumers (CLI, TUI, logs) subscribe to a broadcast bus; publishing
//! never blocks the capture and silently drops events when nobody
//! listens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Per-URL lifecycle phases, emitted in fixed order for each page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PagePhase {
    Navigating,
    NetworkIdle,
    Scrolling,
    Settling,
    ExtractingLinks,
    CapturingHtml,
    Completed,
    Error,
    Retrying,
    BackingOff,
}

/// Coarse lifecycle stages of the whole session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleStage {
    BrowserLaunched,
    CrawlStarted,
    CrawlCompleted,
    ExtractStarted,
    ExtractCompleted,
    Flushing,
    Finished,
    Cancelled,
}

/// Events emitted during the capture process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    /// Per-page phase transition
    #[serde(rename_all = "camelCase")]
    PageProgress {
        url: String,
        phase: PagePhase,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
        timestamp: DateTime<Utc>,
    },
    /// One fixture captured
    #[serde(rename_all = "camelCase")]
    ApiCapture {
        fixture_id: String,
        method: String,
        pattern: String,
        status: u16,
        timestamp: DateTime<Utc>,
    },
    /// One static asset captured
    #[serde(rename_all = "camelCase")]
    AssetCapture {
        url: String,
        local_path: String,
        size: u64,
        timestamp: DateTime<Utc>,
    },
    /// A fixture was dropped by `(method, pattern)` dedup
    #[serde(rename_all = "camelCase")]
    DuplicateSkipped {
        method: String,
        pattern: String,
        timestamp: DateTime<Utc>,
    },
    /// Artifacts being flushed to disk
    #[serde(rename_all = "camelCase")]
    FlushProgress {
        written: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    /// Session-level lifecycle transition
    #[serde(rename_all = "camelCase")]
    Lifecycle {
        stage: LifecycleStage,
        timestamp: DateTime<Utc>,
    },
    /// Debug-grade detail, for verbose consumers only
    #[serde(rename_all = "camelCase")]
    Verbose {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    #[must_use]
    pub fn page_progress(url: impl Into<String>, phase: PagePhase) -> Self {
        Self::PageProgress {
            url: url.into(),
            phase,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn page_progress_detail(
        url: impl Into<String>,
        phase: PagePhase,
        detail: impl Into<String>,
    ) -> Self {
        Self::PageProgress {
            url: url.into(),
            phase,
            detail: Some(detail.into()),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn api_capture(fixture_id: impl Into<String>, method: impl Into<String>, pattern: impl Into<String>, status: u16) -> Self {
        Self::ApiCapture {
            fixture_id: fixture_id.into(),
            method: method.into(),
            pattern: pattern.into(),
            status,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn asset_capture(url: impl Into<String>, local_path: impl Into<String>, size: u64) -> Self {
        Self::AssetCapture {
            url: url.into(),
            local_path: local_path.into(),
            size,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn duplicate_skipped(method: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::DuplicateSkipped {
            method: method.into(),
            pattern: pattern.into(),
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn flush_progress(written: usize, total: usize) -> Self {
        Self::FlushProgress {
            written,
            total,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn lifecycle(stage: LifecycleStage) -> Self {
        Self::Lifecycle {
            stage,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn verbose(message: impl Into<String>) -> Self {
        Self::Verbose {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Broadcast bus for progress events
#[derive(Debug, Clone)]
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event; a missing audience is not an error
    pub fn publish(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Subscribe as a `Stream`, for consumers composing with other streams
    #[must_use]
    pub fn stream(&self) -> tokio_stream::wrappers::BroadcastStream<ProgressEvent> {
        tokio_stream::wrappers::BroadcastStream::new(self.subscribe())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
