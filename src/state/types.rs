//! Phase and snapshot types for the capture state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::constants::STATE_FILE_VERSION;

/// The five phases of a capture session.
///
/// `Dependencies` and `Rebuild` are executed by external tools; the state
/// machine still tracks them so a resumed session knows where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseName {
    Scrape,
    Extract,
    Dependencies,
    Capture,
    Rebuild,
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Scrape => "scrape",
            Self::Extract => "extract",
            Self::Dependencies => "dependencies",
            Self::Capture => "capture",
            Self::Rebuild => "rebuild",
        };
        f.write_str(name)
    }
}

/// Lifecycle of one phase: `pending → in_progress → (completed | failed)`;
/// a failed phase may re-enter `in_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// Tracked state of one phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseState {
    pub status: PhaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// All phase states, in pipeline order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phases {
    pub scrape: PhaseState,
    pub extract: PhaseState,
    pub dependencies: PhaseState,
    pub capture: PhaseState,
    pub rebuild: PhaseState,
}

impl Phases {
    #[must_use]
    pub fn get(&self, phase: PhaseName) -> &PhaseState {
        match phase {
            PhaseName::Scrape => &self.scrape,
            PhaseName::Extract => &self.extract,
            PhaseName::Dependencies => &self.dependencies,
            PhaseName::Capture => &self.capture,
            PhaseName::Rebuild => &self.rebuild,
        }
    }

    pub fn get_mut(&mut self, phase: PhaseName) -> &mut PhaseState {
        match phase {
            PhaseName::Scrape => &mut self.scrape,
            PhaseName::Extract => &mut self.extract,
            PhaseName::Dependencies => &mut self.dependencies,
            PhaseName::Capture => &mut self.capture,
            PhaseName::Rebuild => &mut self.rebuild,
        }
    }
}

/// Result of the scrape phase: what the seed page turned out to be
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResult {
    /// JS/CSS bundles discovered on the seed page
    pub bundle_urls: Vec<String>,
    /// Final URL after any seed redirect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Accumulated result of the extract phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractSummary {
    pub bundles_processed: usize,
    pub sources_extracted: usize,
    pub null_content: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Per-page progress inside the capture phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    /// Begun but not finished; must be re-queued on resume
    Started,
    Completed,
    Failed,
}

/// One page's journal entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRecord {
    pub depth: u32,
    pub status: PageStatus,
}

/// A URL discovered during crawling, journaled so a crash cannot lose
/// queue contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub depth: u32,
}

/// Journal-derived capture-phase state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureProgress {
    pub pages: BTreeMap<String, PageRecord>,
    pub discovered: Vec<DiscoveredUrl>,
    pub pages_visited: usize,
    pub pages_skipped: usize,
}

/// Result of the external rebuild phase
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// The compacted snapshot persisted as `state.json`.
///
/// Invariant: `last_seq` equals the sequence number of the last WAL event
/// folded into this snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    pub version: u32,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub last_seq: u64,
    pub phases: Phases,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape: Option<ScrapeResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild: Option<RebuildResult>,
}

impl StateFile {
    /// Fresh state for a new capture of `url`
    #[must_use]
    pub fn new(url: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            version: STATE_FILE_VERSION,
            url: url.into(),
            created_at,
            last_updated_at: created_at,
            last_seq: 0,
            phases: Phases::default(),
            scrape: None,
            extract: None,
            capture: None,
            rebuild: None,
        }
    }
}
