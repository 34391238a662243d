//! Write-ahead log and per-phase state tracking.
//!
//! The state manager exclusively owns the `state.json` snapshot and the
//! `state.wal` journal. Every mutation flows through an appended event;
//! snapshots are derived by folding events, so a crash at any point can be
//! recovered by replaying the journal.

pub mod events;
pub mod manager;
pub mod types;

pub use events::{WalEvent, WalEventPayload, apply_event};
pub use manager::{STATE_FILE, StateManager, WAL_FILE};
pub use types::{
    CaptureProgress, DiscoveredUrl, ExtractSummary, PageRecord, PageStatus, PhaseName, PhaseState,
    PhaseStatus, Phases, RebuildResult, ScrapeResult, StateFile,
};
