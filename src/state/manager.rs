//! Crash-safe state persistence: append-only WAL plus compacted snapshot.
//!
//! Two files live in the output directory:
//!
//! - `state.json`: the latest compacted snapshot
//! - `state.wal`: NDJSON events appended since that snapshot
//!
//! Every append is fsync-flushed before it returns: an event is either
//! fully persisted or absent. A partial trailing line (torn write) is
//! detectable by JSON-parse failure at end-of-file and can be truncated
//! away when the caller opted in.

use chrono::Utc;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::events::{WalEvent, WalEventPayload, apply_event};
use super::types::{DiscoveredUrl, PageStatus, PhaseName, StateFile};
use crate::error::StateError;
use crate::utils::constants::{DEFAULT_COMPACTION_THRESHOLD, STATE_FILE_VERSION};

/// File name of the compacted snapshot
pub const STATE_FILE: &str = "state.json";
/// File name of the write-ahead log
pub const WAL_FILE: &str = "state.wal";

struct Inner {
    state: StateFile,
    wal: File,
    events_since_snapshot: usize,
    finalized: bool,
}

/// Exclusive owner of the `state.json` and `state.wal` handles.
///
/// All appends are serialized through one lock; `seq` assignment and the
/// durable write happen under the same critical section, so sequence
/// numbers reflect the real-time order of `append` calls.
pub struct StateManager {
    inner: Mutex<Inner>,
    state_path: PathBuf,
    wal_path: PathBuf,
    compaction_threshold: usize,
}

impl StateManager {
    /// Start a fresh session: write an initial snapshot and an empty WAL.
    pub fn create(output_dir: &Path, url: &str) -> Result<Self, StateError> {
        Self::create_with_threshold(output_dir, url, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn create_with_threshold(
        output_dir: &Path,
        url: &str,
        compaction_threshold: usize,
    ) -> Result<Self, StateError> {
        std::fs::create_dir_all(output_dir)?;
        let state_path = output_dir.join(STATE_FILE);
        let wal_path = output_dir.join(WAL_FILE);

        let state = StateFile::new(url, Utc::now());
        write_snapshot(&state_path, &state)?;

        let wal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)?;
        wal.set_len(0)?;
        wal.sync_data()?;

        tracing::info!(dir = %output_dir.display(), url, "State manager created");

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal,
                events_since_snapshot: 0,
                finalized: false,
            }),
            state_path,
            wal_path,
            compaction_threshold,
        })
    }

    /// Resume from an existing snapshot + WAL.
    ///
    /// Validates the snapshot version and URL, replays the WAL in strict
    /// sequence order, and optionally truncates a torn trailing line.
    pub fn resume(
        output_dir: &Path,
        url: &str,
        truncate_corrupted_wal: bool,
    ) -> Result<Self, StateError> {
        Self::resume_with_threshold(output_dir, url, truncate_corrupted_wal, DEFAULT_COMPACTION_THRESHOLD)
    }

    pub fn resume_with_threshold(
        output_dir: &Path,
        url: &str,
        truncate_corrupted_wal: bool,
        compaction_threshold: usize,
    ) -> Result<Self, StateError> {
        let state_path = output_dir.join(STATE_FILE);
        let wal_path = output_dir.join(WAL_FILE);

        let snapshot_bytes = std::fs::read(&state_path)?;
        let mut state: StateFile = serde_json::from_slice(&snapshot_bytes)?;

        if state.version != STATE_FILE_VERSION {
            return Err(StateError::VersionMismatch {
                expected: STATE_FILE_VERSION,
                found: state.version,
            });
        }
        if state.url != url {
            return Err(StateError::UrlMismatch {
                stored: state.url,
                requested: url.to_string(),
            });
        }

        let snapshot_seq = state.last_seq;
        let mut truncate_to: Option<u64> = None;
        let mut replayed = 0usize;

        if wal_path.exists() {
            let content = std::fs::read_to_string(&wal_path)?;
            let mut offset = 0u64;
            let lines: Vec<&str> = content.split('\n').collect();

            for (i, line) in lines.iter().enumerate() {
                let is_last_chunk = i == lines.len() - 1;
                if line.is_empty() {
                    offset += 1; // the split-away newline
                    continue;
                }

                match serde_json::from_str::<WalEvent>(line) {
                    Ok(event) => {
                        // Events at or below the snapshot seq were already
                        // folded in by a compaction that crashed before
                        // truncating the WAL.
                        if event.seq > snapshot_seq {
                            let expected = state.last_seq + 1;
                            if event.seq != expected {
                                return Err(StateError::SequenceGap {
                                    expected,
                                    found: event.seq,
                                });
                            }
                            apply_event(&mut state, &event);
                            replayed += 1;
                        }
                        offset += line.len() as u64 + 1;
                    }
                    Err(_) if is_last_chunk => {
                        // Partial trailing line: recoverable only with
                        // explicit authorization.
                        if truncate_corrupted_wal {
                            truncate_to = Some(offset);
                            break;
                        }
                        return Err(StateError::TornWrite { valid_len: offset });
                    }
                    Err(e) => {
                        return Err(StateError::Corrupted {
                            line: i + 1,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let wal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&wal_path)?;
        if let Some(len) = truncate_to {
            wal.set_len(len)?;
            wal.sync_data()?;
            tracing::warn!(len, "Truncated torn write at end of WAL");
        }

        tracing::info!(
            replayed,
            last_seq = state.last_seq,
            "Resumed state from snapshot + WAL"
        );

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                wal,
                events_since_snapshot: replayed,
                finalized: false,
            }),
            state_path,
            wal_path,
            compaction_threshold,
        })
    }

    /// Append one event: assign the next sequence number, fold it into the
    /// in-memory state, and fsync the WAL line before returning.
    pub fn append(&self, payload: WalEventPayload) -> Result<u64, StateError> {
        let mut inner = self.inner.lock();
        if inner.finalized {
            return Err(StateError::Finalized);
        }

        let event = WalEvent {
            seq: inner.state.last_seq + 1,
            timestamp: Utc::now(),
            payload,
        };

        let mut line = serde_json::to_string(&event)?;
        line.push('\n');
        inner.wal.write_all(line.as_bytes())?;
        inner.wal.sync_data()?;

        apply_event(&mut inner.state, &event);
        inner.events_since_snapshot += 1;

        let seq = event.seq;
        if inner.events_since_snapshot >= self.compaction_threshold {
            self.compact_locked(&mut inner)?;
        }
        Ok(seq)
    }

    /// Phase helpers, thin wrappers over [`Self::append`]
    pub fn start_phase(&self, phase: PhaseName) -> Result<u64, StateError> {
        self.append(WalEventPayload::PhaseStart { phase })
    }

    pub fn complete_phase(&self, phase: PhaseName) -> Result<u64, StateError> {
        self.append(WalEventPayload::PhaseComplete { phase })
    }

    pub fn fail_phase(&self, phase: PhaseName, error: impl Into<String>) -> Result<u64, StateError> {
        self.append(WalEventPayload::PhaseFail {
            phase,
            error: error.into(),
        })
    }

    /// Compact now and seal the manager against further appends
    pub fn finalize(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)?;
        inner.finalized = true;
        Ok(())
    }

    /// Flush outstanding events into a fresh snapshot without sealing
    pub fn compact(&self) -> Result<(), StateError> {
        let mut inner = self.inner.lock();
        self.compact_locked(&mut inner)
    }

    /// Clone of the current in-memory state
    #[must_use]
    pub fn snapshot(&self) -> StateFile {
        self.inner.lock().state.clone()
    }

    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    #[must_use]
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// URLs the capture phase must re-queue on resume: pages journaled as
    /// begun-but-unfinished plus discovered URLs never started. Completed
    /// and failed pages are never re-queued.
    #[must_use]
    pub fn pending_capture_urls(&self) -> Vec<DiscoveredUrl> {
        let inner = self.inner.lock();
        let Some(capture) = &inner.state.capture else {
            return Vec::new();
        };

        let mut pending = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for (url, record) in &capture.pages {
            if record.status == PageStatus::Started && seen.insert(url.clone()) {
                pending.push(DiscoveredUrl {
                    url: url.clone(),
                    depth: record.depth,
                });
            }
        }
        for discovered in &capture.discovered {
            if !capture.pages.contains_key(&discovered.url) && seen.insert(discovered.url.clone()) {
                pending.push(discovered.clone());
            }
        }
        pending
    }

    /// Snapshot + truncate, under the lock.
    ///
    /// No-op when nothing was appended since the last snapshot, which
    /// keeps `finalize` idempotent: reopening and finalizing again leaves
    /// `state.json` byte-identical.
    fn compact_locked(&self, inner: &mut Inner) -> Result<(), StateError> {
        if inner.events_since_snapshot == 0 {
            return Ok(());
        }

        let marker = WalEvent {
            seq: inner.state.last_seq + 1,
            timestamp: Utc::now(),
            payload: WalEventPayload::WalCompacted {
                snapshot_seq: inner.state.last_seq + 1,
            },
        };
        let mut line = serde_json::to_string(&marker)?;
        line.push('\n');
        inner.wal.write_all(line.as_bytes())?;
        inner.wal.sync_data()?;
        apply_event(&mut inner.state, &marker);

        write_snapshot(&self.state_path, &inner.state)?;

        inner.wal.set_len(0)?;
        inner.wal.sync_data()?;
        inner.events_since_snapshot = 0;

        tracing::debug!(last_seq = inner.state.last_seq, "WAL compacted into snapshot");
        Ok(())
    }
}

/// Atomic snapshot write: temp file in the same directory, fsync, rename.
fn write_snapshot(path: &Path, state: &StateFile) -> Result<(), StateError> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&serde_json::to_vec_pretty(state)?)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
