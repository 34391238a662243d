//! WAL + state manager: recovery, torn writes, compaction, determinism.

use sitereplay::state::{
    PhaseName, PhaseStatus, ScrapeResult, StateManager, WalEventPayload,
};
use sitereplay::StateError;
use std::io::Write as _;
use tempfile::TempDir;

const URL: &str = "https://site.test/";

fn scrape_result() -> ScrapeResult {
    ScrapeResult {
        bundle_urls: vec!["https://site.test/app.js".to_string()],
        final_url: Some(URL.to_string()),
        title: Some("Site".to_string()),
    }
}

#[test]
fn resume_after_mid_phase_kill() {
    let dir = TempDir::new().unwrap();

    {
        let manager = StateManager::create(dir.path(), URL).unwrap();
        manager.start_phase(PhaseName::Scrape).unwrap();
        manager
            .append(WalEventPayload::ScrapeResult {
                result: scrape_result(),
            })
            .unwrap();
        manager.complete_phase(PhaseName::Scrape).unwrap();
        manager.start_phase(PhaseName::Extract).unwrap();
        // Process "killed": no finalize, the manager is just dropped
    }

    let resumed = StateManager::resume(dir.path(), URL, false).unwrap();
    let state = resumed.snapshot();

    assert_eq!(state.phases.scrape.status, PhaseStatus::Completed);
    assert_eq!(state.phases.extract.status, PhaseStatus::InProgress);
    assert_eq!(state.url, URL);
    assert_eq!(state.last_seq, 4);
    assert_eq!(
        state.scrape.unwrap().bundle_urls,
        vec!["https://site.test/app.js"]
    );
}

#[test]
fn sequence_numbers_are_gapless_and_monotonic() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::create(dir.path(), URL).unwrap();

    let mut last = 0;
    for _ in 0..10 {
        let seq = manager
            .append(WalEventPayload::CaptureUrlsDiscovered { urls: vec![] })
            .unwrap();
        assert_eq!(seq, last + 1);
        last = seq;
    }
}

#[test]
fn torn_write_is_rejected_without_authorization() {
    let dir = TempDir::new().unwrap();
    {
        let manager = StateManager::create(dir.path(), URL).unwrap();
        manager.start_phase(PhaseName::Scrape).unwrap();
    }

    // Simulate a crash mid-append: a partial line with no newline
    let wal_path = dir.path().join("state.wal");
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&wal_path)
        .unwrap();
    file.write_all(br#"{"seq":2,"timestamp":"2026-"#).unwrap();
    drop(file);

    let err = StateManager::resume(dir.path(), URL, false).unwrap_err();
    assert!(matches!(err, StateError::TornWrite { .. }));

    // With authorization the torn tail is truncated and resume succeeds
    let resumed = StateManager::resume(dir.path(), URL, true).unwrap();
    let state = resumed.snapshot();
    assert_eq!(state.last_seq, 1);
    assert_eq!(state.phases.scrape.status, PhaseStatus::InProgress);

    // The WAL can take appends again after truncation
    resumed.start_phase(PhaseName::Extract).unwrap();
    assert_eq!(resumed.snapshot().last_seq, 2);
}

#[test]
fn corruption_in_the_middle_is_unrecoverable() {
    let dir = TempDir::new().unwrap();
    {
        let manager = StateManager::create(dir.path(), URL).unwrap();
        manager.start_phase(PhaseName::Scrape).unwrap();
    }

    let wal_path = dir.path().join("state.wal");
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&wal_path)
        .unwrap();
    file.write_all(b"garbage line\n").unwrap();
    file.write_all(
        br#"{"seq":3,"timestamp":"2026-01-01T00:00:00Z","type":"phase:complete","phase":"scrape"}"#,
    )
    .unwrap();
    file.write_all(b"\n").unwrap();
    drop(file);

    let err = StateManager::resume(dir.path(), URL, true).unwrap_err();
    assert!(matches!(err, StateError::Corrupted { .. }));
}

#[test]
fn resume_rejects_other_url() {
    let dir = TempDir::new().unwrap();
    {
        StateManager::create(dir.path(), URL).unwrap();
    }
    let err = StateManager::resume(dir.path(), "https://other.test/", false).unwrap_err();
    assert!(matches!(err, StateError::UrlMismatch { .. }));
}

#[test]
fn resume_rejects_other_version() {
    let dir = TempDir::new().unwrap();
    {
        StateManager::create(dir.path(), URL).unwrap();
    }

    let state_path = dir.path().join("state.json");
    let mut value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&state_path).unwrap()).unwrap();
    value["version"] = serde_json::json!(99);
    std::fs::write(&state_path, serde_json::to_vec_pretty(&value).unwrap()).unwrap();

    let err = StateManager::resume(dir.path(), URL, false).unwrap_err();
    assert!(matches!(
        err,
        StateError::VersionMismatch {
            expected: _,
            found: 99
        }
    ));
}

#[test]
fn finalize_then_resume_then_finalize_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let state_path = dir.path().join("state.json");

    {
        let manager = StateManager::create(dir.path(), URL).unwrap();
        manager.start_phase(PhaseName::Scrape).unwrap();
        manager
            .append(WalEventPayload::ScrapeResult {
                result: scrape_result(),
            })
            .unwrap();
        manager.complete_phase(PhaseName::Scrape).unwrap();
        manager.finalize().unwrap();
    }
    let first = std::fs::read(&state_path).unwrap();

    {
        let manager = StateManager::resume(dir.path(), URL, false).unwrap();
        manager.finalize().unwrap();
    }
    let second = std::fs::read(&state_path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn finalize_seals_the_manager() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::create(dir.path(), URL).unwrap();
    manager.finalize().unwrap();
    let err = manager.start_phase(PhaseName::Scrape).unwrap_err();
    assert!(matches!(err, StateError::Finalized));
}

#[test]
fn compaction_truncates_wal_and_preserves_state() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::create_with_threshold(dir.path(), URL, 5).unwrap();

    for i in 0..7 {
        manager
            .append(WalEventPayload::CapturePageStarted {
                url: format!("https://site.test/p{i}"),
                depth: 1,
            })
            .unwrap();
    }

    // The threshold fired at least once: the WAL holds fewer lines than
    // the events appended
    let wal = std::fs::read_to_string(dir.path().join("state.wal")).unwrap();
    assert!(wal.lines().count() < 7);

    drop(manager);
    let resumed = StateManager::resume(dir.path(), URL, false).unwrap();
    let capture = resumed.snapshot().capture.unwrap();
    assert_eq!(capture.pages.len(), 7);
}

#[test]
fn pending_urls_distinguish_begun_from_completed() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::create(dir.path(), URL).unwrap();

    manager
        .append(WalEventPayload::CapturePageStarted {
            url: "https://site.test/done".to_string(),
            depth: 0,
        })
        .unwrap();
    manager
        .append(WalEventPayload::CapturePageCompleted {
            url: "https://site.test/done".to_string(),
        })
        .unwrap();
    manager
        .append(WalEventPayload::CapturePageStarted {
            url: "https://site.test/interrupted".to_string(),
            depth: 1,
        })
        .unwrap();
    manager
        .append(WalEventPayload::CaptureUrlsDiscovered {
            urls: vec![
                sitereplay::state::DiscoveredUrl {
                    url: "https://site.test/queued".to_string(),
                    depth: 2,
                },
            ],
        })
        .unwrap();

    let pending = manager.pending_capture_urls();
    let urls: Vec<&str> = pending.iter().map(|p| p.url.as_str()).collect();
    assert!(urls.contains(&"https://site.test/interrupted"));
    assert!(urls.contains(&"https://site.test/queued"));
    assert!(!urls.contains(&"https://site.test/done"));
}
