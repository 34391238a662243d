//! Safe materialization: containment, idempotent writes, sanitizer
//! properties.

use proptest::prelude::*;
use sitereplay::materialize::{SourceWriter, WriteOutcome, sanitize_rel_path};
use sitereplay::sourcemap::ExtractedSource;
use tempfile::TempDir;

fn source(path: &str, content: &str) -> ExtractedSource {
    ExtractedSource {
        path: path.to_string(),
        content: content.to_string(),
        original_path: format!("webpack://app/{path}"),
    }
}

#[tokio::test]
async fn second_run_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let sources = vec![
        source("src/a.ts", "let a = 1;"),
        source("src/nested/b.ts", "let b = 2;"),
        source("src/c.ts", "let c = 3;"),
    ];

    let mut writer = SourceWriter::new(dir.path());
    let first = writer.write_all(&sources).await.unwrap();
    assert_eq!(first.written, 3);
    assert_eq!(first.unchanged, 0);

    let mut writer = SourceWriter::new(dir.path());
    let second = writer.write_all(&sources).await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.unchanged, 3);
}

#[tokio::test]
async fn changed_content_is_rewritten() {
    let dir = TempDir::new().unwrap();

    let mut writer = SourceWriter::new(dir.path());
    writer.write_source(&source("a.ts", "v1")).await.unwrap();
    let outcome = writer.write_source(&source("a.ts", "v2")).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Written);

    let content = std::fs::read_to_string(dir.path().join("a.ts")).unwrap();
    assert_eq!(content, "v2");
}

#[tokio::test]
async fn traversal_paths_are_skipped_and_contained() {
    let dir = TempDir::new().unwrap();
    let mut writer = SourceWriter::new(dir.path().join("out"));

    // Fully escaping paths sanitize to nothing and are skipped
    let outcome = writer.write_source(&source("../..", "nope")).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Skipped);

    // Partially escaping paths are pulled back under the root
    let outcome = writer
        .write_source(&source("../../evil/x.ts", "contained"))
        .await
        .unwrap();
    assert_eq!(outcome, WriteOutcome::Written);
    assert!(dir.path().join("out/evil/x.ts").exists());
    assert!(!dir.path().join("evil").exists());
    assert_eq!(writer.stats().skipped, 1);
}

proptest! {
    #[test]
    fn sanitize_is_idempotent(raw in "\\PC{0,80}") {
        let once = sanitize_rel_path(&raw);
        let twice = once.as_deref().and_then(sanitize_rel_path);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn sanitized_paths_never_escape(raw in "\\PC{0,80}") {
        if let Some(clean) = sanitize_rel_path(&raw) {
            prop_assert!(!clean.starts_with('/'));
            prop_assert!(!clean.split('/').any(|seg| seg == ".."));
            prop_assert!(!clean.contains('\0'));
        }
    }
}
