//! Safe filesystem materialization of reconstructed sources.
//!
//! Paths arriving from source maps are attacker-influenced: they may carry
//! NUL bytes, absolute prefixes, traversal segments, or characters no
//! filesystem wants. Every path is sanitized before it touches the disk,
//! and a sanitized path can never resolve outside the configured output
//! root. Writes are idempotent: identical content is detected by hash and
//! skipped.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

use crate::sourcemap::ExtractedSource;

/// What happened to one write request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// File created or replaced with new content
    Written,
    /// Destination already holds identical content
    Unchanged,
    /// Path rejected by sanitization
    Skipped,
}

/// Running counters for one materialization pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub written: usize,
    pub unchanged: usize,
    pub skipped: usize,
}

/// Sanitize a relative path for materialization.
///
/// NUL bytes are removed, leading separators stripped, each segment
/// scrubbed of filesystem-unsafe characters (`< > : " | ? *` become `_`),
/// and `..` segments are popped without ever escaping the root. Returns
/// `None` when nothing survives.
///
/// The function is idempotent: `sanitize(sanitize(p)) == sanitize(p)`.
#[must_use]
pub fn sanitize_rel_path(raw: &str) -> Option<String> {
    let no_nul: String = raw.chars().filter(|c| *c != '\0').collect();
    let trimmed = no_nul.trim_start_matches(['/', '\\']);

    let mut segments: Vec<String> = Vec::new();
    for segment in trimmed.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => {
                let clean = sanitize_filename::sanitize_with_options(
                    other,
                    sanitize_filename::Options {
                        replacement: "_",
                        windows: true,
                        truncate: true,
                    },
                );
                if !clean.is_empty() {
                    segments.push(clean);
                }
            }
        }
    }

    if segments.is_empty() {
        None
    } else {
        Some(segments.join("/"))
    }
}

/// Writes extracted sources under a fixed output root
pub struct SourceWriter {
    root: PathBuf,
    stats: WriteStats,
}

impl SourceWriter {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stats: WriteStats::default(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn stats(&self) -> WriteStats {
        self.stats
    }

    /// Write one extracted source, skipping identical existing content.
    ///
    /// Traversal attempts are rejected silently and counted as skipped:
    /// a hostile map must not abort the rest of the extraction.
    pub async fn write_source(&mut self, source: &ExtractedSource) -> Result<WriteOutcome> {
        let Some(rel) = sanitize_rel_path(&source.path) else {
            tracing::debug!(path = %source.path, "Rejected unsafe source path");
            self.stats.skipped += 1;
            return Ok(WriteOutcome::Skipped);
        };

        let dest = self.root.join(&rel);
        debug_assert!(dest.starts_with(&self.root));

        if let Ok(existing) = tokio::fs::read(&dest).await
            && xxh3_64(&existing) == xxh3_64(source.content.as_bytes())
        {
            self.stats.unchanged += 1;
            return Ok(WriteOutcome::Unchanged);
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&dest, source.content.as_bytes())
            .await
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        self.stats.written += 1;
        Ok(WriteOutcome::Written)
    }

    /// Write a whole batch, returning the stats delta for this call
    pub async fn write_all(&mut self, sources: &[ExtractedSource]) -> Result<WriteStats> {
        let before = self.stats;
        for source in sources {
            self.write_source(source).await?;
        }
        Ok(WriteStats {
            written: self.stats.written - before.written,
            unchanged: self.stats.unchanged - before.unchanged,
            skipped: self.stats.skipped - before.skipped,
        })
    }
}
