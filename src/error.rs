//! Error types shared across the capture-and-replay pipeline.
//!
//! Page-level network and rendering failures are retried through the crawl
//! queue and never surface as these types directly; source-map pipeline
//! errors are accumulated per bundle; state errors are fatal to resume.

use thiserror::Error;

/// Top-level error for capture operations
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Capture was cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors produced by the WAL + state manager.
///
/// `TornWrite` is the one recoverable corruption: a trailing partial line
/// that can be truncated away when the caller opted in.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file version {found} does not match supported version {expected}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Resume URL mismatch: state file was created for {stored}, requested {requested}")]
    UrlMismatch { stored: String, requested: String },

    #[error("WAL sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("Torn write at end of WAL (byte offset {valid_len}); pass truncate_corrupted_wal to recover")]
    TornWrite { valid_len: u64 },

    #[error("WAL corrupted at line {line}: {reason}")]
    Corrupted { line: usize, reason: String },

    #[error("State manager already finalized")]
    Finalized,

    #[error("I/O failure on state files: {0}")]
    Io(#[from] std::io::Error),

    #[error("State serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Error taxonomy of the source-map pipeline.
///
/// These accumulate into `ExtractReport::errors` rather than aborting the
/// run; one broken bundle never stops the others.
#[derive(Debug, Error)]
pub enum SourceMapError {
    #[error("No source map found for {bundle_url}")]
    NotFound { bundle_url: String },

    #[error("Source map rejected: response content-type {content_type} looks like an SPA fallback")]
    HtmlFallback { content_type: String },

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("HTTP {status} fetching {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Source map exceeds size budget: {actual} > {limit} bytes")]
    TooLarge { actual: usize, limit: usize },

    #[error("Invalid JSON in source map: {0}")]
    InvalidJson(String),

    #[error("Invalid base64 payload in data: source map URL")]
    InvalidDataUri,

    #[error("Source map validation failed: {0}")]
    Validation(ValidationCode),

    #[error("Malformed VLQ in mappings at group {group}, segment {segment}")]
    MalformedVlq { group: usize, segment: usize },

    #[error("Mapping segment has invalid field count {len} at group {group}")]
    SegmentLength { group: usize, len: usize },

    #[error("Mapping references source index {index}, but the map has {len} sources")]
    SourceIndexOutOfBounds { index: i64, len: usize },

    #[error("Mapping references name index {index}, but the map has {len} names")]
    NameIndexOutOfBounds { index: i64, len: usize },

    #[error("Fetch cancelled")]
    Cancelled,

    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),
}

/// Structured validation codes for ECMA-426 v3 maps
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    UnsupportedVersion,
    MissingSources,
    InvalidSources,
    MissingMappings,
    InvalidMappings,
    InvalidSourceRoot,
    InvalidNames,
    InvalidFile,
    SourcesContentLengthMismatch,
    InvalidSourcesContent,
    InvalidIgnoreList,
    InvalidIndexMap,
}

impl std::fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code = match self {
            Self::UnsupportedVersion => "UNSUPPORTED_VERSION",
            Self::MissingSources => "MISSING_SOURCES",
            Self::InvalidSources => "INVALID_SOURCES",
            Self::MissingMappings => "MISSING_MAPPINGS",
            Self::InvalidMappings => "INVALID_MAPPINGS",
            Self::InvalidSourceRoot => "INVALID_SOURCE_ROOT",
            Self::InvalidNames => "INVALID_NAMES",
            Self::InvalidFile => "INVALID_FILE",
            Self::SourcesContentLengthMismatch => "SOURCES_CONTENT_LENGTH_MISMATCH",
            Self::InvalidSourcesContent => "INVALID_SOURCES_CONTENT",
            Self::InvalidIgnoreList => "INVALID_IGNORE_LIST",
            Self::InvalidIndexMap => "INVALID_INDEX_MAP",
        };
        f.write_str(code)
    }
}

/// Convenience alias used throughout the crate
pub type CaptureResult<T> = Result<T, CaptureError>;
