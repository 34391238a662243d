//! Source-map data model (ECMA-426 revision 3).

use serde::{Deserialize, Serialize};

use crate::error::{SourceMapError, ValidationCode};

/// A validated revision-3 source map.
///
/// Construction goes through [`crate::sourcemap::parse_source_map`]; a
/// value of this type has already passed validation.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    pub sources: Vec<String>,
    pub sources_content: Option<Vec<Option<String>>>,
    pub mappings: String,
    pub source_root: Option<String>,
    pub names: Vec<String>,
    pub file: Option<String>,
    pub ignore_list: Vec<usize>,
}

/// Non-fatal findings recorded during validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: ValidationCode,
    pub message: String,
}

/// One reconstructed original source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedSource {
    /// Normalized POSIX-style path, guaranteed non-escaping of the output
    /// root
    pub path: String,
    pub content: String,
    /// Path exactly as it appeared in the map
    pub original_path: String,
}

/// Counters for one extraction pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractStats {
    pub extracted_count: usize,
    /// Entries whose `sourcesContent` slot was null or absent
    pub null_content_count: usize,
    /// Entries rejected by filters (virtual modules, node_modules,
    /// exclusion patterns)
    pub skipped_count: usize,
}

/// Where the source map for a bundle was found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MapLocation {
    /// `SourceMap` / `X-SourceMap` response header
    Header { url: String },
    /// Trailing `//# sourceMappingURL=` comment in JS
    JsComment { url: String },
    /// Trailing `/*# sourceMappingURL= */` comment in CSS
    CssComment { url: String },
    /// `<bundle>.map` probe
    Probe { url: String },
    /// Inline `data:` URI, decoded in place
    DataUri,
}

impl MapLocation {
    /// The fetchable URL, if the map is not inline
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Header { url }
            | Self::JsComment { url }
            | Self::CssComment { url }
            | Self::Probe { url } => Some(url),
            Self::DataUri => None,
        }
    }
}

/// Outcome of running the pipeline over one bundle.
///
/// The pipeline is best-effort: errors accumulate here instead of aborting
/// the capture.
#[derive(Debug, Default)]
pub struct BundleReport {
    pub bundle_url: String,
    pub map_location: Option<MapLocation>,
    pub sources: Vec<ExtractedSource>,
    pub stats: ExtractStats,
    pub warnings: Vec<ValidationWarning>,
    pub errors: Vec<SourceMapError>,
}

impl BundleReport {
    #[must_use]
    pub fn new(bundle_url: impl Into<String>) -> Self {
        Self {
            bundle_url: bundle_url.into(),
            ..Self::default()
        }
    }
}
