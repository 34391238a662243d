//! Source-map discovery, validation, and source-tree reconstruction.
//!
//! The pipeline turns a bundle URL into the original source files its map
//! carries: `discover → fetch → parse/validate → extract`. Everything is
//! best-effort per bundle; errors accumulate into the bundle's report.

pub mod discovery;
pub mod extract;
pub mod fetch;
pub mod parse;
pub mod pipeline;
pub mod types;
pub mod vlq;

pub use extract::{SourceFilters, extract_sources, normalize_source_path};
pub use fetch::{FetchLimits, Utf8Assembler, fetch_map_text};
pub use parse::parse_source_map;
pub use pipeline::SourceMapPipeline;
pub use types::{
    BundleReport, ExtractStats, ExtractedSource, MapLocation, SourceMap, ValidationWarning,
};
pub use vlq::{MappingStats, decode_segment, validate_mappings};
