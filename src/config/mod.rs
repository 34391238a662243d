//! Configuration module for capture sessions
//!
//! This module provides the `CaptureConfig` struct and its type-safe
//! builder for configuring capture-and-replay sessions with validation and
//! sensible defaults.

// Sub-modules
pub mod builder;
pub mod getters;
pub mod types;

// Re-exports for public API
pub use builder::{CaptureConfigBuilder, Complete, WithOutputDir, WithStartUrl};
pub use types::CaptureConfig;
