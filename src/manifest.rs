//! Capture manifest: the contract between capture and replay.
//!
//! `manifest.json` lives at `_server/manifest.json` and tells the replay
//! server everything it needs: where fixtures and static files are, which
//! redirects were observed, and the default serving options.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fixture::RedirectRecord;

/// Name of the server directory under the capture output root
pub const SERVER_DIR: &str = "_server";
/// Manifest file name inside the server directory
pub const MANIFEST_FILE: &str = "manifest.json";
/// Fixtures directory inside the server directory
pub const FIXTURES_DIR: &str = "fixtures";
/// Static root inside the server directory
pub const STATIC_DIR: &str = "static";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelaySettings {
    pub enabled: bool,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for DelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            min_ms: 0,
            max_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    pub default_port: u16,
    pub cors: bool,
    pub delay: DelaySettings,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            default_port: 4080,
            cors: true,
            delay: DelaySettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSettings {
    pub api: String,
    #[serde(rename = "static")]
    pub static_root: String,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            api: "/api".to_string(),
            static_root: "/".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixturesInfo {
    pub count: usize,
    pub index_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticInfo {
    pub enabled: bool,
    pub entrypoint: String,
    pub asset_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

/// The capture manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub source_url: String,
    pub captured_at: DateTime<Utc>,
    pub server: ServerSettings,
    pub routes: RouteSettings,
    pub fixtures: FixturesInfo,
    #[serde(rename = "static")]
    pub static_info: StaticInfo,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirects: Option<Vec<RedirectRecord>>,
}

impl Manifest {
    /// Atomic save (write-to-temp + rename) into the server directory
    pub async fn save(&self, server_dir: &Path) -> Result<()> {
        tokio::fs::create_dir_all(server_dir)
            .await
            .with_context(|| format!("Failed to create {}", server_dir.display()))?;

        let path = server_dir.join(MANIFEST_FILE);
        let tmp = server_dir.join(format!("{MANIFEST_FILE}.tmp"));
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize manifest")?;
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to move manifest into place at {}", path.display()))?;
        Ok(())
    }

    pub async fn load(server_dir: &Path) -> Result<Self> {
        let path = server_dir.join(MANIFEST_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        serde_json::from_slice(&bytes).context("Invalid manifest JSON")
    }
}
