//! Fixture persistence: one JSON file per fixture plus an index.
//!
//! Layout under the server directory:
//!
//! ```text
//! _server/fixtures/
//!   _index.json
//!   0001_GET_api_users_userId.json
//!   ...
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::types::Fixture;
use crate::pattern::pattern_priority;

/// Name of the index file inside the fixtures directory
pub const INDEX_FILE: &str = "_index.json";

/// Summary entry for one fixture in `_index.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureIndexEntry {
    pub id: String,
    pub method: String,
    pub pattern: String,
    pub priority: i32,
    pub file: String,
}

/// Index of all persisted fixtures
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureIndex {
    pub count: usize,
    pub fixtures: Vec<FixtureIndexEntry>,
}

/// Reads and writes fixtures under a fixed directory
pub struct FixtureStore {
    dir: PathBuf,
}

impl FixtureStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist all fixtures and the index.
    ///
    /// The fixture list is expected to be deduplicated and sorted already;
    /// files are written in list order so ids and index order agree.
    pub async fn save_all(&self, fixtures: &[Fixture]) -> Result<FixtureIndex> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create fixtures dir {}", self.dir.display()))?;

        let mut index = FixtureIndex {
            count: fixtures.len(),
            fixtures: Vec::with_capacity(fixtures.len()),
        };

        for fixture in fixtures {
            let file = fixture.file_name();
            let path = self.dir.join(&file);
            let json = serde_json::to_vec_pretty(fixture)
                .with_context(|| format!("Failed to serialize fixture {}", fixture.id))?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("Failed to write fixture {}", path.display()))?;

            index.fixtures.push(FixtureIndexEntry {
                id: fixture.id.clone(),
                method: fixture.request.method.clone(),
                pattern: fixture.request.pattern.clone(),
                priority: pattern_priority(&fixture.request.pattern),
                file,
            });
        }

        let index_json = serde_json::to_vec_pretty(&index).context("Failed to serialize index")?;
        tokio::fs::write(self.dir.join(INDEX_FILE), index_json)
            .await
            .context("Failed to write fixture index")?;

        tracing::debug!(count = index.count, dir = %self.dir.display(), "Fixtures persisted");
        Ok(index)
    }

    /// Load the index and every fixture it references, in index order
    pub async fn load_all(&self) -> Result<Vec<Fixture>> {
        let index = self.load_index().await?;
        let mut fixtures = Vec::with_capacity(index.count);

        for entry in &index.fixtures {
            let path = self.dir.join(&entry.file);
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("Failed to read fixture {}", path.display()))?;
            let fixture: Fixture = serde_json::from_slice(&bytes)
                .with_context(|| format!("Invalid fixture JSON in {}", path.display()))?;
            fixtures.push(fixture);
        }

        Ok(fixtures)
    }

    pub async fn load_index(&self) -> Result<FixtureIndex> {
        let path = self.dir.join(INDEX_FILE);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read fixture index {}", path.display()))?;
        serde_json::from_slice(&bytes).context("Invalid fixture index JSON")
    }
}
