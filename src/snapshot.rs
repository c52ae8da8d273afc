use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::world::WorldSnapshot;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct SnapshotFile<'a> {
    written_at: DateTime<Utc>,
    #[serde(flatten)]
    snapshot: &'a WorldSnapshot,
}

/// Writes `<dir>/<scenario>/year_NNNN.json` every `interval` years.
/// An interval of zero disables snapshots.
pub struct SnapshotWriter {
    dir: PathBuf,
    interval: usize,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn maybe_write(&self, snapshot: &WorldSnapshot) -> Result<Option<PathBuf>, SnapshotError> {
        if self.interval == 0 || snapshot.year % self.interval != 0 {
            return Ok(None);
        }

        let dir = self.dir.join(&snapshot.scenario);
        fs::create_dir_all(&dir)?;
        let file_path = dir.join(format!("year_{:04}.json", snapshot.year));
        let json = serde_json::to_string_pretty(&SnapshotFile {
            written_at: Utc::now(),
            snapshot,
        })?;
        fs::write(&file_path, json)?;
        Ok(Some(file_path))
    }
}
