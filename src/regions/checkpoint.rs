//! Persisted run state: `{region_key -> status}`
//!
//! Rewritten atomically (temp file in the same directory, then rename) after
//! every status change, so a crash leaves either the old or the new state on
//! disk and never a torn file.

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::iterator::RegionStatus;
use crate::error::CheckpointError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub regions: BTreeMap<String, RegionStatus>,
    pub updated_at: DateTime<Utc>,
}

impl Default for RunCheckpoint {
    fn default() -> Self {
        Self {
            regions: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

impl RunCheckpoint {
    #[must_use]
    pub fn status(&self, region_key: &str) -> Option<RegionStatus> {
        self.regions.get(region_key).copied()
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint; a missing file is an empty checkpoint
    ///
    /// # Errors
    ///
    /// `CheckpointError::Parse` for a corrupt file, `Io` when unreadable.
    pub fn load(&self) -> Result<RunCheckpoint, CheckpointError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No checkpoint at {}, starting fresh", self.path.display());
                return Ok(RunCheckpoint::default());
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let checkpoint: RunCheckpoint =
            serde_json::from_str(&raw).map_err(|source| CheckpointError::Parse {
                path: self.path.clone(),
                source,
            })?;
        info!(
            "Resuming from checkpoint {} ({} region(s) recorded)",
            self.path.display(),
            checkpoint.regions.len()
        );
        Ok(checkpoint)
    }

    /// Atomically replace the checkpoint file
    ///
    /// # Errors
    ///
    /// `CheckpointError::Io` when the directory or temp file cannot be written.
    pub fn save(&self, checkpoint: &RunCheckpoint) -> Result<(), CheckpointError> {
        let io_err = |source| CheckpointError::Io {
            path: self.path.clone(),
            source,
        };

        let parent = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(io_err)?;

        let json = serde_json::to_vec_pretty(checkpoint).map_err(|source| CheckpointError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let mut temp_file = NamedTempFile::new_in(&parent).map_err(io_err)?;
        temp_file.write_all(&json).map_err(io_err)?;
        temp_file.as_file().sync_all().map_err(io_err)?;
        temp_file
            .persist(&self.path)
            .map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Remove the checkpoint so the next run starts from scratch
    ///
    /// # Errors
    ///
    /// `CheckpointError::Io` for anything but a missing file.
    pub fn reset(&self) -> Result<(), CheckpointError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_empty_checkpoint() {
        let dir = TempDir::new().expect("temp dir");
        let store = CheckpointStore::new(dir.path().join("checkpoint.json"));
        assert!(store.load().expect("load succeeds").regions.is_empty());
    }

    #[test]
    fn test_save_then_load_and_reset() {
        let dir = TempDir::new().expect("temp dir");
        let store = CheckpointStore::new(dir.path().join("nested/state/checkpoint.json"));

        let mut checkpoint = RunCheckpoint::default();
        checkpoint
            .regions
            .insert("90210".into(), RegionStatus::Completed);
        checkpoint
            .regions
            .insert("33101".into(), RegionStatus::Failed);
        store.save(&checkpoint).expect("save succeeds");

        let loaded = store.load().expect("load succeeds");
        assert_eq!(loaded.status("90210"), Some(RegionStatus::Completed));
        assert_eq!(loaded.status("33101"), Some(RegionStatus::Failed));

        store.reset().expect("reset succeeds");
        assert!(!store.path().exists());
        store.reset().expect("reset is idempotent");
    }

    #[test]
    fn test_corrupt_checkpoint_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("checkpoint.json");
        std::fs::write(&path, b"{\"regions\": {\"9021").expect("write partial file");

        let err = CheckpointStore::new(path).load().expect_err("corrupt file fails");
        assert!(matches!(err, CheckpointError::Parse { .. }));
    }
}
