//! Append-only local fallback log (JSON Lines)
//!
//! Each line is one [`FallbackEntry`]: the full record plus why and when it
//! was spilled, enough for a separate job to replay it against the sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::FallbackError;
use crate::extractor::PropertyRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackEntry {
    pub queued_at: DateTime<Utc>,
    /// Last sink error observed before spilling
    pub reason: String,
    pub attempts: u32,
    pub record: PropertyRecord,
}

/// Single-writer JSONL file; entries are only ever appended
#[derive(Debug, Clone)]
pub struct FallbackStore {
    path: PathBuf,
}

impl FallbackStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> FallbackError {
        FallbackError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Append one entry and flush it to disk before returning
    ///
    /// # Errors
    /// `FallbackError` when the entry cannot be serialized or written.
    pub async fn append(&self, entry: &FallbackEntry) -> Result<(), FallbackError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        file.write_all(&line).await.map_err(|e| self.io_error(e))?;
        file.sync_data().await.map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Every entry in append order; a missing file reads as empty
    ///
    /// # Errors
    /// `FallbackError` on I/O failure or a line that is not a valid entry.
    pub async fn read_all(&self) -> Result<Vec<FallbackEntry>, FallbackError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(FallbackError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PropertyFields;
    use tempfile::TempDir;

    fn entry(id: &str) -> FallbackEntry {
        FallbackEntry {
            queued_at: Utc::now(),
            reason: "HTTP 503".into(),
            attempts: 4,
            record: PropertyRecord {
                source_id: id.into(),
                region_key: "90210".into(),
                fields: PropertyFields {
                    address: "1 Elm St".into(),
                    owner: None,
                    estimated_value: None,
                    equity_percent: None,
                    vacant: None,
                    tags: Vec::new(),
                },
                extracted_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn test_appends_in_order_and_creates_parent() {
        let dir = TempDir::new().expect("temp dir");
        let store = FallbackStore::new(dir.path().join("state").join("fallback.jsonl"));

        assert!(store.read_all().await.expect("missing file").is_empty());

        store.append(&entry("a")).await.expect("append a");
        store.append(&entry("b")).await.expect("append b");

        let ids: Vec<_> = store
            .read_all()
            .await
            .expect("read back")
            .into_iter()
            .map(|e| e.record.source_id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);

        let raw = std::fs::read_to_string(store.path()).expect("raw file");
        assert_eq!(raw.lines().count(), 2);
    }
}
