use chrono::Utc;
use log::{error, info, warn};

use super::RecordSink;
use super::fallback::{FallbackEntry, FallbackStore};
use crate::error::{FallbackError, UploadError};
use crate::extractor::PropertyRecord;
use crate::governor::{Governor, GovernorError};

const UPLOAD_LABEL: &str = "upload";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Sink acknowledged the upsert
    Committed,
    /// Sink kept failing transiently; the record is in the fallback log
    QueuedLocally,
    /// Sink refused the record; not retried
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// `source_id` of the uploaded record
    pub record_ref: String,
    pub status: UploadStatus,
    pub attempts: u32,
}

/// Upload policy around a [`RecordSink`]
pub struct UploadAdapter<K> {
    sink: K,
    governor: Governor,
    fallback: FallbackStore,
}

impl<K: RecordSink> UploadAdapter<K> {
    /// `governor` should be unpaced; pacing is for the web surface only
    pub fn new(sink: K, governor: Governor, fallback: FallbackStore) -> Self {
        Self {
            sink,
            governor,
            fallback,
        }
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn fallback(&self) -> &FallbackStore {
        &self.fallback
    }

    /// Upload one record
    ///
    /// Transient failures are retried; once the budget is spent (or the
    /// upload circuit is open) the record is appended to the fallback log.
    ///
    /// # Errors
    /// Only when the fallback log itself cannot be written, since the record
    /// would otherwise be lost.
    pub async fn upload(&self, record: &PropertyRecord) -> Result<UploadOutcome, FallbackError> {
        let sink = &self.sink;
        let result = self
            .governor
            .execute(UPLOAD_LABEL, move || sink.upsert(record))
            .await;

        let outcome = |status, attempts| UploadOutcome {
            record_ref: record.source_id.clone(),
            status,
            attempts,
        };

        match result {
            Ok(done) => Ok(outcome(UploadStatus::Committed, done.attempts)),
            Err(GovernorError::Fatal {
                attempt,
                error: UploadError::Permanent(reason),
                ..
            }) => {
                error!("Sink rejected {}: {reason}", record.source_id);
                Ok(outcome(UploadStatus::Rejected, attempt))
            }
            Err(GovernorError::Fatal { attempt, error, .. }) => {
                // Only permanent errors are non-retryable; keep the record anyway
                self.spill(record, error.to_string(), attempt).await?;
                Ok(outcome(UploadStatus::QueuedLocally, attempt))
            }
            Err(GovernorError::Exhausted {
                attempts, error, ..
            }) => {
                warn!(
                    "Upload of {} exhausted after {attempts} attempt(s): {error}",
                    record.source_id
                );
                self.spill(record, error.to_string(), attempts).await?;
                Ok(outcome(UploadStatus::QueuedLocally, attempts))
            }
            Err(GovernorError::CircuitOpen { .. }) => {
                warn!("Upload circuit open, queueing {} locally", record.source_id);
                self.spill(record, "upload circuit open".to_string(), 0)
                    .await?;
                Ok(outcome(UploadStatus::QueuedLocally, 0))
            }
        }
    }

    async fn spill(
        &self,
        record: &PropertyRecord,
        reason: String,
        attempts: u32,
    ) -> Result<(), FallbackError> {
        let entry = FallbackEntry {
            queued_at: Utc::now(),
            reason,
            attempts,
            record: record.clone(),
        };
        self.fallback.append(&entry).await?;
        info!(
            "Queued {} in fallback log {}",
            record.source_id,
            self.fallback.path().display()
        );
        Ok(())
    }
}
