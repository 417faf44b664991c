//! Destination sink and the upload path
//!
//! [`UploadAdapter`] owns the policy: retry transient failures through the
//! governor, spill exhausted records to the [`FallbackStore`], surface
//! permanent rejections. Sinks only know how to upsert one record.

pub mod adapter;
pub mod airtable;
pub mod fallback;

use async_trait::async_trait;

pub use adapter::{UploadAdapter, UploadOutcome, UploadStatus};
pub use airtable::AirtableSink;
pub use fallback::{FallbackEntry, FallbackStore};

use crate::error::UploadError;
use crate::extractor::PropertyRecord;

/// Upsert-capable destination keyed by `source_id`
///
/// Uploading the same `source_id` twice must leave a single entity.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn upsert(&self, record: &PropertyRecord) -> Result<(), UploadError>;
}
