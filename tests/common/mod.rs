//! Fakes and helpers shared by the dealscrape integration tests

use async_trait::async_trait;
use dealscrape::config::{FilterPredicate, RegionSpec, RunConfig, RunConfigBuilder};
use dealscrape::error::UploadError;
use dealscrape::extractor::PropertyRecord;
use dealscrape::sink::RecordSink;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

#[allow(unused_imports)]
pub use dealscrape::session::fake::{FakeLauncher, FakeWorld};

#[derive(Default)]
struct SinkState {
    entities: HashMap<String, PropertyRecord>,
    calls: Vec<String>,
    transient_left: u32,
    always_transient: bool,
    rejected_ids: HashSet<String>,
}

/// Upsert store keyed by `source_id` that records every call
#[derive(Clone, Default)]
pub struct FakeSink(Arc<Mutex<SinkState>>);

#[allow(dead_code)]
impl FakeSink {
    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Fail the next `count` calls with a transient error
    pub fn fail_transiently(self, count: u32) -> Self {
        self.lock().transient_left = count;
        self
    }

    /// Every call fails with a transient error
    pub fn unreachable(self) -> Self {
        self.lock().always_transient = true;
        self
    }

    /// Schema-reject the record with this id
    pub fn reject(self, source_id: &str) -> Self {
        self.lock().rejected_ids.insert(source_id.to_string());
        self
    }

    /// `source_id` of every upsert call, in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn entity_count(&self) -> usize {
        self.lock().entities.len()
    }

    pub fn entity(&self, source_id: &str) -> Option<PropertyRecord> {
        self.lock().entities.get(source_id).cloned()
    }
}

#[async_trait]
impl RecordSink for FakeSink {
    async fn upsert(&self, record: &PropertyRecord) -> Result<(), UploadError> {
        let mut state = self.lock();
        state.calls.push(record.source_id.clone());
        if state.always_transient {
            return Err(UploadError::Transient("503 service unavailable".into()));
        }
        if state.transient_left > 0 {
            state.transient_left -= 1;
            return Err(UploadError::Transient("429 too many requests".into()));
        }
        if state.rejected_ids.contains(&record.source_id) {
            return Err(UploadError::Permanent("422 unknown field".into()));
        }
        state
            .entities
            .insert(record.source_id.clone(), record.clone());
        Ok(())
    }
}

/// A valid result card
#[allow(dead_code)]
pub fn card(id: &str, address: &str) -> Value {
    json!({
        "sourceId": id,
        "address": address,
        "owner": "Pat Doe",
        "estimatedValue": "$245,000",
        "equityPercent": "62%",
        "vacant": "no",
        "tags": ["Absentee"]
    })
}

/// Region entry with explicit filters
#[allow(dead_code)]
pub fn filtered_region(key: &str, filters: &[&str]) -> RegionSpec {
    RegionSpec::Detailed {
        key: key.to_string(),
        preset: None,
        filters: filters.iter().map(|f| FilterPredicate::toggle(*f)).collect(),
    }
}

/// Zero-delay config builder with state files inside `dir`
#[allow(dead_code)]
pub fn config_builder<I, R>(dir: &TempDir, regions: I) -> RunConfigBuilder
where
    I: IntoIterator<Item = R>,
    R: Into<RegionSpec>,
{
    RunConfig::builder()
        .login_email("ops@example.com")
        .login_secret("hunter2")
        .sink_api_key("key")
        .sink_endpoint_id("app123")
        .sink_collection_name("Leads")
        .regions(regions)
        .without_delays()
        .circuit_breaker(false)
        .checkpoint_path(dir.path().join("checkpoint.json"))
        .fallback_path(dir.path().join("fallback.jsonl"))
}

#[allow(dead_code)]
pub fn config<I, R>(dir: &TempDir, regions: I) -> RunConfig
where
    I: IntoIterator<Item = R>,
    R: Into<RegionSpec>,
{
    config_builder(dir, regions)
        .build()
        .expect("test config is valid")
}
