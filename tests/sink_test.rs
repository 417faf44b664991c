//! Upload path: idempotence, fallback, and the Airtable wire format

mod common;

use chrono::Utc;
use common::{FakeLauncher, FakeSink, FakeWorld, card, config};
use dealscrape::RunOrchestrator;
use dealscrape::config::Secret;
use dealscrape::error::UploadError;
use dealscrape::extractor::{PropertyFields, PropertyRecord};
use dealscrape::governor::{Governor, RetryPolicy};
use dealscrape::sink::{
    AirtableSink, FallbackStore, RecordSink, UploadAdapter, UploadStatus,
};
use mockito::{Matcher, Server};
use serde_json::json;
use tempfile::TempDir;

fn record(id: &str) -> PropertyRecord {
    PropertyRecord {
        source_id: id.to_string(),
        region_key: "90210".into(),
        fields: PropertyFields {
            address: "123 Main St".into(),
            owner: Some("Jane Roe".into()),
            estimated_value: Some(245_000.0),
            equity_percent: Some(62.0),
            vacant: Some(true),
            tags: vec!["Vacant".into()],
        },
        extracted_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_reupload_leaves_one_entity() {
    let dir = TempDir::new().expect("temp dir");
    let sink = FakeSink::default();
    let adapter = UploadAdapter::new(
        sink.clone(),
        Governor::new(RetryPolicy::immediate(4)),
        FallbackStore::new(dir.path().join("fallback.jsonl")),
    );

    let mut changed = record("dm-1");
    adapter.upload(&record("dm-1")).await.expect("first upload");
    changed.fields.owner = Some("New Owner".into());
    let outcome = adapter.upload(&changed).await.expect("second upload");

    assert_eq!(outcome.status, UploadStatus::Committed);
    assert_eq!(sink.calls().len(), 2);
    assert_eq!(sink.entity_count(), 1);
    assert_eq!(
        sink.entity("dm-1").and_then(|r| r.fields.owner),
        Some("New Owner".to_string())
    );
}

#[tokio::test]
async fn test_unreachable_sink_spills_to_fallback_without_failing_run() {
    let dir = TempDir::new().expect("temp dir");
    let world = FakeWorld::default().with_pages(
        "11111",
        vec![vec![card("a", "1 Elm St"), card("b", "2 Elm St")]],
    );
    let sink = FakeSink::default().unreachable();
    let config = config(&dir, ["11111"]);

    let report = RunOrchestrator::new(&config, FakeLauncher::new(&world), sink.clone())
        .run()
        .await
        .expect("run completes");

    assert_eq!(report.records_committed, 0);
    assert_eq!(report.records_fallen_back, 2);
    assert_eq!(report.exit_code(), 0);
    // default budget of four attempts per record
    assert_eq!(sink.calls().len(), 8);

    let queued = FallbackStore::new(config.fallback_path())
        .read_all()
        .await
        .expect("fallback log");
    let ids: Vec<_> = queued.iter().map(|e| e.record.source_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert!(queued.iter().all(|e| e.attempts == 4));
}

#[tokio::test]
async fn test_transient_sink_failures_are_absorbed() {
    let dir = TempDir::new().expect("temp dir");
    let world = FakeWorld::default().with_pages("11111", vec![vec![card("a", "1 Elm St")]]);
    let sink = FakeSink::default().fail_transiently(2);
    let config = config(&dir, ["11111"]);

    let report = RunOrchestrator::new(&config, FakeLauncher::new(&world), sink.clone())
        .run()
        .await
        .expect("run completes");

    assert_eq!(report.records_committed, 1);
    assert_eq!(report.records_fallen_back, 0);
    assert_eq!(sink.calls(), vec!["a", "a", "a"]);
}

#[tokio::test]
async fn test_airtable_upsert_request_shape() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PATCH", "/app123/Leads")
        .match_header("authorization", "Bearer pat-secret")
        .match_body(Matcher::PartialJson(json!({
            "performUpsert": { "fieldsToMergeOn": ["Source ID"] },
            "records": [{
                "fields": {
                    "Source ID": "dm-1",
                    "Property Address": "123 Main St",
                    "Owner Name": "Jane Roe",
                    "Estimated Value": 245000.0,
                    "Equity Percent": 62.0,
                    "Vacant": true,
                    "Status": "Vacant",
                    "Source ZIP": "90210"
                }
            }]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"records":[]}"#)
        .create_async()
        .await;

    let sink = AirtableSink::new(&server.url(), "app123", "Leads", Secret::new("pat-secret"))
        .expect("sink");
    sink.upsert(&record("dm-1")).await.expect("upsert succeeds");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_airtable_upload_is_cut_to_live_schema() {
    let mut server = Server::new_async().await;
    let schema = server
        .mock("GET", "/meta/bases/app123/tables")
        .match_header("authorization", "Bearer pat-secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "tables": [
                    { "id": "tblOther", "name": "Archive", "fields": [{ "name": "Equity Percent" }] },
                    { "id": "tblLeads", "name": "Leads", "fields": [
                        { "name": "Source ID" },
                        { "name": "Property Address" },
                        { "name": "Owner Name" },
                        { "name": "Estimated Value" },
                        { "name": "Vacant" },
                        { "name": "Status" },
                        { "name": "Source ZIP" },
                        { "name": "Notes" }
                    ]}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let upsert = server
        .mock("PATCH", "/app123/Leads")
        .match_body(Matcher::Json(json!({
            "performUpsert": { "fieldsToMergeOn": ["Source ID"] },
            "records": [{
                "fields": {
                    "Source ID": "dm-1",
                    "Property Address": "123 Main St",
                    "Owner Name": "Jane Roe",
                    "Estimated Value": 245000.0,
                    "Vacant": true,
                    "Status": "Vacant",
                    "Source ZIP": "90210"
                }
            }]
        })))
        .with_status(200)
        .with_body(r#"{"records":[]}"#)
        .expect(2)
        .create_async()
        .await;

    let sink = AirtableSink::new(&server.url(), "app123", "Leads", Secret::new("pat-secret"))
        .expect("sink");
    sink.upsert(&record("dm-1")).await.expect("first upsert");
    sink.clone().upsert(&record("dm-1")).await.expect("second upsert");

    schema.assert_async().await;
    upsert.assert_async().await;
}

#[tokio::test]
async fn test_airtable_status_classification() {
    let mut server = Server::new_async().await;
    let sink = AirtableSink::new(&server.url(), "app123", "Leads", Secret::new("k")).expect("sink");

    let limited = server
        .mock("PATCH", "/app123/Leads")
        .with_status(429)
        .with_body("rate limited")
        .create_async()
        .await;
    let err = sink.upsert(&record("dm-1")).await.expect_err("429 fails");
    assert!(matches!(err, UploadError::Transient(_)));
    limited.remove_async().await;

    let unprocessable = server
        .mock("PATCH", "/app123/Leads")
        .with_status(422)
        .with_body(r#"{"error":{"type":"UNKNOWN_FIELD_NAME"}}"#)
        .create_async()
        .await;
    let err = sink.upsert(&record("dm-1")).await.expect_err("422 fails");
    assert!(matches!(err, UploadError::Permanent(ref detail) if detail.contains("UNKNOWN_FIELD_NAME")));
    unprocessable.remove_async().await;
}

#[tokio::test]
async fn test_airtable_outage_queues_locally() {
    let dir = TempDir::new().expect("temp dir");
    let mut server = Server::new_async().await;
    let outage = server
        .mock("PATCH", "/app123/Leads")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let adapter = UploadAdapter::new(
        AirtableSink::new(&server.url(), "app123", "Leads", Secret::new("k")).expect("sink"),
        Governor::new(RetryPolicy::immediate(2)),
        FallbackStore::new(dir.path().join("fallback.jsonl")),
    );

    let outcome = adapter.upload(&record("dm-9")).await.expect("upload");
    assert_eq!(outcome.status, UploadStatus::QueuedLocally);
    assert_eq!(outcome.attempts, 2);
    outage.assert_async().await;
    assert_eq!(adapter.fallback().read_all().await.expect("read").len(), 1);
}
