//! Interrupted runs resume from the checkpoint

mod common;

use common::{FakeLauncher, FakeSink, FakeWorld, card, config, filtered_region};
use dealscrape::orchestrator::{ProgressReporter, RegionReport, RunReport};
use dealscrape::regions::{CheckpointStore, RegionStatus};
use dealscrape::sink::UploadOutcome;
use dealscrape::RunOrchestrator;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Requests cancellation as soon as the first region finishes
struct StopAfterFirstRegion(CancellationToken);

impl ProgressReporter for StopAfterFirstRegion {
    fn report_run_started(&self, _total: usize, _skipped: usize) {}
    fn report_region_started(&self, _region_key: &str) {}
    fn report_page_loaded(&self, _region_key: &str, _candidates: usize) {}
    fn report_record_uploaded(&self, _outcome: &UploadOutcome) {}
    fn report_region_finished(&self, _report: &RegionReport) {
        self.0.cancel();
    }
    fn report_error(&self, _region_key: &str, _error: &str) {}
    fn report_completed(&self, _report: &RunReport) {}
}

fn world() -> FakeWorld {
    FakeWorld::default()
        .with_pages("11111", vec![vec![card("r1-a", "1 Oak St"), card("r1-b", "2 Oak St")]])
        .with_pages("22222", vec![vec![card("r2-a", "1 Pine St")]])
}

#[tokio::test]
async fn test_resume_skips_completed_region() {
    let dir = TempDir::new().expect("temp dir");
    let config = config(&dir, ["11111", "22222"]);

    let first_world = world();
    let first_sink = FakeSink::default();
    let token = CancellationToken::new();
    let interrupted = RunOrchestrator::new(&config, FakeLauncher::new(&first_world), first_sink.clone())
        .with_cancellation(token.clone())
        .with_progress(Arc::new(StopAfterFirstRegion(token)))
        .run()
        .await
        .expect("first run");

    assert!(interrupted.cancelled);
    assert_eq!(interrupted.regions_processed, 1);
    assert_eq!(interrupted.regions_pending, 1);
    assert_eq!(first_sink.calls(), vec!["r1-a", "r1-b"]);

    let second_world = world();
    let second_sink = FakeSink::default();
    let resumed = RunOrchestrator::new(&config, FakeLauncher::new(&second_world), second_sink.clone())
        .run()
        .await
        .expect("resumed run");

    assert_eq!(resumed.regions_skipped, 1);
    assert_eq!(resumed.regions_processed, 1);
    assert_eq!(resumed.exit_code(), 0);
    assert_eq!(second_world.searches(), vec!["22222"]);
    assert_eq!(second_sink.calls(), vec!["r2-a"]);

    let checkpoint = CheckpointStore::new(config.checkpoint_path())
        .load()
        .expect("checkpoint");
    assert_eq!(checkpoint.status("11111"), Some(RegionStatus::Completed));
    assert_eq!(checkpoint.status("22222"), Some(RegionStatus::Completed));
}

#[tokio::test]
async fn test_failed_region_is_retried_from_first_page() {
    let dir = TempDir::new().expect("temp dir");
    let regions = vec!["11111".into(), filtered_region("22222", &["Vacant"])];
    let config = config(&dir, regions);

    let broken = world().without_filter("Vacant");
    let first = RunOrchestrator::new(&config, FakeLauncher::new(&broken), FakeSink::default())
        .run()
        .await
        .expect("first run");
    assert_eq!(first.regions_failed, 1);

    let fixed = world();
    let sink = FakeSink::default();
    let second = RunOrchestrator::new(&config, FakeLauncher::new(&fixed), sink.clone())
        .run()
        .await
        .expect("second run");

    assert_eq!(second.regions_skipped, 1);
    assert_eq!(second.exit_code(), 0);
    assert_eq!(fixed.searches(), vec!["22222"]);
    assert_eq!(sink.calls(), vec!["r2-a"]);
}
