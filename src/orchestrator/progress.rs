//! Progress reporting abstraction for scrape runs
//!
//! Defines the `ProgressReporter` trait for lifecycle events. The binary uses
//! [`LogProgress`]; tests and embedders that don't care use [`NoOpProgress`].

use log::{info, warn};

use super::report::{RegionReport, RunReport};
use crate::sink::{UploadOutcome, UploadStatus};

pub trait ProgressReporter: Send + Sync {
    /// Run started with `total` configured regions, `skipped` already done
    fn report_run_started(&self, total: usize, skipped: usize);

    fn report_region_started(&self, region_key: &str);

    /// A page of `candidates` raw cards arrived
    fn report_page_loaded(&self, region_key: &str, candidates: usize);

    fn report_record_uploaded(&self, outcome: &UploadOutcome);

    fn report_region_finished(&self, report: &RegionReport);

    fn report_error(&self, region_key: &str, error: &str);

    fn report_completed(&self, report: &RunReport);
}

/// Progress reporter that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressReporter for NoOpProgress {
    #[inline(always)]
    fn report_run_started(&self, _total: usize, _skipped: usize) {}

    #[inline(always)]
    fn report_region_started(&self, _region_key: &str) {}

    #[inline(always)]
    fn report_page_loaded(&self, _region_key: &str, _candidates: usize) {}

    #[inline(always)]
    fn report_record_uploaded(&self, _outcome: &UploadOutcome) {}

    #[inline(always)]
    fn report_region_finished(&self, _report: &RegionReport) {}

    #[inline(always)]
    fn report_error(&self, _region_key: &str, _error: &str) {}

    #[inline(always)]
    fn report_completed(&self, _report: &RunReport) {}
}

/// Writes lifecycle events to the `log` facade
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressReporter for LogProgress {
    fn report_run_started(&self, total: usize, skipped: usize) {
        info!("Run started: {total} region(s), {skipped} already completed");
    }

    fn report_region_started(&self, region_key: &str) {
        info!("Region {region_key}: started");
    }

    fn report_page_loaded(&self, region_key: &str, candidates: usize) {
        info!("Region {region_key}: page with {candidates} card(s)");
    }

    fn report_record_uploaded(&self, outcome: &UploadOutcome) {
        match outcome.status {
            UploadStatus::Committed => {}
            UploadStatus::QueuedLocally => {
                warn!("Record {} queued locally", outcome.record_ref);
            }
            UploadStatus::Rejected => warn!("Record {} rejected by sink", outcome.record_ref),
        }
    }

    fn report_region_finished(&self, report: &RegionReport) {
        info!(
            "Region {}: {} ({} extracted, {} committed, {} queued, {} rejected)",
            report.region_key,
            report.status,
            report.records_extracted,
            report.records_committed,
            report.records_fallen_back,
            report.records_rejected
        );
    }

    fn report_error(&self, region_key: &str, error: &str) {
        warn!("Region {region_key}: {error}");
    }

    fn report_completed(&self, report: &RunReport) {
        match serde_json::to_string(&report.regions) {
            Ok(regions) => info!("Per-region results: {regions}"),
            Err(e) => warn!("Per-region results could not be serialized: {e}"),
        }
        if report.succeeded() {
            info!("{report}");
        } else {
            warn!("{report}");
        }
    }
}
