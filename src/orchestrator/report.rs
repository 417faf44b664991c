use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::regions::RegionStatus;

/// Outcome of one region
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionReport {
    pub region_key: String,
    pub status: RegionStatus,
    pub pages: usize,
    pub records_extracted: usize,
    pub records_committed: usize,
    pub records_fallen_back: usize,
    pub records_rejected: usize,
    pub candidates_invalid: usize,
    pub duplicates_dropped: usize,
    /// Card detail views opened by the deep scrape
    pub detail_views: usize,
    pub records_enriched: usize,
    /// Re-authentications performed mid-region
    pub session_recoveries: u32,
    pub error: Option<String>,
}

impl RegionReport {
    #[must_use]
    pub fn new(region_key: impl Into<String>) -> Self {
        Self {
            region_key: region_key.into(),
            status: RegionStatus::InProgress,
            pages: 0,
            records_extracted: 0,
            records_committed: 0,
            records_fallen_back: 0,
            records_rejected: 0,
            candidates_invalid: 0,
            duplicates_dropped: 0,
            detail_views: 0,
            records_enriched: 0,
            session_recoveries: 0,
            error: None,
        }
    }
}

/// Final tally of a run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub regions_total: usize,
    /// Completed in an earlier run, not attempted again
    pub regions_skipped: usize,
    pub regions_processed: usize,
    pub regions_completed: usize,
    pub regions_failed: usize,
    /// Never attempted (cancellation, a fatal auth failure or an unwritable checkpoint)
    pub regions_pending: usize,
    pub records_extracted: usize,
    pub records_committed: usize,
    pub records_fallen_back: usize,
    pub records_rejected: usize,
    pub candidates_invalid: usize,
    pub duplicates_dropped: usize,
    pub records_enriched: usize,
    /// Regions lost to session failures that re-authentication couldn't fix
    pub session_failures: usize,
    pub auth_failed: bool,
    pub cancelled: bool,
    /// Set when run state could not be persisted; the run stopped there
    pub checkpoint_error: Option<String>,
    pub regions: Vec<RegionReport>,
}

impl RunReport {
    #[must_use]
    pub fn new(regions_total: usize, regions_skipped: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            regions_total,
            regions_skipped,
            regions_processed: 0,
            regions_completed: 0,
            regions_failed: 0,
            regions_pending: 0,
            records_extracted: 0,
            records_committed: 0,
            records_fallen_back: 0,
            records_rejected: 0,
            candidates_invalid: 0,
            duplicates_dropped: 0,
            records_enriched: 0,
            session_failures: 0,
            auth_failed: false,
            cancelled: false,
            checkpoint_error: None,
            regions: Vec::new(),
        }
    }

    /// Fold a finished region into the totals
    pub fn absorb(&mut self, region: RegionReport) {
        self.regions_processed += 1;
        match region.status {
            RegionStatus::Completed => self.regions_completed += 1,
            RegionStatus::Failed => self.regions_failed += 1,
            RegionStatus::Pending | RegionStatus::InProgress => {}
        }
        self.records_extracted += region.records_extracted;
        self.records_committed += region.records_committed;
        self.records_fallen_back += region.records_fallen_back;
        self.records_rejected += region.records_rejected;
        self.candidates_invalid += region.candidates_invalid;
        self.duplicates_dropped += region.duplicates_dropped;
        self.records_enriched += region.records_enriched;
        self.regions.push(region);
    }

    /// Every region completed, nothing rejected, no session lost for good
    ///
    /// Records queued in the fallback log do not fail a run.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.regions_failed == 0
            && self.records_rejected == 0
            && self.session_failures == 0
            && self.regions_pending == 0
            && !self.auth_failed
            && !self.cancelled
            && self.checkpoint_error.is_none()
    }

    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.succeeded())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Run {}: regions {}/{} processed ({} completed, {} failed, {} skipped, {} pending); \
             records {} extracted, {} enriched, {} committed, {} queued locally, {} rejected; \
             {} invalid candidate(s), {} duplicate(s), {} session failure(s)",
            if self.succeeded() { "succeeded" } else { "failed" },
            self.regions_processed,
            self.regions_total,
            self.regions_completed,
            self.regions_failed,
            self.regions_skipped,
            self.regions_pending,
            self.records_extracted,
            self.records_enriched,
            self.records_committed,
            self.records_fallen_back,
            self.records_rejected,
            self.candidates_invalid,
            self.duplicates_dropped,
            self.session_failures
        )?;
        if self.auth_failed {
            f.write_str("; stopped: credentials rejected")?;
        } else if let Some(error) = &self.checkpoint_error {
            write!(f, "; stopped: checkpoint not writable ({error})")?;
        } else if self.cancelled {
            f.write_str("; stopped: cancelled")?;
        }
        Ok(())
    }
}
