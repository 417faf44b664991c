//! The run loop
//!
//! Regions are processed strictly one after another on a single session.
//! A region's failure is recorded and the run moves on; the only failure
//! that stops the run is rejected credentials.

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::progress::{NoOpProgress, ProgressReporter};
use super::report::{RegionReport, RunReport};
use crate::config::{RegionTarget, RunConfig};
use crate::error::{FallbackError, NavigationError, RunError, SessionError};
use crate::extractor::{PropertyRecord, RegionExtractor, enrich};
use crate::governor::Governor;
use crate::navigation::{NavigationDriver, PageLoad};
use crate::regions::{CheckpointStore, Region, RegionIterator, RegionStatus};
use crate::session::{Credentials, SessionManager, SurfaceLauncher, WebSurface};
use crate::sink::{FallbackStore, RecordSink, UploadAdapter, UploadStatus};

/// Why a region stopped early
#[derive(Debug, Error)]
enum RegionFailure {
    /// Credentials refused; ends the whole run
    #[error(transparent)]
    Auth(SessionError),

    #[error(transparent)]
    Session(SessionError),

    #[error(transparent)]
    Navigation(NavigationError),

    #[error(transparent)]
    Fallback(FallbackError),
}

impl From<SessionError> for RegionFailure {
    fn from(error: SessionError) -> Self {
        if error.is_fatal() {
            Self::Auth(error)
        } else {
            Self::Session(error)
        }
    }
}

impl RegionFailure {
    /// The session could not be (re)established or kept for this region
    fn is_session_failure(&self) -> bool {
        match self {
            Self::Session(_) => true,
            Self::Navigation(e) => e.is_session_lost(),
            Self::Auth(_) | Self::Fallback(_) => false,
        }
    }
}

pub struct RunOrchestrator<L: SurfaceLauncher, K: RecordSink> {
    targets: Vec<RegionTarget>,
    sessions: SessionManager<L>,
    driver: NavigationDriver,
    uploader: UploadAdapter<K>,
    checkpoint: CheckpointStore,
    session_recoveries: u32,
    /// Detail views allowed per region; `None` when the deep scrape is off
    detail_limit: Option<usize>,
    progress: Arc<dyn ProgressReporter>,
    cancel: CancellationToken,
}

impl<L: SurfaceLauncher, K: RecordSink> RunOrchestrator<L, K> {
    /// Wire every component from one config snapshot
    ///
    /// Every UI step (login and navigation alike) is paced on its own;
    /// uploads are not. All governors share the run's circuit breaker, keyed
    /// by operation label.
    pub fn new(config: &RunConfig, launcher: L, sink: K) -> Self {
        let breaker = config.circuit_breaker();
        let with_breaker = |governor: Governor| match &breaker {
            Some(breaker) => governor.with_circuit_breaker(Arc::clone(breaker)),
            None => governor,
        };

        let retry = config.retry_policy();
        let ui = with_breaker(Governor::new(retry).with_pacing(config.pacing_policy()));
        let upload = with_breaker(Governor::new(retry));

        let credentials = Credentials::new(config.login_email(), config.login_secret().clone());

        Self {
            targets: config.regions().to_vec(),
            sessions: SessionManager::new(
                launcher,
                credentials,
                ui.clone(),
                config.max_login_attempts(),
            ),
            driver: NavigationDriver::new(ui, config.max_scrolls()),
            uploader: UploadAdapter::new(
                sink,
                upload,
                FallbackStore::new(config.fallback_path()),
            ),
            checkpoint: CheckpointStore::new(config.checkpoint_path()),
            session_recoveries: config.session_recoveries(),
            detail_limit: config.deep_scrape_limit(),
            progress: Arc::new(NoOpProgress),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop at the next region boundary once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn sink(&self) -> &K {
        self.uploader.sink()
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    /// Process every pending region and return the final report
    ///
    /// The browser is closed before returning, whatever the outcome.
    ///
    /// # Errors
    ///
    /// `RunError::Checkpoint` when the existing checkpoint cannot be read.
    /// Every later failure, a failed checkpoint write included, is recorded
    /// in the report instead.
    pub async fn run(&mut self) -> Result<RunReport, RunError> {
        let result = self.run_regions().await;
        self.sessions.shutdown().await;
        let mut report = result?;
        report.finished_at = Some(chrono::Utc::now());
        self.progress.report_completed(&report);
        Ok(report)
    }

    /// Run fresh cycles `interval` apart
    ///
    /// The checkpoint is reset after each cycle that fully succeeded, so the
    /// next one starts from the first region. Stops after `cycles` cycles
    /// (never when `None`), after a cycle that did not succeed, or when the
    /// cancellation token fires. Returns the last cycle's report.
    ///
    /// # Errors
    ///
    /// Same as [`RunOrchestrator::run`].
    pub async fn run_continuous(
        &mut self,
        cycles: Option<usize>,
        interval: Duration,
    ) -> Result<RunReport, RunError> {
        let mut cycle = 0;
        loop {
            cycle += 1;
            let mut report = self.run().await?;

            if !report.succeeded() {
                warn!("Cycle {cycle} did not complete cleanly, leaving the checkpoint for a resumed run");
                return Ok(report);
            }
            if cycles.is_some_and(|limit| cycle >= limit) {
                return Ok(report);
            }
            if let Err(e) = self.checkpoint.reset() {
                error!("Checkpoint reset failed, not starting another cycle: {e}");
                report.checkpoint_error = Some(e.to_string());
                return Ok(report);
            }

            info!("Cycle {cycle} complete, next one in {}s", interval.as_secs());
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Cancelled while waiting for the next cycle");
                    return Ok(report);
                }
                () = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn run_regions(&mut self) -> Result<RunReport, RunError> {
        let checkpoint = self.checkpoint.load()?;
        let mut regions = RegionIterator::new(&self.targets, &checkpoint);
        let mut report = RunReport::new(regions.total(), regions.skipped());
        self.progress
            .report_run_started(regions.total(), regions.skipped());

        let mut writable = self.persist(&regions, &mut report);
        while writable {
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping before the next region");
                report.cancelled = true;
                break;
            }
            let Some(region) = regions.next() else {
                break;
            };

            regions.mark(&region.key, RegionStatus::InProgress);
            if !self.persist(&regions, &mut report) {
                regions.mark(&region.key, RegionStatus::Pending);
                break;
            }
            self.progress.report_region_started(&region.key);

            let mut region_report = RegionReport::new(region.key.clone());
            let outcome = self.process_region(&region, &mut region_report).await;

            let mut stop = false;
            region_report.status = match outcome {
                Ok(()) if region_report.records_rejected == 0 => RegionStatus::Completed,
                Ok(()) => {
                    region_report.error = Some(format!(
                        "{} record(s) rejected by the sink",
                        region_report.records_rejected
                    ));
                    RegionStatus::Failed
                }
                Err(failure) => {
                    let message = failure.to_string();
                    self.progress.report_error(&region.key, &message);
                    if let RegionFailure::Auth(_) = failure {
                        error!("Credentials rejected, stopping the run: {message}");
                        report.auth_failed = true;
                        stop = true;
                    } else if failure.is_session_failure() {
                        report.session_failures += 1;
                    }
                    region_report.error = Some(message);
                    RegionStatus::Failed
                }
            };

            regions.mark(&region.key, region_report.status);
            writable = self.persist(&regions, &mut report);
            self.progress.report_region_finished(&region_report);
            report.absorb(region_report);

            if stop {
                break;
            }
        }

        report.regions_pending = regions.pending();
        Ok(report)
    }

    /// Write the iterator state; on failure record it and return false
    fn persist(&self, regions: &RegionIterator, report: &mut RunReport) -> bool {
        match self.checkpoint.save(&regions.snapshot()) {
            Ok(()) => true,
            Err(e) => {
                error!("Checkpoint write failed, stopping at this region boundary: {e}");
                report.checkpoint_error = Some(e.to_string());
                false
            }
        }
    }

    async fn process_region(
        &mut self,
        region: &Region,
        report: &mut RegionReport,
    ) -> Result<(), RegionFailure> {
        let Self {
            sessions,
            driver,
            uploader,
            progress,
            session_recoveries,
            detail_limit,
            ..
        } = self;

        driver.begin_region(&region.key);
        let mut extractor = RegionExtractor::new(region.key.clone());

        let result = loop {
            let session = match sessions.acquire().await {
                Ok(session) => session,
                Err(e) => break Err(RegionFailure::from(e)),
            };

            let attempt = scrape_region(
                driver,
                uploader,
                &**progress,
                session.surface_mut(),
                region,
                &mut extractor,
                *detail_limit,
                report,
            )
            .await;

            match attempt {
                Err(RegionFailure::Navigation(NavigationError::Surface { source, .. }))
                    if source.is_session_lost() && report.session_recoveries < *session_recoveries =>
                {
                    report.session_recoveries += 1;
                    warn!(
                        "Region {}: session lost ({source}), re-authenticating ({}/{})",
                        region.key, report.session_recoveries, session_recoveries
                    );
                    sessions.report_lost(&source);
                    driver.restart_pagination();
                }
                other => break other,
            }
        };

        report.records_extracted = extractor.extracted();
        report.candidates_invalid = extractor.invalid();
        report.duplicates_dropped = extractor.duplicates();
        result
    }
}

/// Filters, then pages until exhausted, uploading as records appear
#[allow(clippy::too_many_arguments)]
async fn scrape_region<S, K>(
    driver: &mut NavigationDriver,
    uploader: &UploadAdapter<K>,
    progress: &dyn ProgressReporter,
    surface: &mut S,
    region: &Region,
    extractor: &mut RegionExtractor,
    detail_limit: Option<usize>,
    report: &mut RegionReport,
) -> Result<(), RegionFailure>
where
    S: WebSurface + ?Sized,
    K: RecordSink,
{
    driver
        .apply_filters(surface, region)
        .await
        .map_err(RegionFailure::Navigation)?;

    loop {
        let page = match driver
            .load_page(surface)
            .await
            .map_err(RegionFailure::Navigation)?
        {
            PageLoad::Page(page) => page,
            PageLoad::Exhausted => return Ok(()),
        };
        report.pages += 1;
        progress.report_page_loaded(&region.key, page.candidates.len());

        // A session lost while reading details still lets this page upload
        let mut lost = None;
        for mut record in extractor.process(page) {
            if let Some(limit) = detail_limit
                && lost.is_none()
                && report.detail_views < limit
            {
                report.detail_views += 1;
                if let Err(e) = read_details(driver, surface, &mut record, report).await {
                    lost = Some(e);
                }
            }
            let outcome = uploader
                .upload(&record)
                .await
                .map_err(RegionFailure::Fallback)?;
            match outcome.status {
                UploadStatus::Committed => report.records_committed += 1,
                UploadStatus::QueuedLocally => report.records_fallen_back += 1,
                UploadStatus::Rejected => report.records_rejected += 1,
            }
            progress.report_record_uploaded(&outcome);
        }
        if let Some(e) = lost {
            return Err(RegionFailure::Navigation(e));
        }
    }
}

/// Open the record's detail view and fold its text into the record
///
/// Only a lost session is returned; any other failure leaves the record as
/// the card showed it.
async fn read_details<S>(
    driver: &NavigationDriver,
    surface: &mut S,
    record: &mut PropertyRecord,
    report: &mut RegionReport,
) -> Result<(), NavigationError>
where
    S: WebSurface + ?Sized,
{
    match driver
        .card_details(surface, &record.source_id, &record.fields.address)
        .await
    {
        Ok(Some(text)) => {
            if enrich(record, &text) {
                report.records_enriched += 1;
            }
        }
        Ok(None) => debug!("No detail view for {}", record.source_id),
        Err(e) if e.is_session_lost() => return Err(e),
        Err(e) => warn!("Detail view of {} unreadable: {e}", record.source_id),
    }
    Ok(())
}
