//! Ordered, resumable queue of search regions

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::checkpoint::RunCheckpoint;
use crate::config::{FilterPredicate, RegionTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl fmt::Display for RegionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::InProgress => "in progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub key: String,
    pub filters: Vec<FilterPredicate>,
    pub status: RegionStatus,
}

/// Work queue in configured order
///
/// Yields each Pending region once, lazily. Regions recorded Completed in the
/// checkpoint are skipped; InProgress and Failed ones are retried from their
/// first page.
#[derive(Debug)]
pub struct RegionIterator {
    regions: Vec<Region>,
    cursor: usize,
    skipped: usize,
}

impl RegionIterator {
    #[must_use]
    pub fn new(targets: &[RegionTarget], checkpoint: &RunCheckpoint) -> Self {
        let regions: Vec<Region> = targets
            .iter()
            .map(|target| {
                let status = match checkpoint.status(&target.key) {
                    Some(RegionStatus::Completed) => RegionStatus::Completed,
                    _ => RegionStatus::Pending,
                };
                Region {
                    key: target.key.clone(),
                    filters: target.filters.clone(),
                    status,
                }
            })
            .collect();

        let skipped = regions
            .iter()
            .filter(|r| r.status == RegionStatus::Completed)
            .count();
        if skipped > 0 {
            info!("Skipping {skipped} region(s) already completed in the checkpoint");
        }

        Self {
            regions,
            cursor: 0,
            skipped,
        }
    }

    /// Record a status change made by the orchestrator
    pub fn mark(&mut self, region_key: &str, status: RegionStatus) {
        if let Some(region) = self.regions.iter_mut().find(|r| r.key == region_key) {
            region.status = status;
        }
    }

    #[must_use]
    pub fn status(&self, region_key: &str) -> Option<RegionStatus> {
        self.regions
            .iter()
            .find(|r| r.key == region_key)
            .map(|r| r.status)
    }

    /// Regions not yet attempted in this run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.regions
            .iter()
            .filter(|r| r.status == RegionStatus::Pending)
            .count()
    }

    /// Regions skipped because the checkpoint had them Completed
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.regions.len()
    }

    /// Current state of every region, for persisting
    #[must_use]
    pub fn snapshot(&self) -> RunCheckpoint {
        RunCheckpoint {
            regions: self
                .regions
                .iter()
                .map(|r| (r.key.clone(), r.status))
                .collect(),
            updated_at: chrono::Utc::now(),
        }
    }
}

impl Iterator for RegionIterator {
    type Item = Region;

    fn next(&mut self) -> Option<Region> {
        while let Some(region) = self.regions.get(self.cursor) {
            self.cursor += 1;
            if region.status == RegionStatus::Pending {
                return Some(region.clone());
            }
        }
        None
    }
}
