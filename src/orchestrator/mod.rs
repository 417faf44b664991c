//! Run orchestration: regions in order, one session, one report

pub mod progress;
pub mod report;
pub mod run;

pub use progress::{LogProgress, NoOpProgress, ProgressReporter};
pub use report::{RegionReport, RunReport};
pub use run::RunOrchestrator;
