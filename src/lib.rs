//! dealscrape: scrape property listings region by region from an
//! authenticated web application and upsert them into a record store.
//!
//! The pieces, in the order a run uses them:
//!
//! - [`config`]: immutable [`RunConfig`] loaded once at startup
//! - [`session`]: one authenticated browser session behind [`session::WebSurface`]
//! - [`regions`]: ordered, resumable region queue and its checkpoint
//! - [`navigation`]: search, filters and scroll pagination
//! - [`extractor`]: raw cards to validated [`extractor::PropertyRecord`]s
//! - [`sink`]: upserts with retry and a local fallback log
//! - [`governor`]: the single retry/backoff/pacing policy all of the above use
//! - [`orchestrator`]: ties them together and produces the [`RunReport`]

pub mod browser;
pub mod config;
pub mod error;
pub mod extractor;
pub mod governor;
pub mod navigation;
pub mod orchestrator;
pub mod regions;
pub mod session;
pub mod sink;
pub mod utils;

pub use browser::{ChromiumLauncher, ChromiumSurface};
pub use config::{RunConfig, RunConfigBuilder};
pub use error::{
    CheckpointError, ConfigError, FallbackError, FilterError, NavigationError, RunError,
    SessionError, SurfaceError, UploadError, ValidationError,
};
pub use orchestrator::{LogProgress, NoOpProgress, ProgressReporter, RunOrchestrator, RunReport};
pub use sink::{AirtableSink, FallbackStore, RecordSink};
