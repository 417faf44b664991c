//! Run configuration
//!
//! `RunConfig` is built once at startup (file, environment, or builder) and
//! passed by reference into every component. Validation failures here are
//! the only errors that stop the process before a region runs.

pub mod builder;
pub mod getters;
pub mod loader;
pub mod presets;
pub mod types;

pub use builder::RunConfigBuilder;
pub use types::{
    CircuitSettings, FilterPredicate, FilterValue, PacingSettings, RegionSpec, RegionTarget,
    RetrySettings, RunConfig, Secret,
};
