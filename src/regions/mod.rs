//! Region work queue and its persisted checkpoint

pub mod checkpoint;
pub mod iterator;

pub use checkpoint::{CheckpointStore, RunCheckpoint};
pub use iterator::{Region, RegionIterator, RegionStatus};
