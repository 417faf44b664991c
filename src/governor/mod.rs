//! Retry, backoff, pacing and circuit-breaking for external interactions

pub mod circuit_breaker;
pub mod policy;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState, OperationHealth};
pub use policy::{PacingPolicy, RetryPolicy};
pub use retry::{Attempted, Governor, GovernorError};
