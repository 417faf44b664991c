//! Circuit breaker keyed by operation class
//!
//! Login, navigation and upload each get their own circuit. A circuit opens
//! after a run of consecutive retryable failures and blocks calls until the
//! cool-down elapses, then admits trial calls until enough of them succeed.
//!
//! - Closed: calls proceed
//! - Open: calls fail fast
//! - `HalfOpen`: cool-down elapsed, probing

use dashmap::DashMap;
use log::{debug, info, warn};
use std::time::{Duration, Instant};

use crate::utils::constants::{
    CIRCUIT_SUCCESS_THRESHOLD, DEFAULT_CIRCUIT_COOLDOWN_SECS, DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    HalfOpen,
    Open,
}

/// Health tracking for one operation class
#[derive(Debug, Clone)]
pub struct OperationHealth {
    pub consecutive_failures: u32,
    pub total_failures: u32,
    pub total_successes: u32,
    /// When the circuit last opened; the cool-down is measured from here
    pub last_opened: Option<Instant>,
    pub consecutive_successes_in_halfopen: u32,
    pub state: CircuitState,
}

impl OperationHealth {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            total_failures: 0,
            total_successes: 0,
            last_opened: None,
            consecutive_successes_in_halfopen: 0,
            state: CircuitState::Closed,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    operations: DashMap<String, OperationHealth>,
    failure_threshold: u32,
    success_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// # Arguments
    /// * `failure_threshold` - Open after this many consecutive failures
    /// * `success_threshold` - Close after this many half-open successes
    /// * `cooldown` - Time an open circuit blocks calls
    #[must_use]
    pub fn new(failure_threshold: u32, success_threshold: u32, cooldown: Duration) -> Self {
        Self {
            operations: DashMap::new(),
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            cooldown,
        }
    }

    /// Whether a call for `operation` may proceed right now
    pub fn should_attempt(&self, operation: &str) -> bool {
        let mut health = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(OperationHealth::new);

        match health.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => match health.last_opened {
                Some(opened) if opened.elapsed() >= self.cooldown => {
                    health.state = CircuitState::HalfOpen;
                    health.consecutive_successes_in_halfopen = 0;
                    info!(
                        "Circuit for '{}' HALF-OPEN after {:?} cool-down",
                        operation,
                        opened.elapsed()
                    );
                    true
                }
                Some(_) => false,
                None => {
                    debug!("Circuit for '{operation}' open without timestamp, staying open");
                    false
                }
            },
        }
    }

    pub fn record_success(&self, operation: &str) {
        let mut health = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(OperationHealth::new);

        health.consecutive_failures = 0;
        health.total_successes += 1;

        if health.state == CircuitState::HalfOpen {
            health.consecutive_successes_in_halfopen += 1;
            if health.consecutive_successes_in_halfopen >= self.success_threshold {
                health.state = CircuitState::Closed;
                info!("Circuit for '{operation}' CLOSED");
            }
        }
    }

    pub fn record_failure(&self, operation: &str, error: &str) {
        let mut health = self
            .operations
            .entry(operation.to_string())
            .or_insert_with(OperationHealth::new);

        health.consecutive_failures += 1;
        health.total_failures += 1;

        // A failed trial call reopens immediately
        let reopen = health.state == CircuitState::HalfOpen;
        if (reopen || health.consecutive_failures >= self.failure_threshold)
            && health.state != CircuitState::Open
        {
            health.state = CircuitState::Open;
            health.last_opened = Some(Instant::now());
            health.consecutive_successes_in_halfopen = 0;
            warn!(
                "Circuit for '{}' OPEN after {} consecutive failure(s). Last error: {}",
                operation, health.consecutive_failures, error
            );
        } else if health.state != CircuitState::Open {
            debug!(
                "Circuit failure for '{}' ({}/{}): {}",
                operation, health.consecutive_failures, self.failure_threshold, error
            );
        }
    }

    #[must_use]
    pub fn health(&self, operation: &str) -> Option<OperationHealth> {
        self.operations.get(operation).map(|r| r.value().clone())
    }

    /// Operation classes whose circuit is currently open
    #[must_use]
    pub fn open_operations(&self) -> Vec<String> {
        self.operations
            .iter()
            .filter(|entry| entry.value().state == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(
            DEFAULT_CIRCUIT_FAILURE_THRESHOLD,
            CIRCUIT_SUCCESS_THRESHOLD,
            Duration::from_secs(DEFAULT_CIRCUIT_COOLDOWN_SECS),
        )
    }
}
