//! The governor: one retry loop for every call that crosses the session or
//! sink boundary
//!
//! A call is paced (optional), attempted, and on failure either returned
//! immediately (non-retryable), retried after backoff, or returned as
//! exhausted once the attempt budget is spent. An optional circuit breaker
//! fails calls fast while their operation class is unhealthy.

use futures::future::BoxFuture;
use log::{debug, warn};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;

use super::circuit_breaker::CircuitBreaker;
use super::policy::{PacingPolicy, RetryPolicy};
use crate::error::Retryable;

/// Successful result together with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum GovernorError<E> {
    /// Non-retryable failure, returned as soon as it was observed
    #[error("{label} failed on attempt {attempt}: {error}")]
    Fatal {
        label: &'static str,
        attempt: u32,
        error: E,
    },

    /// Retry budget spent; carries the last failure
    #[error("{label} still failing after {attempts} attempt(s): {error}")]
    Exhausted {
        label: &'static str,
        attempts: u32,
        error: E,
    },

    /// Circuit for this operation class is open; nothing was attempted
    #[error("{label} skipped: circuit open")]
    CircuitOpen { label: &'static str },
}

impl<E> GovernorError<E> {
    /// Attempts made before giving up (0 when the circuit was open)
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fatal { attempt, .. } => *attempt,
            Self::Exhausted { attempts, .. } => *attempts,
            Self::CircuitOpen { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&E> {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::CircuitOpen { .. } => None,
        }
    }

    pub fn into_error(self) -> Option<E> {
        match self {
            Self::Fatal { error, .. } | Self::Exhausted { error, .. } => Some(error),
            Self::CircuitOpen { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Governor {
    retry: RetryPolicy,
    pacing: Option<PacingPolicy>,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl Governor {
    /// Unpaced governor without a circuit breaker
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            pacing: None,
            breaker: None,
        }
    }

    /// Pause for a random human-like interval before every attempt
    #[must_use]
    pub fn with_pacing(mut self, pacing: PacingPolicy) -> Self {
        self.pacing = pacing.is_enabled().then_some(pacing);
        self
    }

    #[must_use]
    pub fn with_circuit_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Run a stateless operation under the policy
    ///
    /// # Errors
    /// See [`GovernorError`] for the three ways a governed call can end.
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &'static str,
        mut op: F,
    ) -> Result<Attempted<T>, GovernorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.admit(label)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.pace().await;
            match op().await {
                Ok(value) => return Ok(self.succeeded(label, value, attempt)),
                Err(error) => self.failed(label, attempt, error).await?,
            }
        }
    }

    /// Run an operation that needs exclusive access to `state` on each attempt
    ///
    /// The closure gets a fresh reborrow per attempt, so it returns a boxed
    /// future tied to that borrow: `|surface| Box::pin(surface.scroll_results())`.
    ///
    /// # Errors
    /// See [`GovernorError`].
    pub async fn execute_on<S, T, E, F>(
        &self,
        state: &mut S,
        label: &'static str,
        mut op: F,
    ) -> Result<Attempted<T>, GovernorError<E>>
    where
        S: ?Sized,
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, E>>,
        E: Retryable + Display,
    {
        self.admit(label)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.pace().await;
            match op(&mut *state).await {
                Ok(value) => return Ok(self.succeeded(label, value, attempt)),
                Err(error) => self.failed(label, attempt, error).await?,
            }
        }
    }

    fn admit<E>(&self, label: &'static str) -> Result<(), GovernorError<E>> {
        match &self.breaker {
            Some(breaker) if !breaker.should_attempt(label) => {
                debug!("{label}: circuit open, failing fast");
                Err(GovernorError::CircuitOpen { label })
            }
            _ => Ok(()),
        }
    }

    async fn pace(&self) {
        if let Some(pacing) = &self.pacing {
            tokio::time::sleep(pacing.next_pause()).await;
        }
    }

    fn succeeded<T>(&self, label: &'static str, value: T, attempts: u32) -> Attempted<T> {
        if let Some(breaker) = &self.breaker {
            breaker.record_success(label);
        }
        if attempts > 1 {
            debug!("{label} succeeded on attempt {attempts}");
        }
        Attempted { value, attempts }
    }

    /// Decide what a failed attempt means; `Ok(())` means try again
    async fn failed<E>(
        &self,
        label: &'static str,
        attempt: u32,
        error: E,
    ) -> Result<(), GovernorError<E>>
    where
        E: Retryable + Display,
    {
        if !error.is_retryable() {
            warn!("{label}: non-retryable error on attempt {attempt}, failing fast: {error}");
            return Err(GovernorError::Fatal {
                label,
                attempt,
                error,
            });
        }

        if let Some(breaker) = &self.breaker {
            breaker.record_failure(label, &error.to_string());
        }

        let max_attempts = self.retry.max_attempts();
        if attempt >= max_attempts {
            warn!("{label}: giving up after {attempt} attempt(s): {error}");
            return Err(GovernorError::Exhausted {
                label,
                attempts: attempt,
                error,
            });
        }

        let delay = self.retry.delay_for(attempt);
        warn!(
            "{label}: retryable error, attempt {attempt}/{max_attempts}, retrying in {}ms: {error}",
            delay.as_millis()
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Flaky {
        Transient,
        Permanent,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            *self == Flaky::Transient
        }
    }

    async fn run_failing(governor: &Governor, failures: u32) -> (Result<Attempted<u32>, GovernorError<Flaky>>, u32) {
        let calls = AtomicU32::new(0);
        let result = governor
            .execute("op", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(Flaky::Transient)
                } else {
                    Ok(n)
                }
            })
            .await;
        (result, calls.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_attempts_follow_failure_count() {
        let governor = Governor::new(RetryPolicy::immediate(4));

        for failures in 0..8 {
            let (result, calls) = run_failing(&governor, failures).await;
            assert_eq!(calls, (failures + 1).min(4), "failures={failures}");
            if failures < 4 {
                let ok = result.expect("should succeed below the budget");
                assert_eq!(ok.attempts, failures + 1);
            } else {
                let err = result.expect_err("should exhaust the budget");
                assert!(matches!(err, GovernorError::Exhausted { attempts: 4, .. }));
                assert_eq!(err.into_error(), Some(Flaky::Transient));
            }
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let governor = Governor::new(RetryPolicy::immediate(4));
        let calls = AtomicU32::new(0);

        let err = governor
            .execute("op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Flaky::Permanent)
            })
            .await
            .expect_err("permanent error should propagate");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, GovernorError::Fatal { attempt: 1, .. }));
    }

    #[tokio::test]
    async fn test_execute_on_reborrows_state() {
        let governor = Governor::new(RetryPolicy::immediate(3));
        let mut counter = 0u32;

        let ok = governor
            .execute_on(&mut counter, "bump", |c| {
                Box::pin(async move {
                    *c += 1;
                    if *c < 2 { Err(Flaky::Transient) } else { Ok(*c) }
                })
            })
            .await
            .expect("second attempt succeeds");

        assert_eq!(ok.value, 2);
        assert_eq!(ok.attempts, 2);
        assert_eq!(counter, 2);
    }

    #[tokio::test]
    async fn test_open_circuit_fails_fast() {
        let breaker = Arc::new(CircuitBreaker::new(2, 1, Duration::from_secs(60)));
        let governor = Governor::new(RetryPolicy::immediate(2)).with_circuit_breaker(breaker.clone());

        let (result, _) = run_failing(&governor, 10).await;
        assert!(matches!(result, Err(GovernorError::Exhausted { .. })));

        let (result, calls) = run_failing(&governor, 0).await;
        assert!(matches!(result, Err(GovernorError::CircuitOpen { label: "op" })));
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_pacing_runs_before_each_attempt() {
        let pacing = PacingPolicy::new(Duration::from_millis(5), Duration::from_millis(5));
        let governor = Governor::new(RetryPolicy::immediate(3)).with_pacing(pacing);

        let started = std::time::Instant::now();
        let (result, calls) = run_failing(&governor, 2).await;
        assert!(result.is_ok());
        assert_eq!(calls, 3);
        assert!(started.elapsed() >= Duration::from_millis(15));
    }
}
