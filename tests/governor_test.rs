//! Retry budget properties of the governor

use dealscrape::error::SurfaceError;
use dealscrape::governor::{Governor, GovernorError, PacingPolicy, RetryPolicy};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

/// Runs an op that times out `failures` times before succeeding
async fn flaky(governor: &Governor, failures: u32) -> (Result<u32, u32>, u32) {
    let calls = AtomicU32::new(0);
    let result = governor
        .execute("flaky", || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if call <= failures {
                    Err(SurfaceError::Timeout(format!("call {call}")))
                } else {
                    Ok(call)
                }
            }
        })
        .await;
    let observed = calls.load(Ordering::SeqCst);
    (result.map(|done| done.attempts).map_err(|e| e.attempts()), observed)
}

#[tokio::test]
async fn test_attempts_match_min_of_failures_plus_one_and_budget() {
    let max_attempts = 4;
    let governor = Governor::new(RetryPolicy::immediate(max_attempts));

    for failures in 0..=6 {
        let (result, observed) = flaky(&governor, failures).await;
        let expected = (failures + 1).min(max_attempts);
        assert_eq!(observed, expected, "{failures} transient failure(s)");
        if failures < max_attempts {
            assert_eq!(result, Ok(expected));
        } else {
            assert_eq!(result, Err(max_attempts));
        }
    }
}

#[tokio::test]
async fn test_non_retryable_failure_is_not_retried() {
    let governor = Governor::new(RetryPolicy::immediate(4));
    let calls = AtomicU32::new(0);

    let result = governor
        .execute("login check", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(SurfaceError::LoggedOut) }
        })
        .await;

    assert!(matches!(
        result,
        Err(GovernorError::Fatal { attempt: 1, error: SurfaceError::LoggedOut, .. })
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pacing_pauses_before_each_attempt() {
    let pause = Duration::from_millis(20);
    let governor = Governor::new(RetryPolicy::immediate(3)).with_pacing(PacingPolicy::new(pause, pause));

    let started = Instant::now();
    let (result, observed) = flaky(&governor, 2).await;

    assert_eq!(result, Ok(3));
    assert_eq!(observed, 3);
    assert!(started.elapsed() >= pause * 3);
}
