//! Accessors for `RunConfig`

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::types::{RegionTarget, RunConfig, Secret};
use crate::governor::{CircuitBreaker, PacingPolicy, RetryPolicy};
use crate::utils::constants::CIRCUIT_SUCCESS_THRESHOLD;

impl RunConfig {
    #[must_use]
    pub fn login_email(&self) -> &str {
        &self.login_email
    }

    #[must_use]
    pub fn login_secret(&self) -> &Secret {
        &self.login_secret
    }

    #[must_use]
    pub fn sink_api_key(&self) -> &Secret {
        &self.sink_api_key
    }

    #[must_use]
    pub fn sink_endpoint_id(&self) -> &str {
        &self.sink_endpoint_id
    }

    #[must_use]
    pub fn sink_collection_name(&self) -> &str {
        &self.sink_collection_name
    }

    #[must_use]
    pub fn sink_base_url(&self) -> &str {
        &self.sink_base_url
    }

    #[must_use]
    pub fn regions(&self) -> &[RegionTarget] {
        &self.regions
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
        )
    }

    #[must_use]
    pub fn pacing_policy(&self) -> PacingPolicy {
        PacingPolicy::new(
            Duration::from_millis(self.pacing.min_ms),
            Duration::from_millis(self.pacing.max_ms),
        )
    }

    /// Fresh breaker for this run, or `None` when disabled
    #[must_use]
    pub fn circuit_breaker(&self) -> Option<Arc<CircuitBreaker>> {
        self.circuit.enabled.then(|| {
            Arc::new(CircuitBreaker::new(
                self.circuit.failure_threshold,
                CIRCUIT_SUCCESS_THRESHOLD,
                Duration::from_secs(self.circuit.cooldown_secs),
            ))
        })
    }

    #[must_use]
    pub fn max_login_attempts(&self) -> u32 {
        self.max_login_attempts
    }

    #[must_use]
    pub fn max_scrolls(&self) -> u32 {
        self.max_scrolls
    }

    #[must_use]
    pub fn session_recoveries(&self) -> u32 {
        self.session_recoveries
    }

    /// Detail views to open per region; `None` when deep scraping is off
    #[must_use]
    pub fn deep_scrape_limit(&self) -> Option<usize> {
        (self.deep_scrape && self.modal_limit > 0).then_some(self.modal_limit)
    }

    #[must_use]
    pub fn login_url(&self) -> &str {
        &self.login_url
    }

    #[must_use]
    pub fn app_url(&self) -> &str {
        &self.app_url
    }

    #[must_use]
    pub fn headless(&self) -> bool {
        self.headless
    }

    #[must_use]
    pub fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.page_timeout_secs)
    }

    #[must_use]
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    #[must_use]
    pub fn fallback_path(&self) -> &Path {
        &self.fallback_path
    }

    #[must_use]
    pub fn repeat_every(&self) -> Option<Duration> {
        self.repeat_every_secs.map(Duration::from_secs)
    }
}
