//! Builder for `RunConfig`
//!
//! The builder doubles as the on-disk shape of the config file: every field
//! is optional there, environment overrides are layered on top, and
//! [`RunConfigBuilder::build`] validates the result once, before any region
//! runs.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use super::presets;
use super::types::{
    CircuitSettings, FilterPredicate, PacingSettings, RegionSpec, RegionTarget, RetrySettings,
    RunConfig, Secret,
};
use crate::error::ConfigError;
use crate::utils::constants::{
    DEFAULT_APP_URL, DEFAULT_BASE_DELAY_MS, DEFAULT_CHECKPOINT_PATH,
    DEFAULT_CIRCUIT_COOLDOWN_SECS, DEFAULT_CIRCUIT_FAILURE_THRESHOLD, DEFAULT_FALLBACK_PATH,
    DEFAULT_LOGIN_URL, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_LOGIN_ATTEMPTS, DEFAULT_MAX_SCROLLS,
    DEFAULT_MODAL_LIMIT,
    DEFAULT_PACING_MAX_MS, DEFAULT_PACING_MIN_MS, DEFAULT_PAGE_TIMEOUT_SECS,
    DEFAULT_SESSION_RECOVERIES, DEFAULT_SINK_BASE_URL,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigBuilder {
    pub(crate) login_email: Option<String>,
    pub(crate) login_secret: Option<Secret>,
    pub(crate) sink_api_key: Option<Secret>,
    pub(crate) sink_endpoint_id: Option<String>,
    pub(crate) sink_collection_name: Option<String>,
    pub(crate) regions: Vec<RegionSpec>,
    pub(crate) filter_set: Vec<FilterPredicate>,
    /// Preset for regions that do not name one
    pub(crate) preset: Option<String>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) base_delay_ms: Option<u64>,
    pub(crate) pacing_min_ms: Option<u64>,
    pub(crate) pacing_max_ms: Option<u64>,
    pub(crate) circuit_breaker: Option<bool>,
    pub(crate) circuit_failure_threshold: Option<u32>,
    pub(crate) circuit_cooldown_secs: Option<u64>,
    pub(crate) max_login_attempts: Option<u32>,
    pub(crate) max_scrolls: Option<u32>,
    pub(crate) session_recoveries: Option<u32>,
    pub(crate) deep_scrape: Option<bool>,
    pub(crate) modal_limit: Option<usize>,
    pub(crate) login_url: Option<String>,
    pub(crate) app_url: Option<String>,
    pub(crate) sink_base_url: Option<String>,
    pub(crate) headless: Option<bool>,
    pub(crate) page_timeout_secs: Option<u64>,
    pub(crate) checkpoint_path: Option<PathBuf>,
    pub(crate) fallback_path: Option<PathBuf>,
    pub(crate) repeat_every_secs: Option<u64>,
}

impl RunConfig {
    /// Create a builder for configuring a `RunConfig` with a fluent interface
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }
}

impl RunConfigBuilder {
    #[must_use]
    pub fn login_email(mut self, email: impl Into<String>) -> Self {
        self.login_email = Some(email.into());
        self
    }

    #[must_use]
    pub fn login_secret(mut self, secret: impl Into<Secret>) -> Self {
        self.login_secret = Some(secret.into());
        self
    }

    #[must_use]
    pub fn sink_api_key(mut self, key: impl Into<Secret>) -> Self {
        self.sink_api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn sink_endpoint_id(mut self, id: impl Into<String>) -> Self {
        self.sink_endpoint_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn sink_collection_name(mut self, name: impl Into<String>) -> Self {
        self.sink_collection_name = Some(name.into());
        self
    }

    /// Append a region; order of calls is processing order
    #[must_use]
    pub fn region(mut self, region: impl Into<RegionSpec>) -> Self {
        self.regions.push(region.into());
        self
    }

    #[must_use]
    pub fn regions<I, R>(mut self, regions: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<RegionSpec>,
    {
        self.regions.extend(regions.into_iter().map(Into::into));
        self
    }

    /// Predicates applied to every region
    #[must_use]
    pub fn filter(mut self, predicate: FilterPredicate) -> Self {
        self.filter_set.push(predicate);
        self
    }

    #[must_use]
    pub fn preset(mut self, name: impl Into<String>) -> Self {
        self.preset = Some(name.into());
        self
    }

    #[must_use]
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn base_delay_ms(mut self, millis: u64) -> Self {
        self.base_delay_ms = Some(millis);
        self
    }

    #[must_use]
    pub fn pacing_ms(mut self, min: u64, max: u64) -> Self {
        self.pacing_min_ms = Some(min);
        self.pacing_max_ms = Some(max);
        self
    }

    /// Zero backoff and zero pacing; used by tests and dry runs
    #[must_use]
    pub fn without_delays(self) -> Self {
        self.base_delay_ms(0).pacing_ms(0, 0)
    }

    #[must_use]
    pub fn circuit_breaker(mut self, enabled: bool) -> Self {
        self.circuit_breaker = Some(enabled);
        self
    }

    #[must_use]
    pub fn max_login_attempts(mut self, attempts: u32) -> Self {
        self.max_login_attempts = Some(attempts);
        self
    }

    #[must_use]
    pub fn max_scrolls(mut self, scrolls: u32) -> Self {
        self.max_scrolls = Some(scrolls);
        self
    }

    #[must_use]
    pub fn session_recoveries(mut self, recoveries: u32) -> Self {
        self.session_recoveries = Some(recoveries);
        self
    }

    #[must_use]
    pub fn sink_base_url(mut self, url: impl Into<String>) -> Self {
        self.sink_base_url = Some(url.into());
        self
    }

    /// Open up to `modal_limit` card detail views per region
    #[must_use]
    pub fn deep_scrape(mut self, modal_limit: usize) -> Self {
        self.deep_scrape = Some(true);
        self.modal_limit = Some(modal_limit);
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = Some(headless);
        self
    }

    #[must_use]
    pub fn checkpoint_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn fallback_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.fallback_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn repeat_every_secs(mut self, secs: Option<u64>) -> Self {
        self.repeat_every_secs = secs;
        self
    }

    /// Validate and freeze the configuration
    ///
    /// # Errors
    ///
    /// `ConfigError::Missing` for an absent required field,
    /// `ConfigError::Invalid` for duplicate regions, unknown presets or
    /// out-of-range tuning values.
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        let login_email = required(self.login_email, "login_email")?;
        let login_secret = required_secret(self.login_secret, "login_secret")?;
        let sink_api_key = required_secret(self.sink_api_key, "sink_api_key")?;
        let sink_endpoint_id = required(self.sink_endpoint_id, "sink_endpoint_id")?;
        let sink_collection_name = required(self.sink_collection_name, "sink_collection_name")?;

        if self.regions.is_empty() {
            return Err(ConfigError::Missing("regions"));
        }
        let regions = resolve_regions(&self.regions, &self.filter_set, self.preset.as_deref())?;

        let retry = RetrySettings {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            base_delay_ms: self.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS),
        };
        if retry.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }

        let pacing = PacingSettings {
            min_ms: self.pacing_min_ms.unwrap_or(DEFAULT_PACING_MIN_MS),
            max_ms: self.pacing_max_ms.unwrap_or(DEFAULT_PACING_MAX_MS),
        };
        if pacing.min_ms > pacing.max_ms {
            return Err(invalid(
                "pacing_min_ms",
                format!("{} exceeds pacing_max_ms {}", pacing.min_ms, pacing.max_ms),
            ));
        }

        let max_login_attempts = self.max_login_attempts.unwrap_or(DEFAULT_MAX_LOGIN_ATTEMPTS);
        if max_login_attempts == 0 {
            return Err(invalid("max_login_attempts", "must be at least 1"));
        }
        let max_scrolls = self.max_scrolls.unwrap_or(DEFAULT_MAX_SCROLLS);
        if max_scrolls == 0 {
            return Err(invalid("max_scrolls", "must be at least 1"));
        }

        let sink_base_url = self
            .sink_base_url
            .unwrap_or_else(|| DEFAULT_SINK_BASE_URL.to_string());
        url::Url::parse(&sink_base_url)
            .map_err(|e| invalid("sink_base_url", e.to_string()))?;

        Ok(RunConfig {
            login_email,
            login_secret,
            sink_api_key,
            sink_endpoint_id,
            sink_collection_name,
            regions,
            retry,
            pacing,
            circuit: CircuitSettings {
                enabled: self.circuit_breaker.unwrap_or(true),
                failure_threshold: self
                    .circuit_failure_threshold
                    .unwrap_or(DEFAULT_CIRCUIT_FAILURE_THRESHOLD),
                cooldown_secs: self
                    .circuit_cooldown_secs
                    .unwrap_or(DEFAULT_CIRCUIT_COOLDOWN_SECS),
            },
            max_login_attempts,
            max_scrolls,
            session_recoveries: self.session_recoveries.unwrap_or(DEFAULT_SESSION_RECOVERIES),
            deep_scrape: self.deep_scrape.unwrap_or(false),
            modal_limit: self.modal_limit.unwrap_or(DEFAULT_MODAL_LIMIT),
            login_url: self.login_url.unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
            app_url: self.app_url.unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
            sink_base_url,
            headless: self.headless.unwrap_or(true),
            page_timeout_secs: self.page_timeout_secs.unwrap_or(DEFAULT_PAGE_TIMEOUT_SECS),
            checkpoint_path: self
                .checkpoint_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            fallback_path: self
                .fallback_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FALLBACK_PATH)),
            repeat_every_secs: self.repeat_every_secs.filter(|secs| *secs > 0),
        })
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn required(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn required_secret(value: Option<Secret>, field: &'static str) -> Result<Secret, ConfigError> {
    value
        .filter(|secret| !secret.is_empty())
        .ok_or(ConfigError::Missing(field))
}

/// Merge preset, global and per-region predicates for every region
///
/// Layer order is preset, then the global filter set, then the region's own
/// filters; later layers win by predicate name.
fn resolve_regions(
    specs: &[RegionSpec],
    filter_set: &[FilterPredicate],
    default_preset: Option<&str>,
) -> Result<Vec<RegionTarget>, ConfigError> {
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(specs.len());

    for spec in specs {
        let key = spec.key().trim();
        if key.is_empty() {
            return Err(invalid("regions", "region key must not be empty"));
        }
        if !seen.insert(key.to_string()) {
            return Err(invalid("regions", format!("duplicate region key '{key}'")));
        }

        let (preset_name, own_filters) = match spec {
            RegionSpec::Key(_) => (default_preset, Vec::new()),
            RegionSpec::Detailed {
                preset, filters, ..
            } => (preset.as_deref().or(default_preset), filters.clone()),
        };

        let preset_filters = match preset_name {
            Some(name) => presets::preset(name).ok_or_else(|| {
                invalid(
                    "preset",
                    format!(
                        "unknown preset '{name}' (known: {})",
                        presets::PRESET_NAMES.join(", ")
                    ),
                )
            })?,
            None => Vec::new(),
        };

        targets.push(RegionTarget {
            key: key.to_string(),
            filters: presets::merge([preset_filters, filter_set.to_vec(), own_filters]),
        });
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::FilterValue;

    fn complete() -> RunConfigBuilder {
        RunConfig::builder()
            .login_email("ops@example.com")
            .login_secret("pw")
            .sink_api_key("key")
            .sink_endpoint_id("appBase")
            .sink_collection_name("Leads")
            .region("90210")
    }

    #[test]
    fn test_defaults_applied() {
        let config = complete().build().expect("complete config builds");
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(config.pacing.min_ms, DEFAULT_PACING_MIN_MS);
        assert_eq!(config.pacing.max_ms, DEFAULT_PACING_MAX_MS);
        assert_eq!(config.max_scrolls, DEFAULT_MAX_SCROLLS);
        assert!(config.circuit.enabled);
        assert!(config.repeat_every_secs.is_none());
        assert!(config.regions[0].filters.is_empty());
        assert_eq!(config.deep_scrape_limit(), None);
    }

    #[test]
    fn test_deep_scrape_is_opt_in() {
        let config = complete().deep_scrape(25).build().expect("config builds");
        assert_eq!(config.deep_scrape_limit(), Some(25));

        let flag_only = RunConfigBuilder {
            deep_scrape: Some(true),
            ..complete()
        };
        let config = flag_only.build().expect("config builds");
        assert_eq!(config.deep_scrape_limit(), Some(DEFAULT_MODAL_LIMIT));
    }

    #[test]
    fn test_missing_required_fields() {
        let err = RunConfig::builder().build().expect_err("empty builder fails");
        assert!(matches!(err, ConfigError::Missing("login_email")));

        let err = complete()
            .login_secret("   ")
            .build()
            .expect_err("blank secret fails");
        assert!(matches!(err, ConfigError::Missing("login_secret")));

        let mut no_regions = complete();
        no_regions.regions.clear();
        assert!(matches!(
            no_regions.build(),
            Err(ConfigError::Missing("regions"))
        ));
    }

    #[test]
    fn test_duplicate_region_rejected() {
        let err = complete()
            .region("90210")
            .build()
            .expect_err("duplicate region fails");
        assert!(matches!(err, ConfigError::Invalid { field: "regions", .. }));
    }

    #[test]
    fn test_unknown_preset_rejected() {
        let err = complete()
            .preset("everything")
            .build()
            .expect_err("unknown preset fails");
        assert!(matches!(err, ConfigError::Invalid { field: "preset", .. }));
    }

    #[test]
    fn test_region_filters_override_preset() {
        let config = complete()
            .region(RegionSpec::Detailed {
                key: "33101".into(),
                preset: Some("max-distress".into()),
                filters: vec![FilterPredicate::new(
                    "Vacant Homes",
                    FilterValue::Toggle(false),
                )],
            })
            .build()
            .expect("config builds");

        let region = &config.regions[1];
        let vacant = region
            .filters
            .iter()
            .find(|p| p.name == "Vacant Homes")
            .expect("vacant predicate kept");
        assert_eq!(vacant.value, FilterValue::Toggle(false));
        assert!(region.filters.iter().any(|p| p.name == "Probates"));
    }

    #[test]
    fn test_pacing_bounds_validated() {
        let err = complete()
            .pacing_ms(900, 100)
            .build()
            .expect_err("inverted pacing fails");
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "pacing_min_ms",
                ..
            }
        ));
    }
}
