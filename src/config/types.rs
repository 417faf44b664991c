//! Core configuration types for a scrape run
//!
//! `RunConfig` is the immutable snapshot handed to the orchestrator. Nothing
//! downstream reads the environment; the loader resolves everything up front.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// String that never appears in `Debug` output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Value of a named search predicate
///
/// JSON `true`/`false` is a toggle, a string is a range or text value
/// (`">50"`, `"<=2005"`, `"Fair or Poor"`), an array is a multi-choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Toggle(bool),
    Range(String),
    Choice(Vec<String>),
}

impl FilterValue {
    /// Disabled toggles are not applied to the surface
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self {
            Self::Toggle(on) => *on,
            Self::Range(value) => !value.trim().is_empty(),
            Self::Choice(options) => !options.is_empty(),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Toggle(on) => write!(f, "{on}"),
            Self::Range(value) => f.write_str(value),
            Self::Choice(options) => f.write_str(&options.join(", ")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub name: String,
    pub value: FilterValue,
}

impl FilterPredicate {
    pub fn new(name: impl Into<String>, value: FilterValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn toggle(name: impl Into<String>) -> Self {
        Self::new(name, FilterValue::Toggle(true))
    }

    pub fn range(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, FilterValue::Range(value.into()))
    }

    pub fn choice<I, S>(name: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            FilterValue::Choice(options.into_iter().map(Into::into).collect()),
        )
    }
}

/// A configured region: either a bare key (`"90210"`) or a detailed entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegionSpec {
    Key(String),
    Detailed {
        key: String,
        #[serde(default)]
        preset: Option<String>,
        #[serde(default)]
        filters: Vec<FilterPredicate>,
    },
}

impl RegionSpec {
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Key(key) | Self::Detailed { key, .. } => key,
        }
    }
}

impl From<&str> for RegionSpec {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

/// Region key with its fully merged, ordered filter list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionTarget {
    pub key: String,
    pub filters: Vec<FilterPredicate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacingSettings {
    pub min_ms: u64,
    pub max_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

/// Immutable configuration for one run
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub(crate) login_email: String,
    pub(crate) login_secret: Secret,
    pub(crate) sink_api_key: Secret,
    pub(crate) sink_endpoint_id: String,
    pub(crate) sink_collection_name: String,

    /// Regions in processing order, presets already merged
    pub(crate) regions: Vec<RegionTarget>,

    pub(crate) retry: RetrySettings,
    pub(crate) pacing: PacingSettings,
    pub(crate) circuit: CircuitSettings,
    pub(crate) max_login_attempts: u32,
    pub(crate) max_scrolls: u32,
    pub(crate) session_recoveries: u32,
    /// Open each card's detail view and merge what it shows
    pub(crate) deep_scrape: bool,
    pub(crate) modal_limit: usize,

    pub(crate) login_url: String,
    pub(crate) app_url: String,
    pub(crate) sink_base_url: String,
    pub(crate) headless: bool,
    pub(crate) page_timeout_secs: u64,

    pub(crate) checkpoint_path: PathBuf,
    pub(crate) fallback_path: PathBuf,

    /// Start a fresh cycle this many seconds after a fully completed run
    pub(crate) repeat_every_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_value_untagged_forms() {
        let toggle: FilterValue = serde_json::from_str("true").expect("bool parses");
        let range: FilterValue = serde_json::from_str("\">50\"").expect("string parses");
        let choice: FilterValue =
            serde_json::from_str("[\"Duplex\", \"Triplex\"]").expect("array parses");

        assert_eq!(toggle, FilterValue::Toggle(true));
        assert_eq!(range, FilterValue::Range(">50".into()));
        assert_eq!(
            choice,
            FilterValue::Choice(vec!["Duplex".into(), "Triplex".into()])
        );
        assert!(!FilterValue::Toggle(false).is_active());
    }

    #[test]
    fn test_region_spec_accepts_both_shapes() {
        let specs: Vec<RegionSpec> = serde_json::from_str(
            r#"["90210", {"key": "33101", "preset": "max-distress",
                "filters": [{"name": "Vacant Homes", "value": true}]}]"#,
        )
        .expect("region list parses");

        assert_eq!(specs[0], RegionSpec::Key("90210".into()));
        assert_eq!(specs[1].key(), "33101");
        assert!(matches!(
            &specs[1],
            RegionSpec::Detailed { preset: Some(p), filters, .. }
                if p == "max-distress" && filters.len() == 1
        ));
    }

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{secret:?}"), "Secret(***)");
        assert_eq!(secret.expose(), "hunter2");
    }
}
