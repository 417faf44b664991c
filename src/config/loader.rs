//! Loading `RunConfig` from a JSON file plus environment overrides
//!
//! Lookup order for the file: explicit path, then `DEALSCRAPE_CONFIG`, then
//! `dealscrape.json` in the working directory. An explicitly named file must
//! exist; the default one is optional so a run can be configured from the
//! environment alone.
//!
//! Variables from a `.env` file fill in whatever the process environment
//! leaves unset.

use log::{debug, info};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use super::builder::RunConfigBuilder;
use super::types::{RegionSpec, RunConfig, Secret};
use crate::error::ConfigError;
use crate::utils::constants::{DEFAULT_CONFIG_PATH, DEFAULT_ENV_FILE};

pub const ENV_CONFIG_PATH: &str = "DEALSCRAPE_CONFIG";
pub const ENV_LOGIN_EMAIL: &str = "DEALMACHINE_EMAIL";
pub const ENV_LOGIN_SECRET: &str = "DEALMACHINE_PASSWORD";
pub const ENV_SINK_API_KEY: &str = "AIRTABLE_API_KEY";
pub const ENV_SINK_ENDPOINT_ID: &str = "AIRTABLE_BASE_ID";
pub const ENV_SINK_COLLECTION: &str = "AIRTABLE_TABLE_NAME";
/// Comma-separated region keys; replaces the file's region list
pub const ENV_REGIONS: &str = "DEALSCRAPE_REGIONS";

impl RunConfig {
    /// Load from file, process environment and env file
    ///
    /// `env_file` defaults to `.env` in the working directory, which may be
    /// absent; an explicitly named env file must exist.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; all of them are fatal at startup.
    pub fn load(path: Option<&Path>, env_file: Option<&Path>) -> Result<Self, ConfigError> {
        let dotenv = match env_file {
            Some(env_file) => load_env_file(env_file)?,
            None => {
                let default = Path::new(DEFAULT_ENV_FILE);
                if default.exists() {
                    load_env_file(default)?
                } else {
                    HashMap::new()
                }
            }
        };
        Self::load_with_env(path, |key| {
            std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
        })
    }

    /// Load with an injected environment lookup
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`].
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG_PATH).map(PathBuf::from));

        let builder = match explicit {
            Some(path) => RunConfigBuilder::from_file(&path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    RunConfigBuilder::from_file(default)?
                } else {
                    debug!("No {DEFAULT_CONFIG_PATH} found, configuring from environment only");
                    RunConfigBuilder::default()
                }
            }
        };

        builder.apply_env(env).build()
    }
}

/// Read `KEY=value` pairs without touching the process environment
///
/// # Errors
///
/// `ConfigError::EnvFile` when the file is missing or malformed.
pub fn load_env_file(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let env_err = |source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    };

    let mut vars = HashMap::new();
    for entry in dotenvy::from_path_iter(path).map_err(env_err)? {
        let (key, value) = entry.map_err(env_err)?;
        vars.insert(key, value);
    }
    debug!("Read {} variable(s) from {}", vars.len(), path.display());
    Ok(vars)
}

impl RunConfigBuilder {
    /// Parse a config file into a builder
    ///
    /// # Errors
    ///
    /// `ConfigError::Io` when unreadable, `ConfigError::Parse` when not valid
    /// JSON or when it contains unknown fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded configuration from {}", path.display());
        Ok(builder)
    }

    /// Overlay credentials and sink addressing from the environment
    #[must_use]
    pub fn apply_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        if let Some(email) = non_empty(ENV_LOGIN_EMAIL) {
            self.login_email = Some(email);
        }
        if let Some(secret) = non_empty(ENV_LOGIN_SECRET) {
            self.login_secret = Some(Secret::new(secret));
        }
        if let Some(key) = non_empty(ENV_SINK_API_KEY) {
            self.sink_api_key = Some(Secret::new(key));
        }
        if let Some(id) = non_empty(ENV_SINK_ENDPOINT_ID) {
            self.sink_endpoint_id = Some(id);
        }
        if let Some(name) = non_empty(ENV_SINK_COLLECTION) {
            self.sink_collection_name = Some(name);
        }
        if let Some(list) = non_empty(ENV_REGIONS) {
            self.regions = list
                .split(',')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(RegionSpec::from)
                .collect();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_file_with_env_secrets() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"{{
                "login_email": "file@example.com",
                "sink_endpoint_id": "appFile",
                "sink_collection_name": "Leads",
                "regions": ["90210", {{"key": "33101", "preset": "cashflow"}}],
                "max_scrolls": 12
            }}"#
        )
        .expect("write config");

        let env = env_from(&[
            (ENV_LOGIN_SECRET, "pw"),
            (ENV_SINK_API_KEY, "key"),
            (ENV_LOGIN_EMAIL, "env@example.com"),
        ]);
        let config = RunConfig::load_with_env(Some(file.path()), env).expect("config loads");

        assert_eq!(config.login_email(), "env@example.com");
        assert_eq!(config.login_secret().expose(), "pw");
        assert_eq!(config.sink_endpoint_id(), "appFile");
        assert_eq!(config.max_scrolls(), 12);
        assert_eq!(config.regions().len(), 2);
        assert!(!config.regions()[1].filters.is_empty());
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let err = RunConfig::load_with_env(Some(Path::new("/nonexistent/dealscrape.json")), |_| {
            None
        })
        .expect_err("missing file fails");
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_unknown_field_is_parse_error() {
        let mut file = NamedTempFile::new().expect("temp file");
        write!(file, r#"{{"login_emial": "typo@example.com"}}"#).expect("write config");

        let err = RunConfig::load_with_env(Some(file.path()), |_| None)
            .expect_err("unknown field fails");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_file_is_parsed_without_touching_process_env() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "# credentials").expect("write env");
        writeln!(file, "{ENV_LOGIN_EMAIL}=dotenv@example.com").expect("write env");
        writeln!(file, "{ENV_SINK_COLLECTION}=\"Hot Leads\"").expect("write env");

        let vars = load_env_file(file.path()).expect("env file loads");
        assert_eq!(vars.len(), 2);
        assert_eq!(vars[ENV_LOGIN_EMAIL], "dotenv@example.com");
        assert_eq!(vars[ENV_SINK_COLLECTION], "Hot Leads");
        assert!(std::env::var("DEALSCRAPE_UNSET_BY_ENV_FILE").is_err());
    }

    #[test]
    fn test_missing_explicit_env_file_is_an_error() {
        let err = RunConfig::load(None, Some(Path::new("/nonexistent/dealscrape.env")))
            .expect_err("missing env file fails");
        assert!(matches!(err, ConfigError::EnvFile { .. }));
    }

    #[test]
    fn test_env_regions_replace_file_regions() {
        let builder = RunConfigBuilder::default()
            .region("11111")
            .apply_env(env_from(&[(ENV_REGIONS, "90210, 33101,,")]));
        let keys: Vec<_> = builder.regions.iter().map(RegionSpec::key).collect();
        assert_eq!(keys, vec!["90210", "33101"]);
    }

    #[test]
    fn test_secrets_redacted_in_debug() {
        let config = RunConfig::builder()
            .login_email("ops@example.com")
            .login_secret("super-secret-pw")
            .sink_api_key("patXYZ")
            .sink_endpoint_id("app")
            .sink_collection_name("Leads")
            .region("90210")
            .build()
            .expect("config builds");

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-pw"));
        assert!(!rendered.contains("patXYZ"));
    }
}
