//! Error taxonomy for a scrape run
//!
//! Every failure that can cross a component boundary has a typed variant here.
//! Errors that may be transient implement [`Retryable`] so the governor can
//! decide between another attempt and immediate propagation.

use std::path::PathBuf;
use thiserror::Error;

/// Classification used by the governor to decide whether to retry
pub trait Retryable {
    /// True when another attempt might succeed
    fn is_retryable(&self) -> bool;
}

/// Failures reported by the web surface (browser or fake)
#[derive(Debug, Clone, Error)]
pub enum SurfaceError {
    /// An element or page state did not appear in time
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Navigation or network failure inside the browser
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Injected script failed or returned an unexpected shape
    #[error("script evaluation failed: {0}")]
    Script(String),

    /// A required control (login form, search box) is absent
    #[error("control not found: {0}")]
    ControlNotFound(String),

    /// The application bounced us back to the login screen
    #[error("session logged out by the remote application")]
    LoggedOut,

    /// Login form submitted but the application refused the credentials
    #[error("credentials rejected: {0}")]
    CredentialsRejected(String),

    /// Browser process or page is gone
    #[error("browser unavailable: {0}")]
    BrowserClosed(String),
}

impl Retryable for SurfaceError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Navigation(_) | Self::Script(_)
        )
    }
}

impl SurfaceError {
    /// True when the failure means the authenticated session no longer exists
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::BrowserClosed(_))
    }
}

/// Failures acquiring or keeping an authenticated session
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Credentials were refused after all login attempts (fatal to the run)
    #[error("authentication rejected after {attempts} login attempt(s): {reason}")]
    Auth { attempts: u32, reason: String },

    /// The held session is no longer valid; re-authentication will recover it
    #[error("session expired")]
    Expired,

    /// The browser could not be launched
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Login could not complete for a non-credential reason
    #[error("login did not complete: {0}")]
    Unavailable(String),
}

impl SessionError {
    /// True for the one session failure that must stop the whole run
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// A named filter predicate has no matching control (upstream schema drift)
#[derive(Debug, Clone, Error)]
#[error("filter '{predicate}' has no matching control on the search surface (region {region})")]
pub struct FilterError {
    pub region: String,
    pub predicate: String,
}

/// Failures while searching, filtering or paginating a region
#[derive(Debug, Clone, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Filter(#[from] FilterError),

    /// Surface failure that survived the retry policy
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    Surface {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: SurfaceError,
    },

    /// The operation's circuit is open; the call was not attempted
    #[error("{operation} skipped: circuit open")]
    CircuitOpen { operation: &'static str },
}

impl NavigationError {
    /// True when re-authenticating could let the region continue
    #[must_use]
    pub fn is_session_lost(&self) -> bool {
        matches!(self, Self::Surface { source, .. } if source.is_session_lost())
    }
}

/// Why a candidate was refused by the normalizer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Payload is not an object (truncated, array, scalar)
    #[error("candidate is not record-shaped")]
    NotRecordShaped,

    /// A required field is absent or blank
    #[error("required field '{0}' is missing")]
    MissingField(&'static str),

    /// A field is present but cannot be read as its declared type
    #[error("field '{field}' has invalid value {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Failures reported by the destination sink
#[derive(Debug, Clone, Error)]
pub enum UploadError {
    /// Network, rate-limit or server-side failure
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// Schema rejection or invalid sink credentials
    #[error("sink rejected the record: {0}")]
    Permanent(String),
}

impl Retryable for UploadError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Failures writing the local fallback log
#[derive(Debug, Error)]
pub enum FallbackError {
    #[error("fallback log {path} could not be written: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("fallback entry could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failures loading or persisting the run-state checkpoint
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint {path} could not be accessed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint {path} is corrupt: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Startup configuration problems (fatal before any region runs)
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required configuration field '{0}' is missing")]
    Missing(&'static str),

    #[error("configuration field '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config file {path} could not be read: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("env file {path} could not be loaded: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
}

/// Failures that end a run before the report is complete
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_error_classification() {
        assert!(SurfaceError::Timeout("cards".into()).is_retryable());
        assert!(SurfaceError::Navigation("reset".into()).is_retryable());
        assert!(!SurfaceError::LoggedOut.is_retryable());
        assert!(!SurfaceError::CredentialsRejected("bad".into()).is_retryable());
        assert!(!SurfaceError::ControlNotFound("search box".into()).is_retryable());
    }

    #[test]
    fn test_session_lost_detection() {
        let lost = NavigationError::Surface {
            operation: "load page",
            attempts: 1,
            source: SurfaceError::LoggedOut,
        };
        assert!(lost.is_session_lost());

        let drift = NavigationError::from(FilterError {
            region: "90210".into(),
            predicate: "Vacant".into(),
        });
        assert!(!drift.is_session_lost());
    }

    #[test]
    fn test_upload_error_classification() {
        assert!(UploadError::Transient("503".into()).is_retryable());
        assert!(!UploadError::Permanent("422".into()).is_retryable());
    }
}
