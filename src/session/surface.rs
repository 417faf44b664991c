//! The seam between the scraper and the remote web application
//!
//! Everything the core does to the page goes through [`WebSurface`]. The
//! chromiumoxide implementation lives in `crate::browser`; tests drive the
//! same code with scripted fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{FilterPredicate, Secret};
use crate::error::{SessionError, SurfaceError};

/// Login identity for the source application
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub secret: Secret,
}

impl Credentials {
    pub fn new(email: impl Into<String>, secret: impl Into<Secret>) -> Self {
        Self {
            email: email.into(),
            secret: secret.into(),
        }
    }
}

/// One authenticated browsing context
///
/// Methods take `&mut self`: a surface is driven by a single worker and
/// every call is strictly sequential.
#[async_trait]
pub trait WebSurface: Send {
    /// Navigate to the login screen
    async fn open_login(&mut self) -> Result<(), SurfaceError>;

    /// Fill and submit the login form
    async fn submit_credentials(&mut self, credentials: &Credentials) -> Result<(), SurfaceError>;

    /// Wait until the application confirms the login
    ///
    /// Returns `CredentialsRejected` when the login screen stays up with an
    /// error, `Timeout` when nothing conclusive happened.
    async fn await_login_confirmation(&mut self) -> Result<(), SurfaceError>;

    /// Cheap check: is the application still showing an authenticated view?
    async fn is_authenticated(&mut self) -> Result<bool, SurfaceError>;

    /// Health check for the underlying browser process
    async fn is_alive(&mut self) -> bool;

    /// Bring up the search view with the filter panel closed
    async fn open_search(&mut self) -> Result<(), SurfaceError>;

    /// Replace the search box content with the region key
    async fn type_region(&mut self, region_key: &str) -> Result<(), SurfaceError>;

    /// Pick the region's suggestion (or submit the typed text) and wait for
    /// the result list to render
    async fn submit_search(&mut self, region_key: &str) -> Result<(), SurfaceError>;

    /// Set one filter control; `Ok(false)` when no control matches the name
    /// or a requested option is missing
    async fn apply_filter(&mut self, predicate: &FilterPredicate) -> Result<bool, SurfaceError>;

    /// Reveal the advanced filter panel
    ///
    /// `Ok(false)` when the page has no such panel or it is already open.
    async fn open_filter_panel(&mut self) -> Result<bool, SurfaceError>;

    /// Confirm the filter panel so results refresh
    async fn commit_filters(&mut self) -> Result<(), SurfaceError>;

    /// Snapshot every result card currently rendered, in list order
    async fn visible_cards(&mut self) -> Result<Vec<Value>, SurfaceError>;

    /// Scroll the result list to trigger loading of more cards
    async fn scroll_results(&mut self) -> Result<(), SurfaceError>;

    /// Open a card's detail view, read its text and close it again
    ///
    /// The card is located by `source_id`, falling back to its address.
    /// `Ok(None)` when no detail view appears.
    async fn card_details(
        &mut self,
        source_id: &str,
        address: &str,
    ) -> Result<Option<String>, SurfaceError>;

    /// Release the browsing context; never fails
    async fn close(&mut self);
}

/// Produces fresh surfaces (a new browser) when none exists or the old one died
#[async_trait]
pub trait SurfaceLauncher: Send + Sync {
    type Surface: WebSurface;

    async fn launch(&self) -> Result<Self::Surface, SessionError>;
}
