//! `WebSurface` backed by a real Chrome page

use async_trait::async_trait;
use chromiumoxide::page::Page;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use super::launch::{ChromeSession, launch_chrome};
use super::scripts;
use super::stealth::{self, StealthProfile};
use crate::config::{FilterPredicate, FilterValue, RunConfig};
use crate::error::{SessionError, SurfaceError};
use crate::session::{Credentials, SurfaceLauncher, WebSurface};

const EMAIL_INPUT: &str = "input[placeholder='Email Address'], input[type='email']";
const PASSWORD_INPUT: &str = "input[placeholder='Password'], input[type='password']";
const SEARCH_INPUT: &str = "input[placeholder*='Search'], input[type='search']";
const SUGGESTION_TAGS: &str = "[role='option'], li, [class*='suggestion']";
const LOGIN_BUTTON_TEXT: &str = "Continue With Email";
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// How long a suggestion list or a scroll may take to show something new
const SETTLE_WAIT: Duration = Duration::from_secs(3);
const DETAIL_WAIT: Duration = Duration::from_secs(5);

/// Map a CDP failure onto the surface taxonomy
///
/// chromiumoxide reports a dead browser through several error variants, so
/// classification goes by message like the rest of the browser layer.
fn classify(err: impl std::fmt::Display, context: &str) -> SurfaceError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if lower.contains("closed")
        || lower.contains("channel")
        || lower.contains("websocket")
        || lower.contains("connection reset")
    {
        SurfaceError::BrowserClosed(format!("{context}: {message}"))
    } else if lower.contains("timeout") || lower.contains("timed out") {
        SurfaceError::Timeout(format!("{context}: {message}"))
    } else if lower.contains("javascript") || lower.contains("evaluate") {
        SurfaceError::Script(format!("{context}: {message}"))
    } else {
        SurfaceError::Navigation(format!("{context}: {message}"))
    }
}

pub struct ChromiumSurface {
    chrome: ChromeSession,
    page: Page,
    login_url: String,
    app_url: String,
    timeout: Duration,
    filter_panel_open: bool,
}

impl ChromiumSurface {
    async fn bounded<T, E, F>(&self, context: &str, fut: F) -> Result<T, SurfaceError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify(e, context)),
            Err(_) => Err(SurfaceError::Timeout(context.to_string())),
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str, context: &str) -> Result<T, SurfaceError> {
        let result = self.bounded(context, self.page.evaluate(script)).await?;
        result
            .into_value::<T>()
            .map_err(|e| SurfaceError::Script(format!("{context}: {e}")))
    }

    /// Re-evaluate a boolean `script` until it yields true; false once
    /// `limit` has passed
    async fn wait_for(&self, script: &str, context: &str, limit: Duration) -> Result<bool, SurfaceError> {
        let started = Instant::now();
        loop {
            if self.eval::<bool>(script, context).await? {
                return Ok(true);
            }
            if started.elapsed() >= limit {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Poll the rendered card count until `ready` accepts it or `limit` passes
    async fn wait_for_cards(&self, ready: impl Fn(usize) -> bool, limit: Duration) -> usize {
        let started = Instant::now();
        loop {
            let count = self.card_count().await;
            if ready(count) || started.elapsed() >= limit {
                return count;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> String {
        match self.page.url().await {
            Ok(Some(url)) => url,
            Ok(None) => "about:blank".to_string(),
            Err(e) => {
                trace!("Failed to read page URL: {}", e);
                "about:blank".to_string()
            }
        }
    }

    async fn ensure_logged_in(&self) -> Result<(), SurfaceError> {
        if self.current_url().await.contains("/login") {
            return Err(SurfaceError::LoggedOut);
        }
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str, what: &str) -> Result<(), SurfaceError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| SurfaceError::ControlNotFound(what.to_string()))?;
        self.bounded(what, element.click()).await?;
        self.bounded(what, element.type_str(text)).await?;
        Ok(())
    }

    async fn card_count(&self) -> usize {
        self.eval::<Vec<Value>>(scripts::COLLECT_CARDS, "count cards")
            .await
            .map_or(0, |cards| cards.len())
    }
}

#[async_trait]
impl WebSurface for ChromiumSurface {
    async fn open_login(&mut self) -> Result<(), SurfaceError> {
        info!("Opening login page");
        self.bounded("open login", self.page.goto(self.login_url.as_str()))
            .await?;
        // The SPA renders the form after load
        let started = Instant::now();
        while self.page.find_element(EMAIL_INPUT).await.is_err() {
            if !self.current_url().await.contains("login") {
                debug!("Login page redirected, session cookie still valid");
                return Ok(());
            }
            if started.elapsed() >= self.timeout {
                return Err(SurfaceError::Timeout("login form".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn submit_credentials(&mut self, credentials: &Credentials) -> Result<(), SurfaceError> {
        if !self.current_url().await.contains("login") {
            return Ok(());
        }
        self.type_into(EMAIL_INPUT, &credentials.email, "email field")
            .await?;
        self.type_into(PASSWORD_INPUT, credentials.secret.expose(), "password field")
            .await?;

        let clicked: bool = self
            .eval(
                &scripts::click_text(LOGIN_BUTTON_TEXT, "div, button, [role='button']"),
                "submit login",
            )
            .await?;
        if !clicked {
            return Err(SurfaceError::ControlNotFound(LOGIN_BUTTON_TEXT.to_string()));
        }
        Ok(())
    }

    async fn await_login_confirmation(&mut self) -> Result<(), SurfaceError> {
        let started = Instant::now();
        loop {
            if !self.current_url().await.contains("login") {
                info!("Login confirmed after {:?}", started.elapsed());
                return Ok(());
            }
            if let Ok(Some(message)) = self
                .eval::<Option<String>>(scripts::LOGIN_ERROR_TEXT, "login error")
                .await
            {
                return Err(SurfaceError::CredentialsRejected(message));
            }
            if started.elapsed() >= self.timeout {
                return Err(SurfaceError::Timeout("login confirmation".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn is_authenticated(&mut self) -> Result<bool, SurfaceError> {
        let url = self
            .bounded("check session", self.page.url())
            .await?
            .unwrap_or_default();
        Ok(!url.is_empty() && url != "about:blank" && !url.contains("/login"))
    }

    async fn is_alive(&mut self) -> bool {
        match self.chrome.browser().version().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Browser health check failed: {}", e);
                false
            }
        }
    }

    async fn open_search(&mut self) -> Result<(), SurfaceError> {
        self.ensure_logged_in().await?;
        if !self.current_url().await.starts_with(&self.app_url) {
            self.bounded("open search view", self.page.goto(self.app_url.as_str()))
                .await?;
            self.ensure_logged_in().await?;
        }
        self.filter_panel_open = false;

        let started = Instant::now();
        while self.page.find_element(SEARCH_INPUT).await.is_err() {
            if started.elapsed() >= self.timeout {
                return Err(SurfaceError::ControlNotFound("search box".to_string()));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Ok(())
    }

    async fn type_region(&mut self, region_key: &str) -> Result<(), SurfaceError> {
        self.ensure_logged_in().await?;
        let input = self
            .page
            .find_element(SEARCH_INPUT)
            .await
            .map_err(|_| SurfaceError::ControlNotFound("search box".to_string()))?;
        self.bounded("focus search", input.click()).await?;
        let _: bool = self.eval(scripts::CLEAR_SEARCH_INPUT, "clear search").await?;
        self.bounded("type region", input.type_str(region_key)).await?;
        Ok(())
    }

    async fn submit_search(&mut self, region_key: &str) -> Result<(), SurfaceError> {
        let pick = scripts::click_text(region_key, SUGGESTION_TAGS);
        if !self.wait_for(&pick, "pick suggestion", SETTLE_WAIT).await? {
            debug!("No suggestion for {region_key}, submitting with Enter");
            let input = self
                .page
                .find_element(SEARCH_INPUT)
                .await
                .map_err(|_| SurfaceError::ControlNotFound("search box".to_string()))?;
            self.bounded("submit search", input.press_key("Enter")).await?;
        }

        // An empty region renders no cards at all; that is not an error
        self.wait_for_cards(|count| count > 0, self.timeout / 4).await;
        self.ensure_logged_in().await
    }

    async fn apply_filter(&mut self, predicate: &FilterPredicate) -> Result<bool, SurfaceError> {
        self.ensure_logged_in().await?;
        let value = match &predicate.value {
            FilterValue::Toggle(on) => Value::from(*on),
            FilterValue::Range(text) => Value::from(text.as_str()),
            FilterValue::Choice(options) => Value::from(options.clone()),
        };
        self.eval(&scripts::apply_filter(&predicate.name, &value), "apply filter")
            .await
    }

    async fn open_filter_panel(&mut self) -> Result<bool, SurfaceError> {
        if self.filter_panel_open {
            return Ok(false);
        }
        // Advanced predicates live behind the "More" panel
        let opened: bool = self
            .eval(&scripts::click_text("More", "button, div"), "open filters")
            .await?;
        if !opened {
            return Ok(false);
        }
        let rendered = scripts::has_text("Apply", "button");
        if !self.wait_for(&rendered, "filter panel", self.timeout / 4).await? {
            return Err(SurfaceError::Timeout("filter panel".to_string()));
        }
        self.filter_panel_open = true;
        Ok(true)
    }

    async fn commit_filters(&mut self) -> Result<(), SurfaceError> {
        if !self.filter_panel_open {
            return Ok(());
        }
        let applied: bool = self
            .eval(&scripts::click_text("Apply", "button"), "apply filters")
            .await?;
        if !applied {
            return Err(SurfaceError::ControlNotFound("Apply button".to_string()));
        }
        self.filter_panel_open = false;

        let closed = format!("!{}", scripts::has_text("Apply", "button"));
        if !self.wait_for(&closed, "close filter panel", self.timeout / 4).await? {
            warn!("Filter panel still open after Apply");
        }
        self.ensure_logged_in().await
    }

    async fn visible_cards(&mut self) -> Result<Vec<Value>, SurfaceError> {
        self.ensure_logged_in().await?;
        self.eval(scripts::COLLECT_CARDS, "collect cards").await
    }

    async fn scroll_results(&mut self) -> Result<(), SurfaceError> {
        self.ensure_logged_in().await?;
        let before = self.card_count().await;
        let _: bool = self.eval(scripts::SCROLL_RESULTS, "scroll results").await?;
        // Nothing new after the wait is how the end of the list looks
        self.wait_for_cards(|count| count > before, SETTLE_WAIT).await;
        Ok(())
    }

    async fn card_details(
        &mut self,
        source_id: &str,
        address: &str,
    ) -> Result<Option<String>, SurfaceError> {
        self.ensure_logged_in().await?;
        let opened: bool = self
            .eval(&scripts::open_card(source_id, address), "open card")
            .await?;
        if !opened {
            debug!("Card {source_id} is no longer on the page");
            return Ok(None);
        }

        let started = Instant::now();
        let text = loop {
            if let Some(text) = self
                .eval::<Option<String>>(scripts::DETAIL_TEXT, "read details")
                .await?
            {
                break Some(text);
            }
            if started.elapsed() >= DETAIL_WAIT {
                break None;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        };

        let _: bool = self.eval(scripts::CLOSE_DETAILS, "close details").await?;
        let closed = format!("{} === null", scripts::DETAIL_TEXT.trim());
        if !self.wait_for(&closed, "close details", DETAIL_WAIT).await? {
            warn!("Detail view of {source_id} did not close");
        }
        self.ensure_logged_in().await?;
        Ok(text)
    }

    async fn close(&mut self) {
        self.chrome.shutdown().await;
    }
}

/// Launches a stealth Chrome and opens one blank page in it
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    timeout: Duration,
    login_url: String,
    app_url: String,
    stealth: StealthProfile,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            headless: config.headless(),
            timeout: config.page_timeout(),
            login_url: config.login_url().to_string(),
            app_url: config.app_url().to_string(),
            stealth: StealthProfile::default(),
        }
    }

    #[must_use]
    pub fn with_stealth(mut self, profile: StealthProfile) -> Self {
        self.stealth = profile;
        self
    }
}

#[async_trait]
impl SurfaceLauncher for ChromiumLauncher {
    type Surface = ChromiumSurface;

    async fn launch(&self) -> Result<ChromiumSurface, SessionError> {
        let mut chrome = launch_chrome(self.headless, self.timeout)
            .await
            .map_err(|e| SessionError::Launch(format!("{e:#}")))?;

        let page = match chrome.browser().new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                chrome.shutdown().await;
                return Err(SessionError::Launch(format!("failed to open page: {e}")));
            }
        };
        if let Err(e) = stealth::inject(&page, &self.stealth).await {
            chrome.shutdown().await;
            return Err(SessionError::Launch(format!("stealth injection failed: {e:#}")));
        }

        Ok(ChromiumSurface {
            chrome,
            page,
            login_url: self.login_url.clone(),
            app_url: self.app_url.clone(),
            timeout: self.timeout,
            filter_panel_open: false,
        })
    }
}
