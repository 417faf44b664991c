//! Scripted in-memory surface shared by unit and integration tests
//!
//! Builder-style setters take `&self` and return a handle to the same world,
//! so they work both while building a world and on one already in use.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use super::surface::{Credentials, SurfaceLauncher, WebSurface};
use crate::config::FilterPredicate;
use crate::error::{SessionError, SurfaceError};

struct WorldState {
    alive: bool,
    authenticated: bool,
    rejections_left: u32,
    logins: u32,
    launches: u32,
    results: HashMap<String, Vec<Vec<Value>>>,
    details: HashMap<String, String>,
    current_region: Option<String>,
    typed: Option<String>,
    revealed: usize,
    unknown_filters: HashSet<String>,
    panel_filters: HashSet<String>,
    panel_open: bool,
    applied_filters: Vec<String>,
    failures: HashMap<&'static str, u32>,
    logout_after_scrolls: Option<u32>,
    scrolls: u32,
    searches: Vec<String>,
    calls: Vec<&'static str>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            alive: true,
            authenticated: false,
            rejections_left: 0,
            logins: 0,
            launches: 0,
            results: HashMap::new(),
            details: HashMap::new(),
            current_region: None,
            typed: None,
            revealed: 0,
            unknown_filters: HashSet::new(),
            panel_filters: HashSet::new(),
            panel_open: false,
            applied_filters: Vec::new(),
            failures: HashMap::new(),
            logout_after_scrolls: None,
            scrolls: 0,
            searches: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl WorldState {
    /// Journal the step and consume one scripted transient failure for it
    fn enter(&mut self, step: &'static str) -> Result<(), SurfaceError> {
        self.calls.push(step);
        match self.failures.get_mut(step) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(SurfaceError::Timeout(step.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn check_session(&self) -> Result<(), SurfaceError> {
        if !self.alive {
            return Err(SurfaceError::BrowserClosed("fake browser crashed".into()));
        }
        if !self.authenticated {
            return Err(SurfaceError::LoggedOut);
        }
        Ok(())
    }
}

/// Scripted remote application shared by every surface a test launches
#[derive(Clone, Default)]
pub struct FakeWorld(Arc<Mutex<WorldState>>);

impl FakeWorld {
    fn lock(&self) -> MutexGuard<'_, WorldState> {
        self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn step(&self, step: &'static str) -> Result<MutexGuard<'_, WorldState>, SurfaceError> {
        let mut state = self.lock();
        state.enter(step)?;
        Ok(state)
    }

    /// Like `step`, but only for an authenticated, running browser
    fn session_step(
        &self,
        step: &'static str,
    ) -> Result<MutexGuard<'_, WorldState>, SurfaceError> {
        let state = self.step(step)?;
        state.check_session()?;
        Ok(state)
    }

    /// Result cards for `region`, revealed one page per scroll
    pub fn with_pages(self, region: &str, pages: Vec<Vec<Value>>) -> Self {
        self.lock().results.insert(region.to_string(), pages);
        self
    }

    /// Text shown by the detail view of the card with `source_id`
    pub fn with_details(self, source_id: &str, text: &str) -> Self {
        self.lock()
            .details
            .insert(source_id.to_string(), text.to_string());
        self
    }

    /// The filter control named `name` does not exist on the page
    pub fn without_filter(&self, name: &str) -> Self {
        self.lock().unknown_filters.insert(name.to_string());
        self.clone()
    }

    /// The filter control named `name` only shows once the panel is open
    pub fn in_filter_panel(&self, name: &str) -> Self {
        self.lock().panel_filters.insert(name.to_string());
        self.clone()
    }

    /// Refuse the next `count` logins
    pub fn reject_logins(&self, count: u32) -> Self {
        self.lock().rejections_left = count;
        self.clone()
    }

    /// Fail the next `count` calls of `step` with a timeout
    pub fn fail_next(&self, step: &'static str, count: u32) -> Self {
        self.lock().failures.insert(step, count);
        self.clone()
    }

    /// The application logs the user out on the `n`th scroll from now
    pub fn log_out_after_scrolls(&self, scrolls: u32) -> Self {
        {
            let mut state = self.lock();
            state.logout_after_scrolls = Some(state.scrolls + scrolls);
        }
        self.clone()
    }

    pub fn log_out(&self) {
        self.lock().authenticated = false;
    }

    pub fn crash_browser(&self) {
        self.lock().alive = false;
    }

    pub fn logins(&self) -> u32 {
        self.lock().logins
    }

    pub fn launches(&self) -> u32 {
        self.lock().launches
    }

    /// Region keys submitted to the search, in order
    pub fn searches(&self) -> Vec<String> {
        self.lock().searches.clone()
    }

    pub fn applied_filters(&self) -> Vec<String> {
        self.lock().applied_filters.clone()
    }

    /// Every surface step taken, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.lock().calls.clone()
    }

    /// How many times `step` was attempted
    pub fn count(&self, step: &str) -> usize {
        self.lock().calls.iter().filter(|c| **c == step).count()
    }
}

pub struct FakeSurface {
    world: FakeWorld,
}

#[async_trait]
impl WebSurface for FakeSurface {
    async fn open_login(&mut self) -> Result<(), SurfaceError> {
        let state = self.world.step("open login")?;
        if state.alive {
            Ok(())
        } else {
            Err(SurfaceError::BrowserClosed("fake browser crashed".into()))
        }
    }

    async fn submit_credentials(&mut self, _credentials: &Credentials) -> Result<(), SurfaceError> {
        self.world.step("submit credentials").map(|_| ())
    }

    async fn await_login_confirmation(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.world.step("confirm login")?;
        if state.rejections_left > 0 {
            state.rejections_left -= 1;
            return Err(SurfaceError::CredentialsRejected("invalid password".into()));
        }
        state.authenticated = true;
        state.logins += 1;
        Ok(())
    }

    async fn is_authenticated(&mut self) -> Result<bool, SurfaceError> {
        let state = self.world.lock();
        if !state.alive {
            return Err(SurfaceError::BrowserClosed("fake browser crashed".into()));
        }
        Ok(state.authenticated)
    }

    async fn is_alive(&mut self) -> bool {
        self.world.lock().alive
    }

    async fn open_search(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.world.session_step("open search")?;
        state.panel_open = false;
        state.typed = None;
        Ok(())
    }

    async fn type_region(&mut self, region_key: &str) -> Result<(), SurfaceError> {
        let mut state = self.world.session_step("type region")?;
        state.typed = Some(region_key.to_string());
        Ok(())
    }

    async fn submit_search(&mut self, region_key: &str) -> Result<(), SurfaceError> {
        let mut state = self.world.session_step("submit search")?;
        if state.typed.as_deref() != Some(region_key) {
            return Err(SurfaceError::ControlNotFound(format!(
                "suggestion for {region_key}"
            )));
        }
        state.current_region = Some(region_key.to_string());
        state.revealed = 1;
        state.searches.push(region_key.to_string());
        Ok(())
    }

    async fn apply_filter(&mut self, predicate: &FilterPredicate) -> Result<bool, SurfaceError> {
        let mut state = self.world.session_step("apply filter")?;
        let name = &predicate.name;
        if state.unknown_filters.contains(name)
            || (state.panel_filters.contains(name) && !state.panel_open)
        {
            return Ok(false);
        }
        state.applied_filters.push(name.clone());
        Ok(true)
    }

    async fn open_filter_panel(&mut self) -> Result<bool, SurfaceError> {
        let mut state = self.world.session_step("open filter panel")?;
        if state.panel_open {
            return Ok(false);
        }
        state.panel_open = true;
        Ok(true)
    }

    async fn commit_filters(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.world.session_step("commit filters")?;
        state.panel_open = false;
        Ok(())
    }

    async fn visible_cards(&mut self) -> Result<Vec<Value>, SurfaceError> {
        let state = self.world.session_step("read results")?;
        let cards = state
            .current_region
            .as_ref()
            .and_then(|region| state.results.get(region))
            .map(|pages| pages.iter().take(state.revealed).flatten().cloned().collect())
            .unwrap_or_default();
        Ok(cards)
    }

    async fn scroll_results(&mut self) -> Result<(), SurfaceError> {
        let mut state = self.world.session_step("scroll results")?;
        state.scrolls += 1;
        if state.logout_after_scrolls == Some(state.scrolls) {
            state.logout_after_scrolls = None;
            state.authenticated = false;
            return Err(SurfaceError::LoggedOut);
        }
        state.revealed += 1;
        Ok(())
    }

    async fn card_details(
        &mut self,
        source_id: &str,
        _address: &str,
    ) -> Result<Option<String>, SurfaceError> {
        let state = self.world.session_step("card details")?;
        Ok(state.details.get(source_id).cloned())
    }

    async fn close(&mut self) {}
}

pub struct FakeLauncher {
    world: FakeWorld,
}

impl FakeLauncher {
    pub fn new(world: &FakeWorld) -> Self {
        Self {
            world: world.clone(),
        }
    }
}

#[async_trait]
impl SurfaceLauncher for FakeLauncher {
    type Surface = FakeSurface;

    async fn launch(&self) -> Result<FakeSurface, SessionError> {
        {
            let mut state = self.world.lock();
            state.launches += 1;
            state.alive = true;
            state.authenticated = false;
            state.panel_open = false;
        }
        Ok(FakeSurface {
            world: self.world.clone(),
        })
    }
}
