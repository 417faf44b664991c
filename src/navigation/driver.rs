//! Region search, filter application and scroll-based pagination
//!
//! Every surface call goes through the navigation governor, which adds the
//! human-like pause and retries transient failures. A predicate with no
//! matching control is a `FilterError`, never a silent skip.

use log::{debug, info};
use serde_json::Value;
use std::collections::HashSet;

use super::page::{PageLoad, RawResultPage};
use crate::config::FilterPredicate;
use crate::error::{FilterError, NavigationError, SurfaceError};
use crate::governor::{Attempted, Governor, GovernorError};
use crate::regions::Region;
use crate::session::WebSurface;
use crate::utils::constants::EXHAUSTION_STABLE_LOADS;

fn lift<T>(
    result: Result<Attempted<T>, GovernorError<SurfaceError>>,
) -> Result<T, NavigationError> {
    match result {
        Ok(done) => Ok(done.value),
        Err(GovernorError::CircuitOpen { label }) => {
            Err(NavigationError::CircuitOpen { operation: label })
        }
        Err(GovernorError::Fatal {
            label,
            attempt,
            error,
        }) => Err(NavigationError::Surface {
            operation: label,
            attempts: attempt,
            source: error,
        }),
        Err(GovernorError::Exhausted {
            label,
            attempts,
            error,
        }) => Err(NavigationError::Surface {
            operation: label,
            attempts,
            source: error,
        }),
    }
}

/// Card identity for "have we yielded this already"; explicit ids win,
/// otherwise the whole serialized card
fn fingerprint(card: &Value) -> String {
    card.get("sourceId")
        .or_else(|| card.get("source_id"))
        .or_else(|| card.get("id"))
        .and_then(|id| match id {
            Value::String(s) if !s.trim().is_empty() => Some(format!("id:{}", s.trim())),
            Value::Number(n) => Some(format!("id:{n}")),
            _ => None,
        })
        .unwrap_or_else(|| card.to_string())
}

/// Drives one region at a time; state resets on `begin_region`
pub struct NavigationDriver {
    governor: Governor,
    max_scrolls: u32,
    region_key: String,
    seen: HashSet<String>,
    yielded: usize,
    loads: u32,
    scrolls: u32,
    stale_loads: u32,
    exhausted: bool,
}

impl NavigationDriver {
    #[must_use]
    pub fn new(governor: Governor, max_scrolls: u32) -> Self {
        Self {
            governor,
            max_scrolls: max_scrolls.max(1),
            region_key: String::new(),
            seen: HashSet::new(),
            yielded: 0,
            loads: 0,
            scrolls: 0,
            stale_loads: 0,
            exhausted: false,
        }
    }

    /// Start a fresh region: forget everything seen so far
    pub fn begin_region(&mut self, region_key: &str) {
        self.region_key = region_key.to_string();
        self.seen.clear();
        self.yielded = 0;
        self.restart_pagination();
    }

    /// Rewind scroll state after re-authentication while keeping the set of
    /// cards already yielded, so the same card is never handed out twice
    pub fn restart_pagination(&mut self) {
        self.loads = 0;
        self.scrolls = 0;
        self.stale_loads = 0;
        self.exhausted = false;
    }

    /// Search for the region, then set every active predicate
    ///
    /// Each UI step is its own governed call. A predicate that is not on
    /// the page gets one more try after the advanced filter panel is opened.
    ///
    /// # Errors
    ///
    /// `NavigationError::Filter` when a predicate has no control;
    /// `Surface`/`CircuitOpen` when the surface keeps failing.
    pub async fn apply_filters<S>(
        &mut self,
        surface: &mut S,
        region: &Region,
    ) -> Result<(), NavigationError>
    where
        S: WebSurface + ?Sized,
    {
        let key = region.key.as_str();
        lift(
            self.governor
                .execute_on(surface, "open search", |s| Box::pin(s.open_search()))
                .await,
        )?;
        lift(
            self.governor
                .execute_on(surface, "type region", |s| {
                    let key = key.to_string();
                    Box::pin(async move { s.type_region(&key).await })
                })
                .await,
        )?;
        lift(
            self.governor
                .execute_on(surface, "submit search", |s| {
                    let key = key.to_string();
                    Box::pin(async move { s.submit_search(&key).await })
                })
                .await,
        )?;

        let mut applied = 0usize;
        for predicate in region.filters.iter().filter(|p| p.value.is_active()) {
            let mut matched = self.set_filter(surface, predicate).await?;
            if !matched
                && lift(
                    self.governor
                        .execute_on(surface, "open filter panel", |s| {
                            Box::pin(s.open_filter_panel())
                        })
                        .await,
                )?
            {
                debug!("{}: opened the filter panel for {}", region.key, predicate.name);
                matched = self.set_filter(surface, predicate).await?;
            }
            if !matched {
                return Err(FilterError {
                    region: region.key.clone(),
                    predicate: predicate.name.clone(),
                }
                .into());
            }
            debug!("{}: applied filter {} = {}", region.key, predicate.name, predicate.value);
            applied += 1;
        }

        if applied > 0 {
            lift(
                self.governor
                    .execute_on(surface, "commit filters", |s| Box::pin(s.commit_filters()))
                    .await,
            )?;
        }
        info!("{}: search ready with {applied} filter(s)", region.key);
        Ok(())
    }

    async fn set_filter<S>(
        &self,
        surface: &mut S,
        predicate: &FilterPredicate,
    ) -> Result<bool, NavigationError>
    where
        S: WebSurface + ?Sized,
    {
        lift(
            self.governor
                .execute_on(surface, "apply filter", |s| {
                    let predicate = predicate.clone();
                    Box::pin(async move { s.apply_filter(&predicate).await })
                })
                .await,
        )
    }

    /// Text of one card's detail view, if it opens
    ///
    /// # Errors
    ///
    /// `NavigationError::Surface` when the view cannot be read within the
    /// retry budget, including a detected logout.
    pub async fn card_details<S>(
        &self,
        surface: &mut S,
        source_id: &str,
        address: &str,
    ) -> Result<Option<String>, NavigationError>
    where
        S: WebSurface + ?Sized,
    {
        lift(
            self.governor
                .execute_on(surface, "card details", |s| {
                    let (source_id, address) = (source_id.to_string(), address.to_string());
                    Box::pin(async move { s.card_details(&source_id, &address).await })
                })
                .await,
        )
    }

    /// Advance pagination until new cards appear or the list is exhausted
    ///
    /// # Errors
    ///
    /// `NavigationError::Surface` when scrolling or reading fails beyond the
    /// retry budget, including a detected logout.
    pub async fn load_page<S>(&mut self, surface: &mut S) -> Result<PageLoad, NavigationError>
    where
        S: WebSurface + ?Sized,
    {
        loop {
            if self.exhausted {
                return Ok(PageLoad::Exhausted);
            }

            if self.loads > 0 {
                if self.scrolls >= self.max_scrolls {
                    info!("{}: max scrolls ({}) reached", self.region_key, self.max_scrolls);
                    self.exhausted = true;
                    continue;
                }
                lift(
                    self.governor
                        .execute_on(surface, "scroll results", |s| Box::pin(s.scroll_results()))
                        .await,
                )?;
                self.scrolls += 1;
            }

            let cards = lift(
                self.governor
                    .execute_on(surface, "read results", |s| Box::pin(s.visible_cards()))
                    .await,
            )?;
            self.loads += 1;

            let fresh: Vec<Value> = cards
                .into_iter()
                .filter(|card| self.seen.insert(fingerprint(card)))
                .collect();

            if fresh.is_empty() {
                self.stale_loads += 1;
                debug!(
                    "{}: no new cards ({}/{EXHAUSTION_STABLE_LOADS})",
                    self.region_key, self.stale_loads
                );
                if self.stale_loads >= EXHAUSTION_STABLE_LOADS {
                    info!(
                        "{}: result list exhausted after {} card(s)",
                        self.region_key, self.yielded
                    );
                    self.exhausted = true;
                }
                continue;
            }

            self.stale_loads = 0;
            let page = RawResultPage {
                region_key: self.region_key.clone(),
                offset: self.yielded,
                candidates: fresh,
            };
            self.yielded += page.candidates.len();
            return Ok(PageLoad::Page(page));
        }
    }
}
