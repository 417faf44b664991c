//! Session lifecycle: launch, login, validation and recovery
//!
//! The manager owns at most one [`Session`]. The surface inside it is reused
//! across regions; it is only thrown away when the browser itself is gone.
//!
//! # State machine
//! - `Unauthenticated -> Authenticating -> Active` on a confirmed login
//! - `Authenticating -> Unauthenticated` when login fails
//! - `Active -> Expired` on a failed check or a detected logout; the next
//!   `acquire()` logs in again on the same surface
//! - any state `-> Invalid` when the browser is unreachable; the next
//!   `acquire()` closes it and launches a new one

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use std::fmt;
use uuid::Uuid;

use super::surface::{Credentials, SurfaceLauncher, WebSurface};
use crate::error::{SessionError, SurfaceError};
use crate::governor::{Governor, GovernorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Active,
    Expired,
    Invalid,
}

/// An authenticated (or authenticating) browsing context
pub struct Session<S> {
    id: Uuid,
    state: SessionState,
    last_activity_at: DateTime<Utc>,
    surface: S,
}

impl<S> Session<S> {
    fn new(surface: S) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Unauthenticated,
            last_activity_at: Utc::now(),
            surface,
        }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.last_activity_at
    }

    /// Borrow the surface for a unit of work; counts as activity
    pub fn surface_mut(&mut self) -> &mut S {
        self.last_activity_at = Utc::now();
        &mut self.surface
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Session {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("last_activity_at", &self.last_activity_at)
            .finish_non_exhaustive()
    }
}

pub struct SessionManager<L: SurfaceLauncher> {
    launcher: L,
    credentials: Credentials,
    /// Governs each login step on its own
    login_governor: Governor,
    /// Full open/submit/confirm sequences before credentials count as rejected
    max_login_attempts: u32,
    session: Option<Session<L::Surface>>,
    launches: u32,
}

impl<L: SurfaceLauncher> SessionManager<L> {
    /// Create a manager; nothing is launched until the first `acquire()`
    ///
    /// Every login step goes through `login_governor`, which retries that
    /// step alone on transient failures. A rejection restarts the whole
    /// sequence, at most `max_login_attempts` times in total.
    pub fn new(
        launcher: L,
        credentials: Credentials,
        login_governor: Governor,
        max_login_attempts: u32,
    ) -> Self {
        Self {
            launcher,
            credentials,
            login_governor,
            max_login_attempts: max_login_attempts.max(1),
            session: None,
            launches: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map_or(SessionState::Unauthenticated, Session::state)
    }

    /// Browsers launched so far (first launch plus relaunches)
    #[must_use]
    pub fn launches(&self) -> u32 {
        self.launches
    }

    /// Return an Active session, launching and logging in as needed
    ///
    /// # Errors
    ///
    /// `SessionError::Auth` when the credentials are rejected on every
    /// attempt (fatal to the run); `Launch` or `Unavailable` otherwise.
    pub async fn acquire(&mut self) -> Result<&mut Session<L::Surface>, SessionError> {
        if self.state() == SessionState::Active && !self.validate().await {
            info!("Held session failed validation, re-authenticating");
        }

        let session = match self.session.take() {
            Some(session) if session.state != SessionState::Invalid => session,
            stale => {
                if let Some(mut dead) = stale {
                    warn!("Session {} invalid, relaunching browser", dead.id);
                    dead.surface.close().await;
                }
                let surface = self.launcher.launch().await?;
                self.launches += 1;
                Session::new(surface)
            }
        };
        let session = self.session.insert(session);

        if session.state != SessionState::Active {
            Self::login(
                &self.login_governor,
                self.max_login_attempts,
                &self.credentials,
                session,
            )
            .await?;
        }
        Ok(session)
    }

    /// Check the held session; a negative or failed check marks it Expired
    /// (or Invalid when the browser is gone)
    pub async fn validate(&mut self) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        if session.state != SessionState::Active {
            return false;
        }

        if !session.surface.is_alive().await {
            warn!("Browser health check failed for session {}", session.id);
            session.transition(SessionState::Invalid);
            return false;
        }

        match session.surface.is_authenticated().await {
            Ok(true) => {
                session.last_activity_at = Utc::now();
                true
            }
            Ok(false) => {
                info!("Session {} no longer authenticated", session.id);
                session.transition(SessionState::Expired);
                false
            }
            Err(e) => {
                debug!("Session check failed, treating as expired: {e}");
                session.transition(if matches!(e, SurfaceError::BrowserClosed(_)) {
                    SessionState::Invalid
                } else {
                    SessionState::Expired
                });
                false
            }
        }
    }

    /// Force re-authentication on the next `acquire()`
    pub fn invalidate(&mut self) {
        if let Some(session) = self.session.as_mut()
            && session.state != SessionState::Invalid
        {
            session.transition(SessionState::Expired);
        }
    }

    /// Record that the surface failed in a way that ends the session
    pub fn report_lost(&mut self, cause: &SurfaceError) {
        match cause {
            SurfaceError::BrowserClosed(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.transition(SessionState::Invalid);
                }
            }
            _ => self.invalidate(),
        }
    }

    /// Close the browser if one is running; safe to call repeatedly
    pub async fn shutdown(&mut self) {
        if let Some(mut session) = self.session.take() {
            info!("Closing session {}", session.id);
            session.surface.close().await;
        }
    }

    async fn login(
        governor: &Governor,
        max_attempts: u32,
        credentials: &Credentials,
        session: &mut Session<L::Surface>,
    ) -> Result<(), SessionError> {
        session.transition(SessionState::Authenticating);
        info!("Logging in as {}", credentials.email);

        let mut attempt = 0;
        let outcome = loop {
            attempt += 1;
            match Self::login_once(governor, credentials, &mut session.surface).await {
                Err(GovernorError::Fatal {
                    error: SurfaceError::CredentialsRejected(reason),
                    ..
                }) if attempt < max_attempts => {
                    warn!("Login attempt {attempt}/{max_attempts} rejected ({reason}), retrying");
                    tokio::time::sleep(governor.retry_policy().delay_for(attempt)).await;
                }
                other => break other,
            }
        };

        match outcome {
            Ok(()) => {
                session.transition(SessionState::Active);
                session.last_activity_at = Utc::now();
                info!("Session {} active after {attempt} login attempt(s)", session.id);
                Ok(())
            }
            Err(GovernorError::CircuitOpen { label }) => {
                session.transition(SessionState::Unauthenticated);
                Err(SessionError::Unavailable(format!("{label} circuit open")))
            }
            Err(err) => {
                let Some(cause) = err.into_error() else {
                    session.transition(SessionState::Unauthenticated);
                    return Err(SessionError::Unavailable("login not attempted".to_string()));
                };
                match cause {
                    SurfaceError::CredentialsRejected(reason) => {
                        session.transition(SessionState::Unauthenticated);
                        Err(SessionError::Auth {
                            attempts: attempt,
                            reason,
                        })
                    }
                    SurfaceError::BrowserClosed(reason) => {
                        session.transition(SessionState::Invalid);
                        Err(SessionError::Unavailable(reason))
                    }
                    other => {
                        session.transition(SessionState::Unauthenticated);
                        Err(SessionError::Unavailable(other.to_string()))
                    }
                }
            }
        }
    }

    /// One open/submit/confirm sequence, each step paced and retried alone
    async fn login_once(
        governor: &Governor,
        credentials: &Credentials,
        surface: &mut L::Surface,
    ) -> Result<(), GovernorError<SurfaceError>> {
        governor
            .execute_on(surface, "open login", |s| Box::pin(s.open_login()))
            .await?;
        governor
            .execute_on(surface, "submit credentials", |s| {
                let credentials = credentials.clone();
                Box::pin(async move { s.submit_credentials(&credentials).await })
            })
            .await?;
        governor
            .execute_on(surface, "confirm login", |s| {
                Box::pin(s.await_login_confirmation())
            })
            .await?;
        Ok(())
    }
}
