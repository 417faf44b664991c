//! Authenticated session ownership
//!
//! [`SessionManager`] owns the single browser session of a run and hands out
//! an Active [`Session`] on demand. All page access goes through the
//! [`WebSurface`] trait.

pub mod manager;
pub mod surface;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use manager::{Session, SessionManager, SessionState};
pub use surface::{Credentials, SurfaceLauncher, WebSurface};
