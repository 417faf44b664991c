//! Chrome-backed implementation of the web surface

pub mod launch;
pub mod scripts;
pub mod stealth;
pub mod surface;

pub use stealth::StealthProfile;
pub use surface::{ChromiumLauncher, ChromiumSurface};
