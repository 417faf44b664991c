//! Chrome process lifecycle for one scrape session

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfigBuilder, HeadlessMode};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::{self, JoinHandle};
use tracing::{error, info, trace, warn};

use crate::utils::constants::CHROME_USER_AGENT;

/// Overrides chromiumoxide's own executable discovery
const CHROME_PATH_VAR: &str = "CHROMIUM_PATH";

/// Flags that keep the automation banner and background work out of the way
const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-infobars",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--disable-extensions",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-features=TranslateUI",
    "--no-first-run",
    "--no-default-browser-check",
    "--no-sandbox",
    "--password-store=basic",
    "--use-mock-keychain",
    "--mute-audio",
    "--lang=en-US",
];

/// A running Chrome, the task pumping its CDP events, and its throwaway profile
pub struct ChromeSession {
    browser: Browser,
    events: JoinHandle<()>,
    profile_dir: Option<PathBuf>,
}

impl ChromeSession {
    pub(crate) fn browser(&self) -> &Browser {
        &self.browser
    }

    /// Close Chrome, wait for the process, then delete the profile
    pub(crate) async fn shutdown(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Chrome did not close cleanly: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Waiting for Chrome to exit failed: {e}");
        }
        self.remove_profile();
    }

    fn remove_profile(&mut self) {
        if let Some(dir) = self.profile_dir.take()
            && let Err(e) = std::fs::remove_dir_all(&dir)
        {
            warn!("Could not remove browser profile {}: {e}", dir.display());
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.events.abort();
        self.remove_profile();
    }
}

/// Start Chrome with a fresh profile and the stealth launch flags
pub async fn launch_chrome(headless: bool, request_timeout: Duration) -> Result<ChromeSession> {
    // One profile per launch so a relaunch never trips over a stale lock
    let profile_dir = std::env::temp_dir().join(format!(
        "dealscrape_chrome_{}",
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::create_dir_all(&profile_dir).context("Failed to create browser profile directory")?;

    let mut builder = BrowserConfigBuilder::default()
        .request_timeout(request_timeout)
        .window_size(1920, 1080)
        .user_data_dir(profile_dir.clone())
        .arg(format!("--user-agent={CHROME_USER_AGENT}"))
        .args(LAUNCH_ARGS.iter().copied());
    if let Ok(path) = std::env::var(CHROME_PATH_VAR) {
        info!("Using Chrome from {CHROME_PATH_VAR}: {path}");
        builder = builder.chrome_executable(path);
    }
    builder = if headless {
        builder.headless_mode(HeadlessMode::default())
    } else {
        builder.with_head()
    };
    let config = builder
        .build()
        .map_err(|e| anyhow::anyhow!("Chrome not usable ({e}); set {CHROME_PATH_VAR}"))?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .context("Failed to launch Chrome")?;

    let events = task::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                let message = e.to_string();
                // chromiumoxide does not model every CDP event Chrome emits
                if message.contains("did not match any variant") {
                    trace!("Ignored unknown CDP message: {message}");
                } else {
                    error!("CDP handler error: {e:?}");
                }
            }
        }
    });

    info!("Chrome launched (headless: {headless})");
    Ok(ChromeSession {
        browser,
        events,
        profile_dir: Some(profile_dir),
    })
}
