//! Shared configuration constants for dealscrape
//!
//! This module contains default values and configuration constants used
//! throughout the codebase to ensure consistency and avoid magic numbers.

/// Default number of attempts (first try included) for governed calls
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Default base delay for exponential backoff, in milliseconds
///
/// Attempt `n` waits `base * 2^(n-1)` plus jitter in `[0, base)`.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Lower bound of the human-like pause before every navigation action
pub const DEFAULT_PACING_MIN_MS: u64 = 400;

/// Upper bound of the human-like pause before every navigation action
pub const DEFAULT_PACING_MAX_MS: u64 = 1_800;

/// Login attempts before credentials are considered rejected
pub const DEFAULT_MAX_LOGIN_ATTEMPTS: u32 = 3;

/// Scroll/load cycles per region before the result list is treated as exhausted
pub const DEFAULT_MAX_SCROLLS: u32 = 60;

/// Consecutive loads without new cards that signal the end of the list
pub const EXHAUSTION_STABLE_LOADS: u32 = 2;

/// Times a region may re-authenticate after a detected logout before it fails
pub const DEFAULT_SESSION_RECOVERIES: u32 = 2;

/// Consecutive failures before an operation's circuit opens
pub const DEFAULT_CIRCUIT_FAILURE_THRESHOLD: u32 = 5;

/// Cool-down before an open circuit lets a trial call through
pub const DEFAULT_CIRCUIT_COOLDOWN_SECS: u64 = 300;

/// Successes in half-open state needed to close the circuit again
pub const CIRCUIT_SUCCESS_THRESHOLD: u32 = 2;

/// Card detail views opened per region when deep scraping is on
pub const DEFAULT_MODAL_LIMIT: usize = 250;

/// Timeout for individual browser operations (navigation, element waits)
pub const DEFAULT_PAGE_TIMEOUT_SECS: u64 = 60;

/// Timeout for a single sink HTTP request
pub const SINK_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Login page of the source application
pub const DEFAULT_LOGIN_URL: &str = "https://app.dealmachine.com/login";

/// Map/search view that lists property cards
pub const DEFAULT_APP_URL: &str = "https://app.dealmachine.com/app/map";

/// Airtable REST API root
pub const DEFAULT_SINK_BASE_URL: &str = "https://api.airtable.com/v0";

/// Field the sink merges upserts on
pub const SINK_MERGE_FIELD: &str = "Source ID";

/// Default location of the run-state checkpoint
pub const DEFAULT_CHECKPOINT_PATH: &str = "state/checkpoint.json";

/// Default location of the append-only fallback log
pub const DEFAULT_FALLBACK_PATH: &str = "state/fallback.jsonl";

/// Config file read when neither `--config` nor `DEALSCRAPE_CONFIG` is given
pub const DEFAULT_CONFIG_PATH: &str = "dealscrape.json";

/// Env file read when `--env-file` is not given; optional
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Chrome user agent string for stealth mode
///
/// Updated: 2025-01-29 to Chrome 132 (current stable)
pub const CHROME_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36";
