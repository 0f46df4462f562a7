use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_SECTION_ID, DEFAULT_STATE_FILE, MAX_PAGES, PAGE_SIZE,
    REQUEST_TIMEOUT, SLEEP_MAX, SLEEP_MIN, STALE_PAGE_THRESHOLD, USER_AGENT,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Monitor configuration.
///
/// Only the forum location and the state path come from the environment.
/// The pagination and politeness policy is fixed by [`crate::constants`];
/// it lives here so tests can shrink it.
#[derive(Debug, Clone)]
pub struct Config {
    // Forum
    pub base_url: String,
    pub section_id: u32,
    pub user_agent: String,

    // State
    pub state_path: PathBuf,

    // Pagination policy
    pub page_size: u32,
    pub max_pages: u32,
    pub stale_page_threshold: u32,

    // Politeness
    pub sleep_min: Duration,
    pub sleep_max: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or_default("FORUM_BASE_URL", DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            section_id: parse_env_u32("FORUM_SECTION_ID", DEFAULT_SECTION_ID)?,
            state_path: PathBuf::from(env_or_default("STATE_FILE", DEFAULT_STATE_FILE)),
            ..Self::with_defaults()
        })
    }

    /// Configuration with every field at its built-in default.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            section_id: DEFAULT_SECTION_ID,
            user_agent: USER_AGENT.to_string(),
            state_path: PathBuf::from(DEFAULT_STATE_FILE),
            page_size: PAGE_SIZE,
            max_pages: MAX_PAGES,
            stale_page_threshold: STALE_PAGE_THRESHOLD,
            sleep_min: SLEEP_MIN,
            sleep_max: SLEEP_MAX,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Defaults without the inter-page pause, for tests against a mock forum.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            sleep_min: Duration::ZERO,
            sleep_max: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            ..Self::with_defaults()
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match url::Url::parse(&self.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            Ok(url) => {
                return Err(ConfigError::InvalidValue {
                    name: "FORUM_BASE_URL".to_string(),
                    message: format!("unsupported scheme '{}'", url.scheme()),
                });
            }
            Err(e) => {
                return Err(ConfigError::InvalidValue {
                    name: "FORUM_BASE_URL".to_string(),
                    message: e.to_string(),
                });
            }
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "page_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.stale_page_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                name: "stale_page_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.sleep_min > self.sleep_max {
            return Err(ConfigError::InvalidValue {
                name: "sleep_min".to_string(),
                message: "cannot exceed sleep_max".to_string(),
            });
        }
        if self.state_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "STATE_FILE".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }

    /// URL of the listing page starting at `offset`.
    #[must_use]
    pub fn listing_url(&self, offset: u32) -> String {
        format!("{}/forum/{}/+{offset}", self.base_url, self.section_id)
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
