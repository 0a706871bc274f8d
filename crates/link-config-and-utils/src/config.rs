//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use status_polling_task::{BackoffStrategy, PollingConfig};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default redirect URI (can be overridden at compile time via BANKFLOW_REDIRECT_URI env var).
pub const DEFAULT_REDIRECT_URI: &str = match option_env!("BANKFLOW_REDIRECT_URI") {
    Some(uri) => uri,
    None => "bankflow://callback",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const DEFAULT_INITIAL_INTERVAL_MS: u64 = 1_000;

/// Polling cadence for every status-polling task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingSettings {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default)]
    pub backoff: BackoffStrategy,
}

fn default_initial_interval_ms() -> u64 {
    DEFAULT_INITIAL_INTERVAL_MS
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            initial_interval_ms: DEFAULT_INITIAL_INTERVAL_MS,
            backoff: BackoffStrategy::default(),
        }
    }
}

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// App redirect URI handed to initiating calls and used for deep-link rewriting.
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default)]
    pub polling: PollingSettings,
    /// Fail the parent task when a third-party app is not installed.
    #[serde(default = "default_fail_on_download_required")]
    pub fail_on_third_party_app_download_required: bool,
}

fn default_redirect_uri() -> String {
    DEFAULT_REDIRECT_URI.to_string()
}

fn default_fail_on_download_required() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            polling: PollingSettings::default(),
            fail_on_third_party_app_download_required: true,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            info!(path = %config_path.display(), "loading config");
            Self::load_from_file(&config_path)?
        } else {
            debug!(path = %config_path.display(), "no config file, using defaults");
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let config_path = paths.config_file();
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Only log_level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("BANKFLOW_LOG_LEVEL") {
            debug!(%log_level, "log level overridden from BANKFLOW_LOG_LEVEL");
            self.log_level = log_level;
        }
    }

    /// Reject settings no task can run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.polling.initial_interval_ms == 0 {
            return Err(CoreError::Config(
                "polling.initial_interval_ms must be greater than zero".to_string(),
            ));
        }
        self.redirect_uri()?;
        Ok(())
    }

    /// Get the redirect URI as a parsed URL.
    pub fn redirect_uri(&self) -> CoreResult<Url> {
        Url::parse(&self.redirect_uri).map_err(|source| CoreError::InvalidRedirectUri {
            uri: self.redirect_uri.clone(),
            source,
        })
    }

    /// Polling configuration for new polling tasks.
    pub fn polling_config(&self) -> PollingConfig {
        PollingConfig {
            initial_interval: Duration::from_millis(self.polling.initial_interval_ms),
            backoff: self.polling.backoff,
        }
    }
}
