//! Renewal worker configuration
//!
//! Settings come from [`RenewalConfig::default`], a TOML file, or both, with
//! environment variables applied last:
//!
//! | Variable                      | Field                 |
//! |-------------------------------|-----------------------|
//! | `TOKENKEEPER_SLEEP_INTERVAL`  | `sleep_interval_secs` |
//! | `TOKENKEEPER_RENEWAL_URL`     | `renewal_url`         |
//! | `TOKENKEEPER_VERIFY_TLS`      | `verify_tls`          |

use crate::credentials::types::{Result, TokenError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const SLEEP_INTERVAL_ENV: &str = "TOKENKEEPER_SLEEP_INTERVAL";
pub const RENEWAL_URL_ENV: &str = "TOKENKEEPER_RENEWAL_URL";
pub const VERIFY_TLS_ENV: &str = "TOKENKEEPER_VERIFY_TLS";

pub const DEFAULT_SLEEP_INTERVAL_SECS: u64 = 150;
pub const DEFAULT_RENEWAL_BUFFER_SECS: u64 = 5;
pub const DEFAULT_RENEWAL_WINDOW_SECS: u64 = 600;
pub const DEFAULT_GATE_WAIT_MARGIN_SECS: u64 = 10;
pub const DEFAULT_GATE_WAIT_ATTEMPTS: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Timing and endpoint settings for the renewal worker
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RenewalConfig {
    /// Idle time between sweeps
    pub sleep_interval_secs: u64,
    /// Grace period after closing the access gate, before renewing anything
    pub renewal_buffer_secs: u64,
    /// Safety margin before expiry at which a credential is renewed
    pub renewal_window_secs: u64,
    /// Added to the renewal buffer to bound each gate wait in `get`
    pub gate_wait_margin_secs: u64,
    /// Gate wait attempts before `get` gives up
    pub gate_wait_attempts: u32,
    /// Renewal endpoint used by `HttpRenewalClient::from_config`
    pub renewal_url: Option<String>,
    /// Whether the renewal endpoint's TLS certificate is verified
    pub verify_tls: bool,
    /// Timeout for a single renewal request
    pub request_timeout_secs: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            sleep_interval_secs: DEFAULT_SLEEP_INTERVAL_SECS,
            renewal_buffer_secs: DEFAULT_RENEWAL_BUFFER_SECS,
            renewal_window_secs: DEFAULT_RENEWAL_WINDOW_SECS,
            gate_wait_margin_secs: DEFAULT_GATE_WAIT_MARGIN_SECS,
            gate_wait_attempts: DEFAULT_GATE_WAIT_ATTEMPTS,
            renewal_url: None,
            verify_tls: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl RenewalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| TokenError::Config(format!("Failed to parse TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!("Loading renewal configuration from {}", path.display());

        let content = std::fs::read_to_string(path).map_err(|e| {
            TokenError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields from `TOKENKEEPER_*` environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(raw) = read_env(SLEEP_INTERVAL_ENV) {
            self.sleep_interval_secs = raw.parse().map_err(|_| {
                TokenError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    SLEEP_INTERVAL_ENV, raw
                ))
            })?;
            tracing::debug!(
                sleep_interval_secs = self.sleep_interval_secs,
                "Sleep interval overridden from environment"
            );
        }

        if let Some(raw) = read_env(RENEWAL_URL_ENV) {
            self.renewal_url = Some(raw);
        }

        if let Some(raw) = read_env(VERIFY_TLS_ENV) {
            self.verify_tls = parse_bool(&raw).ok_or_else(|| {
                TokenError::Config(format!("{} must be a boolean, got '{}'", VERIFY_TLS_ENV, raw))
            })?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sleep_interval_secs == 0 {
            return Err(TokenError::Config(
                "sleep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.gate_wait_attempts == 0 {
            return Err(TokenError::Config("gate_wait_attempts must be at least 1".to_string()));
        }
        if let Some(raw) = &self.renewal_url {
            let parsed = url::Url::parse(raw).map_err(|e| {
                TokenError::Config(format!("Invalid renewal_url '{}': {}", raw, e))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(TokenError::Config(format!(
                    "renewal_url must use http or https, got '{}'",
                    parsed.scheme()
                )));
            }
        }
        Ok(())
    }

    pub fn with_sleep_interval(mut self, interval: Duration) -> Self {
        self.sleep_interval_secs = whole_secs(interval);
        self
    }

    pub fn with_renewal_buffer(mut self, buffer: Duration) -> Self {
        self.renewal_buffer_secs = whole_secs(buffer);
        self
    }

    pub fn with_renewal_window(mut self, window: Duration) -> Self {
        self.renewal_window_secs = whole_secs(window);
        self
    }

    pub fn with_renewal_url(mut self, url: impl Into<String>) -> Self {
        self.renewal_url = Some(url.into());
        self
    }

    pub fn sleep_interval(&self) -> Duration {
        Duration::from_secs(self.sleep_interval_secs)
    }

    pub fn renewal_buffer(&self) -> Duration {
        Duration::from_secs(self.renewal_buffer_secs)
    }

    /// Renewal window in seconds, as used against epoch timestamps
    pub fn renewal_window(&self) -> i64 {
        i64::try_from(self.renewal_window_secs).unwrap_or(i64::MAX)
    }

    /// Upper bound on a single gate wait in `get`
    pub fn gate_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.renewal_buffer_secs + self.gate_wait_margin_secs)
    }
}

/// Seconds in `duration`, rounding a fractional second up
fn whole_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
