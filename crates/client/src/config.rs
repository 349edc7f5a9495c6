//! Configuration for the lease manager and the `poolkeeper` binary.
//!
//! [`LeaseConfig`] holds the lifecycle tunables. [`ClientConfig`] is the TOML
//! file shape: where the broker is, the secrets needed to talk to it, and
//! optional overrides for the tunables. Environment variables override the
//! file; CLI flags override both.

use crate::crypto::AesGcmDecryptor;
use crate::http::{HttpBroker, HttpModelQuotaSource, OAuthTokenRefresher};
use crate::manager::{LeaseManager, QuotaSources};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding the broker URL.
pub const ENV_BROKER_URL: &str = "POOLKEEPER_BROKER_URL";
/// Environment variable overriding the broker API key.
pub const ENV_API_KEY: &str = "POOLKEEPER_API_KEY";
/// Environment variable overriding the account payload key.
pub const ENV_ENCRYPTION_KEY: &str = "POOLKEEPER_ENCRYPTION_KEY";

/// Shortest heartbeat period, whatever TTL the broker grants.
const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Lease lifecycle tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseConfig {
    /// Upper bound on every broker and quota request.
    pub request_timeout: Duration,

    /// Fraction of the granted TTL between heartbeats.
    pub heartbeat_ratio: f64,

    /// How often the idle monitor checks for inactivity.
    pub idle_check_interval: Duration,

    /// Inactivity after which the lease is released.
    pub idle_timeout: Duration,

    /// Minimum time between successful quota polls.
    pub quota_check_interval: Duration,

    /// Remaining-quota fraction at or below which the account is switched.
    pub low_quota_threshold: f64,

    /// Reset hint sent with a low-quota switch when upstream gives none.
    pub quota_reset_fallback: Duration,

    /// Longest rate-limit wait worth sitting out before switching accounts.
    pub max_rate_limit_wait: Duration,

    /// How long a shutdown may take before the watchdog terminates the process.
    pub shutdown_timeout: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            heartbeat_ratio: 0.5,
            idle_check_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(20 * 60),
            quota_check_interval: Duration::from_secs(5 * 60),
            low_quota_threshold: 0.20,
            quota_reset_fallback: Duration::from_secs(24 * 60 * 60),
            max_rate_limit_wait: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl LeaseConfig {
    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the heartbeat ratio (0.0 to 1.0, exclusive of 0).
    pub fn with_heartbeat_ratio(mut self, ratio: f64) -> Self {
        self.heartbeat_ratio = ratio.clamp(0.01, 1.0);
        self
    }

    /// Set the idle check interval.
    pub fn with_idle_check_interval(mut self, interval: Duration) -> Self {
        self.idle_check_interval = interval;
        self
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the minimum interval between quota polls.
    pub fn with_quota_check_interval(mut self, interval: Duration) -> Self {
        self.quota_check_interval = interval;
        self
    }

    /// Set the low-quota threshold (0.0 to 1.0).
    pub fn with_low_quota_threshold(mut self, threshold: f64) -> Self {
        self.low_quota_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Set the fallback reset hint for low-quota switches.
    pub fn with_quota_reset_fallback(mut self, fallback: Duration) -> Self {
        self.quota_reset_fallback = fallback;
        self
    }

    /// Set the longest tolerable rate-limit wait.
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    /// Set the shutdown watchdog timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Heartbeat period for a granted TTL: `floor(ttl_secs × ratio × 1000)` ms.
    pub fn heartbeat_period(&self, ttl: Duration) -> Duration {
        let millis = (ttl.as_secs() as f64 * self.heartbeat_ratio * 1000.0).floor() as u64;
        Duration::from_millis(millis).max(MIN_HEARTBEAT_PERIOD)
    }
}

/// Errors loading configuration or building a manager from it.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Failed to build HTTP client: {0}")]
    Http(String),
}

/// Top-level config file.
///
/// ```toml
/// [broker]
/// url = "https://broker.internal"
/// api_key = "..."
/// encryption_key = "..."
///
/// [quota]
/// enabled = true
/// oauth_client_id = "..."
/// oauth_client_secret = "..."
///
/// [lease]
/// idle_timeout_secs = 1200
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,

    #[serde(default)]
    pub quota: QuotaSection,

    #[serde(default)]
    pub lease: LeaseSection,
}

/// `[broker]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub encryption_key: Option<String>,
}

/// `[quota]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaSection {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_models_url")]
    pub models_url: String,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_models_url() -> String {
    "https://cloudcode-pa.googleapis.com/v1internal:fetchAvailableModels".to_string()
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            enabled: false,
            token_url: default_token_url(),
            models_url: default_models_url(),
            oauth_client_id: None,
            oauth_client_secret: None,
        }
    }
}

/// `[lease]` section. Every field is optional; unset fields keep the
/// [`LeaseConfig`] default.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeaseSection {
    pub request_timeout_secs: Option<u64>,
    pub heartbeat_ratio: Option<f64>,
    pub idle_check_interval_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
    pub quota_check_interval_secs: Option<u64>,
    pub low_quota_threshold: Option<f64>,
    pub quota_reset_fallback_secs: Option<u64>,
    pub max_rate_limit_wait_secs: Option<u64>,
    pub shutdown_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse a config from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply `POOLKEEPER_*` environment overrides.
    pub fn apply_env(self) -> Self {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup(ENV_BROKER_URL) {
            self.broker.url = Some(url);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.broker.api_key = Some(key);
        }
        if let Some(key) = lookup(ENV_ENCRYPTION_KEY) {
            self.broker.encryption_key = Some(key);
        }
        self
    }

    /// Resolve the lease tunables.
    pub fn lease_config(&self) -> LeaseConfig {
        let section = &self.lease;
        let mut config = LeaseConfig::default();
        if let Some(secs) = section.request_timeout_secs {
            config = config.with_request_timeout(Duration::from_secs(secs));
        }
        if let Some(ratio) = section.heartbeat_ratio {
            config = config.with_heartbeat_ratio(ratio);
        }
        if let Some(secs) = section.idle_check_interval_secs {
            config = config.with_idle_check_interval(Duration::from_secs(secs));
        }
        if let Some(secs) = section.idle_timeout_secs {
            config = config.with_idle_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = section.quota_check_interval_secs {
            config = config.with_quota_check_interval(Duration::from_secs(secs));
        }
        if let Some(threshold) = section.low_quota_threshold {
            config = config.with_low_quota_threshold(threshold);
        }
        if let Some(secs) = section.quota_reset_fallback_secs {
            config = config.with_quota_reset_fallback(Duration::from_secs(secs));
        }
        if let Some(secs) = section.max_rate_limit_wait_secs {
            config = config.with_max_rate_limit_wait(Duration::from_secs(secs));
        }
        if let Some(secs) = section.shutdown_timeout_secs {
            config = config.with_shutdown_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Build a lease manager wired to the HTTP broker and, if enabled, the
    /// HTTP quota sources.
    pub fn build_manager(&self) -> Result<LeaseManager, ConfigError> {
        let lease_config = self.lease_config();
        let url = self.broker.url.as_deref().ok_or(ConfigError::Missing("broker.url"))?;
        let api_key = self
            .broker
            .api_key
            .as_deref()
            .ok_or(ConfigError::Missing("broker.api_key"))?;
        let encryption_key = self
            .broker
            .encryption_key
            .as_deref()
            .ok_or(ConfigError::Missing("broker.encryption_key"))?;

        let broker = HttpBroker::new(url, api_key, lease_config.request_timeout)
            .map_err(|e| ConfigError::Http(e.to_string()))?;
        let decryptor = AesGcmDecryptor::from_shared_secret(encryption_key);

        let mut builder = LeaseManager::builder(Arc::new(broker), Arc::new(decryptor))
            .with_config(lease_config.clone());

        if self.quota.enabled {
            let client_id = self
                .quota
                .oauth_client_id
                .as_deref()
                .ok_or(ConfigError::Missing("quota.oauth_client_id"))?;
            let client_secret = self
                .quota
                .oauth_client_secret
                .as_deref()
                .ok_or(ConfigError::Missing("quota.oauth_client_secret"))?;
            let refresher = OAuthTokenRefresher::new(
                &self.quota.token_url,
                client_id,
                client_secret,
                lease_config.request_timeout,
            )
            .map_err(|e| ConfigError::Http(e.to_string()))?;
            let models =
                HttpModelQuotaSource::new(&self.quota.models_url, lease_config.request_timeout)
                    .map_err(|e| ConfigError::Http(e.to_string()))?;
            builder = builder.with_quota_sources(QuotaSources::new(
                Arc::new(refresher),
                Arc::new(models),
            ));
        }

        Ok(builder.build())
    }
}
