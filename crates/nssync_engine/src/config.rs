//! Configuration for the sync engine.

use crate::error::ConfigError;
use sha1::{Digest, Sha1};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the source server base URL.
pub const SOURCE_URL_VAR: &str = "SOURCE_NIGHTSCOUT_URL";
/// Environment variable holding the source server API secret.
pub const SOURCE_SECRET_VAR: &str = "SOURCE_NIGHTSCOUT_API_SECRET";
/// Environment variable holding the destination server base URL.
pub const DESTINATION_URL_VAR: &str = "DESTINATION_NIGHTSCOUT_URL";
/// Environment variable holding the destination server API secret.
pub const DESTINATION_SECRET_VAR: &str = "DESTINATION_NIGHTSCOUT_API_SECRET";

/// File name of the override cache, resolved beside the executable.
pub const DEFAULT_CACHE_FILE: &str = "active_overrides.json";

/// Hashes a raw API secret the way Nightscout expects it in the
/// `api-secret` header: lowercase hex SHA-1.
pub fn hash_secret(raw: &str) -> String {
    hex::encode(Sha1::digest(raw.as_bytes()))
}

/// One Nightscout server: base URL plus hashed secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Instance {
    /// Base URL without a trailing slash.
    pub url: String,
    /// Hashed API secret, sent verbatim as the `api-secret` header.
    pub secret: String,
}

impl Instance {
    /// Creates an instance from a base URL and an already hashed secret.
    pub fn new(url: impl Into<String>, hashed_secret: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            secret: hashed_secret.into(),
        }
    }

    /// Creates an instance from a base URL and the secret as configured.
    pub fn with_raw_secret(url: impl Into<String>, raw_secret: &str) -> Self {
        Self::new(url, hash_secret(raw_secret))
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for a sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server records are read from.
    pub source: Instance,
    /// Server records are written to.
    pub destination: Instance,
    /// Retry configuration for every HTTP request.
    pub retry: RetryConfig,
    /// Request timeout.
    pub timeout: Duration,
    /// How many days before now the sync window starts.
    pub days_back: u64,
    /// How many days after now the sync window ends.
    pub days_forward: u64,
    /// Location of the override cache file.
    pub cache_path: PathBuf,
}

impl SyncConfig {
    /// Creates a new sync configuration with default tuning.
    pub fn new(source: Instance, destination: Instance) -> Self {
        Self {
            source,
            destination,
            retry: RetryConfig::default(),
            timeout: Duration::from_secs(30),
            days_back: 7,
            days_forward: 1,
            cache_path: default_cache_path(),
        }
    }

    /// Loads the four required variables from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first absent variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads the four required variables through `lookup`.
    ///
    /// Empty values count as missing. Secrets are hashed here so raw
    /// secrets never travel further than this function.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] naming the first absent variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        let source_url = require(SOURCE_URL_VAR)?;
        let source_secret = require(SOURCE_SECRET_VAR)?;
        let destination_url = require(DESTINATION_URL_VAR)?;
        let destination_secret = require(DESTINATION_SECRET_VAR)?;

        Ok(Self::new(
            Instance::with_raw_secret(source_url, &source_secret),
            Instance::with_raw_secret(destination_url, &destination_secret),
        ))
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets how far back the window reaches.
    pub fn with_days_back(mut self, days: u64) -> Self {
        self.days_back = days;
        self
    }

    /// Sets how far ahead the window reaches.
    pub fn with_days_forward(mut self, days: u64) -> Self {
        self.days_forward = days;
        self
    }

    /// Sets the override cache location.
    pub fn with_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_path = path.into();
        self
    }
}

/// Returns [`DEFAULT_CACHE_FILE`] in the directory of the running
/// executable, or relative to the working directory if that is unknown.
pub fn default_cache_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CACHE_FILE)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE))
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the wait after failed attempt `attempt` (0-indexed):
    /// `initial_delay * backoff_multiplier ^ attempt`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}
