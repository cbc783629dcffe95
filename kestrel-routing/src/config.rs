//! Routing configuration.
//!
//! Defaults come from [`Limits`]. A config can also be loaded from TOML,
//! where every duration is given in milliseconds and omitted fields keep
//! their defaults:
//!
//! ```toml
//! rpc_timeout_ms = 15000
//! send_next_timeout_ms = 1000
//! retry_backoff_ms = 1000
//! max_retry_backoff_ms = 30000
//! retry_multiplier = 2
//! max_attempts = 0
//! range_cache_entries = 65536
//! ```

use std::path::Path;
use std::time::Duration;

use kestrel_core::Limits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::range_cache::RangeCacheConfig;
use crate::retry::RetryOptions;
use crate::sender::SendOptions;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A timing parameter is out of range.
    #[error("invalid timing: {message}")]
    InvalidTiming {
        /// What is wrong.
        message: String,
    },

    /// The range cache bound is out of range.
    #[error("invalid range cache: {message}")]
    InvalidCache {
        /// What is wrong.
        message: String,
    },

    /// The config file could not be read.
    #[error("failed to read config from {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config: {message}")]
    Parse {
        /// Error message.
        message: String,
    },
}

/// Configuration for the router and everything beneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingConfig {
    /// Overall deadline for one dispatch to a replica set.
    pub rpc_timeout: Duration,
    /// Delay before the next replica is tried while earlier ones are
    /// outstanding.
    pub send_next_timeout: Duration,
    /// Retry policy of the router.
    pub retry: RetryOptions,
    /// Range cache configuration.
    pub range_cache: RangeCacheConfig,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let limits = Limits::new();
        Self {
            rpc_timeout: Duration::from_micros(limits.rpc_timeout_us),
            send_next_timeout: Duration::from_micros(limits.send_next_timeout_us),
            retry: RetryOptions::default(),
            range_cache: RangeCacheConfig::default(),
        }
    }
}

impl RoutingConfig {
    /// Creates a config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a config with short timeouts for tests.
    #[must_use]
    pub fn fast_for_testing() -> Self {
        Self {
            rpc_timeout: Duration::from_millis(500),
            send_next_timeout: Duration::from_millis(50),
            retry: RetryOptions::indefinite(Duration::from_millis(10), Duration::from_millis(100)),
            range_cache: RangeCacheConfig { max_entries: 1024 },
        }
    }

    /// Sets the RPC timeout.
    #[must_use]
    pub const fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the send-next timeout.
    #[must_use]
    pub const fn with_send_next_timeout(mut self, timeout: Duration) -> Self {
        self.send_next_timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the range cache bound.
    #[must_use]
    pub const fn with_range_cache_entries(mut self, max_entries: usize) -> Self {
        self.range_cache.max_entries = max_entries;
        self
    }

    /// Returns the options handed to the replica sender.
    #[must_use]
    pub const fn send_options(&self) -> SendOptions {
        SendOptions {
            rpc_timeout: self.rpc_timeout,
            send_next_timeout: self.send_next_timeout,
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout or backoff is zero, the send-next
    /// timeout exceeds the RPC timeout, the backoff exceeds its ceiling, or
    /// the cache bound is zero or above [`Limits::max_range_cache_entries`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timing = |message: &str| ConfigError::InvalidTiming {
            message: message.to_string(),
        };

        if self.rpc_timeout.is_zero() {
            return Err(timing("rpc_timeout must be non-zero"));
        }
        if self.send_next_timeout.is_zero() {
            return Err(timing("send_next_timeout must be non-zero"));
        }
        if self.send_next_timeout > self.rpc_timeout {
            return Err(timing("send_next_timeout must not exceed rpc_timeout"));
        }
        if self.retry.backoff.is_zero() {
            return Err(timing("retry backoff must be non-zero"));
        }
        if self.retry.backoff > self.retry.max_backoff {
            return Err(timing("retry backoff must not exceed max_backoff"));
        }
        if self.retry.multiplier == 0 {
            return Err(timing("retry multiplier must be at least 1"));
        }

        let max_entries = Limits::new().max_range_cache_entries;
        if self.range_cache.max_entries == 0 {
            return Err(ConfigError::InvalidCache {
                message: "max_entries must be non-zero".to_string(),
            });
        }
        let configured = u64::try_from(self.range_cache.max_entries).unwrap_or(u64::MAX);
        if configured > u64::from(max_entries) {
            return Err(ConfigError::InvalidCache {
                message: format!("max_entries must not exceed {max_entries}"),
            });
        }
        Ok(())
    }

    /// Loads and validates a config from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses and validates a config from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML cannot be parsed or the result is
    /// invalid.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let file: RoutingConfigFile = toml::from_str(toml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }

    /// Serializes the config to a TOML string.
    #[must_use]
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(&RoutingConfigFile::from(self)).unwrap_or_default()
    }
}

/// On-disk form of [`RoutingConfig`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RoutingConfigFile {
    rpc_timeout_ms: u64,
    send_next_timeout_ms: u64,
    retry_backoff_ms: u64,
    max_retry_backoff_ms: u64,
    retry_multiplier: u32,
    max_attempts: u32,
    range_cache_entries: usize,
}

impl Default for RoutingConfigFile {
    fn default() -> Self {
        Self::from(&RoutingConfig::default())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl From<&RoutingConfig> for RoutingConfigFile {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            rpc_timeout_ms: millis(config.rpc_timeout),
            send_next_timeout_ms: millis(config.send_next_timeout),
            retry_backoff_ms: millis(config.retry.backoff),
            max_retry_backoff_ms: millis(config.retry.max_backoff),
            retry_multiplier: config.retry.multiplier,
            max_attempts: config.retry.max_attempts,
            range_cache_entries: config.range_cache.max_entries,
        }
    }
}

impl From<RoutingConfigFile> for RoutingConfig {
    fn from(file: RoutingConfigFile) -> Self {
        Self {
            rpc_timeout: Duration::from_millis(file.rpc_timeout_ms),
            send_next_timeout: Duration::from_millis(file.send_next_timeout_ms),
            retry: RetryOptions {
                backoff: Duration::from_millis(file.retry_backoff_ms),
                max_backoff: Duration::from_millis(file.max_retry_backoff_ms),
                multiplier: file.retry_multiplier,
                max_attempts: file.max_attempts,
            },
            range_cache: RangeCacheConfig {
                max_entries: file.range_cache_entries,
            },
        }
    }
}
