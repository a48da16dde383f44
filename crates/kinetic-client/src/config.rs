//! Client Configuration
//!
//! `KineticConfig` carries every tunable of the producer and consumer paths.
//! All fields have defaults, so a config file only needs the values it
//! overrides:
//!
//! ```toml
//! batch_max_records = 250
//! response_read_timeout_ms = 2000
//! concurrency = { fixed = 4 }
//! log_level = "debug"
//!
//! [retry]
//! max_attempts = 5
//! ```
//!
//! ## Options
//!
//! - **batch_max_records / batch_max_bytes**: bounds of one put-records batch
//!   (default: 500 records, 5MB)
//! - **response_read_timeout_ms**: bound on one put-records call (default: 5s)
//! - **msg_count_rate_limit / msg_size_rate_limit**: per-second limits handed
//!   to the throttle (default: 1000 records/s, 1MB/s)
//! - **queue_depth**: capacity of the dispatch and delivery queues (default: 10000)
//! - **concurrency**: worker count, fixed or derived from open shards
//! - **log_level**: verbosity threshold for the tracing subscriber
//! - **retry**: backoff for failed records
//! - **throttle_permits**: in-flight delivery handlers on the consumer side (default: 5)

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;

/// Verbosity threshold for logging.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How many dispatch workers to run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Concurrency {
    /// One worker per open shard, at least one.
    #[default]
    FromTopology,
    Fixed(usize),
}

/// Backoff settings for failed records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Dispatch attempts per record before it is dropped (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy::new(
            config.max_attempts,
            Duration::from_millis(config.initial_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
            config.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KineticConfig {
    /// Maximum records per batch (default: 500)
    #[serde(default = "default_batch_max_records")]
    pub batch_max_records: usize,

    /// Maximum cumulative payload + partition key bytes per batch (default: 5MB)
    #[serde(default = "default_batch_max_bytes")]
    pub batch_max_bytes: usize,

    /// Put-records response-read timeout in milliseconds (default: 5000)
    #[serde(default = "default_response_read_timeout_ms")]
    pub response_read_timeout_ms: u64,

    /// Records per second (default: 1000)
    #[serde(default = "default_msg_count_rate_limit")]
    pub msg_count_rate_limit: u64,

    /// Bytes per second (default: 1MB)
    #[serde(default = "default_msg_size_rate_limit")]
    pub msg_size_rate_limit: u64,

    /// Capacity of the dispatch and delivery queues (default: 10000)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default)]
    pub concurrency: Concurrency,

    #[serde(default)]
    pub log_level: LogLevel,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Delivery admission permits (default: 5)
    #[serde(default = "default_throttle_permits")]
    pub throttle_permits: usize,
}

impl Default for KineticConfig {
    fn default() -> Self {
        Self {
            batch_max_records: default_batch_max_records(),
            batch_max_bytes: default_batch_max_bytes(),
            response_read_timeout_ms: default_response_read_timeout_ms(),
            msg_count_rate_limit: default_msg_count_rate_limit(),
            msg_size_rate_limit: default_msg_size_rate_limit(),
            queue_depth: default_queue_depth(),
            concurrency: Concurrency::default(),
            log_level: LogLevel::default(),
            retry: RetryConfig::default(),
            throttle_permits: default_throttle_permits(),
        }
    }
}

impl KineticConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ClientError::ConfigError(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: KineticConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("batch_max_records", self.batch_max_records as u64),
            ("batch_max_bytes", self.batch_max_bytes as u64),
            ("response_read_timeout_ms", self.response_read_timeout_ms),
            ("msg_count_rate_limit", self.msg_count_rate_limit),
            ("msg_size_rate_limit", self.msg_size_rate_limit),
            ("queue_depth", self.queue_depth as u64),
            ("throttle_permits", self.throttle_permits as u64),
            ("retry.max_attempts", u64::from(self.retry.max_attempts)),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ClientError::ConfigError(format!("{} must be > 0", name)));
            }
        }
        if self.concurrency == Concurrency::Fixed(0) {
            return Err(ClientError::ConfigError(
                "concurrency must be > 0 when fixed".to_string(),
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ClientError::ConfigError(
                "retry.backoff_multiplier must be >= 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn response_read_timeout(&self) -> Duration {
        Duration::from_millis(self.response_read_timeout_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

fn default_batch_max_records() -> usize {
    500
}

fn default_batch_max_bytes() -> usize {
    5 * 1024 * 1024 // 5MB
}

fn default_response_read_timeout_ms() -> u64 {
    5000
}

fn default_msg_count_rate_limit() -> u64 {
    1000
}

fn default_msg_size_rate_limit() -> u64 {
    1024 * 1024 // 1MB
}

fn default_queue_depth() -> usize {
    10_000
}

fn default_throttle_permits() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    100
}

fn default_max_backoff_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}
