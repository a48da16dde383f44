//! Tracing subscriber setup.
//!
//! Logs go to stderr: when the listener runs under a multilang daemon,
//! stdout carries the protocol and must stay clean.

use kinetic_client::LogLevel;
use tracing_subscriber::EnvFilter;

/// Build the filter for `level`. `RUST_LOG`, when set and valid, wins.
pub fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

/// Install the global fmt subscriber.
///
/// Returns an error if a global subscriber is already installed.
pub fn init(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(level))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
}
