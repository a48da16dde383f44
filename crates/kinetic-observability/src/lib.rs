//! Kinetic Observability
//!
//! Logging setup and Prometheus metrics for the kinetic stream client.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use kinetic_client::LogLevel;
//! use kinetic_observability::{logging, PrometheusStatsCollector};
//!
//! logging::init(LogLevel::Info).ok();
//! let stats = Arc::new(PrometheusStatsCollector::new("orders"));
//! // pass `stats` to BatchDispatcher::builder(..).stats(stats)
//! println!("{}", kinetic_observability::metrics::gather_text().unwrap_or_default());
//! ```

pub mod logging;
pub mod metrics;
pub mod stats;

pub use metrics::{gather_text, init as init_metrics, REGISTRY};
pub use stats::PrometheusStatsCollector;

/// Initialize logging at `level` and register all metrics.
pub fn init(level: kinetic_client::LogLevel) {
    if let Err(e) = logging::init(level) {
        tracing::debug!(error = %e, "Global subscriber already installed");
    }
    metrics::init();
}
