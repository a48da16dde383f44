use lazy_static::lazy_static;
use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Once;
use tracing::warn;

static INIT: Once = Once::new();

lazy_static! {
    /// Global Prometheus metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// put-records calls made
    pub static ref PUT_RECORDS_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kinetic_put_records_calls_total", "Total put-records calls"),
        &["stream"]
    ).expect("metric can be created");

    /// Records appended by the service
    pub static ref RECORDS_SENT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kinetic_records_sent_total", "Total records appended"),
        &["stream"]
    ).expect("metric can be created");

    /// Records rejected by the service
    pub static ref RECORDS_FAILED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kinetic_records_failed_total", "Total records rejected"),
        &["stream"]
    ).expect("metric can be created");

    /// Rejections caused by shard throughput limits
    pub static ref THROUGHPUT_EXCEEDED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("kinetic_throughput_exceeded_total", "Total records rejected for exceeding shard throughput"),
        &["stream"]
    ).expect("metric can be created");

    /// Dispatch phase durations
    pub static ref DISPATCH_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new("kinetic_dispatch_duration_seconds", "Dispatch phase duration in seconds")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["stream", "phase"]
    ).expect("metric can be created");
}

/// Register every kinetic metric with [`REGISTRY`].
/// Can be called multiple times safely (idempotent)
pub fn init() {
    INIT.call_once(|| {
        register("put_records_calls_total", Box::new(PUT_RECORDS_CALLS_TOTAL.clone()));
        register("records_sent_total", Box::new(RECORDS_SENT_TOTAL.clone()));
        register("records_failed_total", Box::new(RECORDS_FAILED_TOTAL.clone()));
        register("throughput_exceeded_total", Box::new(THROUGHPUT_EXCEEDED_TOTAL.clone()));
        register("dispatch_duration", Box::new(DISPATCH_DURATION.clone()));
    });
}

fn register(name: &str, collector: Box<dyn prometheus::core::Collector>) {
    if let Err(e) = REGISTRY.register(collector) {
        warn!(metric = name, error = %e, "Failed to register metric");
    }
}

/// Render the registry in the Prometheus text exposition format.
pub fn gather_text() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
