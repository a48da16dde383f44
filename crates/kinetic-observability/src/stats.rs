//! Prometheus-backed [`StatsCollector`].

use std::time::Duration;

use kinetic_client::{Phase, StatsCollector};
use prometheus::{Histogram, IntCounter};

use crate::metrics;

/// Reports dispatcher stats into the global registry, labelled by stream.
///
/// Label children are resolved once at construction so the hot path is a
/// plain atomic add.
#[derive(Clone)]
pub struct PrometheusStatsCollector {
    stream: String,
    put_records_calls: IntCounter,
    sent: IntCounter,
    failed: IntCounter,
    throughput_exceeded: IntCounter,
    build: Histogram,
    send: Histogram,
    total: Histogram,
}

impl PrometheusStatsCollector {
    pub fn new(stream: impl Into<String>) -> Self {
        metrics::init();
        let stream = stream.into();
        let label = stream.as_str();
        let phase = |phase: Phase| {
            metrics::DISPATCH_DURATION.with_label_values(&[label, phase.as_str()])
        };

        Self {
            put_records_calls: metrics::PUT_RECORDS_CALLS_TOTAL.with_label_values(&[label]),
            sent: metrics::RECORDS_SENT_TOTAL.with_label_values(&[label]),
            failed: metrics::RECORDS_FAILED_TOTAL.with_label_values(&[label]),
            throughput_exceeded: metrics::THROUGHPUT_EXCEEDED_TOTAL.with_label_values(&[label]),
            build: phase(Phase::Build),
            send: phase(Phase::Send),
            total: phase(Phase::Total),
            stream,
        }
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl StatsCollector for PrometheusStatsCollector {
    fn add_put_records_called(&self, count: u64) {
        self.put_records_calls.inc_by(count);
    }

    fn add_sent_success(&self, count: u64) {
        self.sent.inc_by(count);
    }

    fn add_sent_failed(&self, count: u64) {
        self.failed.inc_by(count);
    }

    fn add_throughput_exceeded(&self, count: u64) {
        self.throughput_exceeded.inc_by(count);
    }

    fn record_duration(&self, phase: Phase, elapsed: Duration) {
        let histogram = match phase {
            Phase::Build => &self.build,
            Phase::Send => &self.send,
            Phase::Total => &self.total,
        };
        histogram.observe(elapsed.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_labelled_by_stream() {
        let stats = PrometheusStatsCollector::new("stats-test-orders");
        stats.add_put_records_called(1);
        stats.add_sent_success(4);
        stats.add_sent_failed(2);
        stats.add_throughput_exceeded(1);

        let label = ["stats-test-orders"];
        assert_eq!(metrics::PUT_RECORDS_CALLS_TOTAL.with_label_values(&label).get(), 1);
        assert_eq!(metrics::RECORDS_SENT_TOTAL.with_label_values(&label).get(), 4);
        assert_eq!(metrics::RECORDS_FAILED_TOTAL.with_label_values(&label).get(), 2);
        assert_eq!(metrics::THROUGHPUT_EXCEEDED_TOTAL.with_label_values(&label).get(), 1);
    }

    #[test]
    fn test_durations_per_phase() {
        let stats = PrometheusStatsCollector::new("stats-test-durations");
        stats.record_duration(Phase::Send, Duration::from_millis(20));
        stats.record_duration(Phase::Send, Duration::from_millis(40));
        stats.record_duration(Phase::Total, Duration::from_millis(50));

        let send = metrics::DISPATCH_DURATION.with_label_values(&["stats-test-durations", "send"]);
        assert_eq!(send.get_sample_count(), 2);
        assert!((send.get_sample_sum() - 0.06).abs() < 1e-9);

        let build = metrics::DISPATCH_DURATION.with_label_values(&["stats-test-durations", "build"]);
        assert_eq!(build.get_sample_count(), 0);
    }
}
