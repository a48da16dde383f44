//! Dispatch statistics.
//!
//! The dispatcher reports counters and phase durations through the
//! [`StatsCollector`] trait. Collectors are shared by every dispatch worker, so
//! implementations must tolerate concurrent updates without losing increments.
//!
//! Two collectors live here: [`NilStatsCollector`] discards everything and
//! [`AtomicStatsCollector`] keeps lock-free totals that can be snapshotted.
//! A Prometheus-backed collector lives in `kinetic-observability`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Timed section of one dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Building the put-records request from the batch.
    Build,
    /// The put-records call itself, bounded by the response-read timeout.
    Send,
    /// Whole dispatch call, including outcome classification.
    Total,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Build, Phase::Send, Phase::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Build => "build",
            Phase::Send => "send",
            Phase::Total => "total",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink for dispatcher counters and durations.
pub trait StatsCollector: Send + Sync {
    /// One put-records call was made.
    fn add_put_records_called(&self, count: u64);

    /// `count` records were appended.
    fn add_sent_success(&self, count: u64);

    /// `count` records were rejected.
    fn add_sent_failed(&self, count: u64);

    /// `count` rejected records carried the throughput-exceeded code.
    fn add_throughput_exceeded(&self, count: u64);

    fn record_duration(&self, phase: Phase, elapsed: Duration);
}

/// Collector that drops every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NilStatsCollector;

impl StatsCollector for NilStatsCollector {
    fn add_put_records_called(&self, _count: u64) {}
    fn add_sent_success(&self, _count: u64) {}
    fn add_sent_failed(&self, _count: u64) {}
    fn add_throughput_exceeded(&self, _count: u64) {}
    fn record_duration(&self, _phase: Phase, _elapsed: Duration) {}
}

#[derive(Debug, Default)]
struct PhaseTimer {
    count: AtomicU64,
    total_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl PhaseTimer {
    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.max_nanos.fetch_max(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PhaseStats {
        PhaseStats {
            count: self.count.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.total_nanos.load(Ordering::Relaxed)),
            max: Duration::from_nanos(self.max_nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Point-in-time view of one phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseStats {
    pub count: u64,
    pub total: Duration,
    pub max: Duration,
}

impl PhaseStats {
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos((self.total.as_nanos() / u128::from(self.count)) as u64)
        }
    }
}

/// Point-in-time view of an [`AtomicStatsCollector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub put_records_called: u64,
    pub sent_success: u64,
    pub sent_failed: u64,
    pub throughput_exceeded: u64,
    pub build: PhaseStats,
    pub send: PhaseStats,
    pub total: PhaseStats,
}

/// Lock-free in-process collector.
#[derive(Debug, Default)]
pub struct AtomicStatsCollector {
    put_records_called: AtomicU64,
    sent_success: AtomicU64,
    sent_failed: AtomicU64,
    throughput_exceeded: AtomicU64,
    build: PhaseTimer,
    send: PhaseTimer,
    total: PhaseTimer,
}

impl AtomicStatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            put_records_called: self.put_records_called.load(Ordering::Relaxed),
            sent_success: self.sent_success.load(Ordering::Relaxed),
            sent_failed: self.sent_failed.load(Ordering::Relaxed),
            throughput_exceeded: self.throughput_exceeded.load(Ordering::Relaxed),
            build: self.build.snapshot(),
            send: self.send.snapshot(),
            total: self.total.snapshot(),
        }
    }

    fn timer(&self, phase: Phase) -> &PhaseTimer {
        match phase {
            Phase::Build => &self.build,
            Phase::Send => &self.send,
            Phase::Total => &self.total,
        }
    }
}

impl StatsCollector for AtomicStatsCollector {
    fn add_put_records_called(&self, count: u64) {
        self.put_records_called.fetch_add(count, Ordering::Relaxed);
    }

    fn add_sent_success(&self, count: u64) {
        self.sent_success.fetch_add(count, Ordering::Relaxed);
    }

    fn add_sent_failed(&self, count: u64) {
        self.sent_failed.fetch_add(count, Ordering::Relaxed);
    }

    fn add_throughput_exceeded(&self, count: u64) {
        self.throughput_exceeded.fetch_add(count, Ordering::Relaxed);
    }

    fn record_duration(&self, phase: Phase, elapsed: Duration) {
        self.timer(phase).record(elapsed);
    }
}
