//! Batch Dispatcher
//!
//! Sends one batch of messages to the stream service per call and reports the
//! outcome of every record.
//!
//! ## Call Anatomy
//!
//! ```text
//! dispatch(batch)
//!   ├─ build  : messages → PutRecordsRequest          (Phase::Build)
//!   ├─ send   : put_records, bounded by read timeout  (Phase::Send)
//!   └─ apply  : outcome[i] → batch[i]                 (Phase::Total covers all)
//! ```
//!
//! ## Partial Failure
//!
//! The service answers with one outcome per submitted record, in submission
//! order. An outcome with both a sequence number and a shard id marks the
//! record delivered. Anything else is a per-record failure: the error code
//! and message are copied onto the record, its `fail_count` is bumped, and
//! the failure handler sees the record exactly once. Throughput-exceeded
//! failures are also tallied separately so the scheduler can slow down.
//!
//! Per-record failures never fail the call. Call-level errors (transport
//! failure, timeout, nil response, missing failed-record count, outcome count
//! mismatch) are returned before any record is touched.
//!
//! ## Throttling
//!
//! The dispatcher never throttles itself. `msg_count_rate_limit`,
//! `msg_size_rate_limit` and `concurrency_multiplier` are inputs for the
//! scheduler above it (see `DispatchPool`).

use std::sync::Arc;
use std::time::Duration;

use kinetic_core::Message;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, warn};

use crate::config::KineticConfig;
use crate::error::{ClientError, Result};
use crate::service::{
    PutRecordsOutput, PutRecordsRequest, PutRecordsRequestEntry, StreamService,
    ERR_CODE_THROUGHPUT_EXCEEDED,
};
use crate::stats::{NilStatsCollector, Phase, StatsCollector};
use crate::topology::ShardTopologyResolver;

/// Receives each record that failed in a dispatch call.
///
/// Invoked inline while outcomes are applied, so implementations should hand
/// the record off (clone into a channel, push onto a retry list) rather than
/// block.
pub trait FailureHandler: Send + Sync {
    fn on_failure(&self, message: &Message);
}

impl<F> FailureHandler for F
where
    F: Fn(&Message) + Send + Sync,
{
    fn on_failure(&self, message: &Message) {
        self(message)
    }
}

/// Tally of one dispatch call.
///
/// `sent + failed == attempted` for every successful call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub throughput_exceeded: usize,
    /// Batch positions that failed in this call, ascending.
    pub failed_indices: Vec<usize>,
}

impl DispatchReport {
    pub fn all_sent(&self) -> bool {
        self.failed == 0
    }
}

/// Sends batches for one stream.
pub struct BatchDispatcher {
    service: Arc<dyn StreamService>,
    resolver: ShardTopologyResolver,
    stream: String,
    stats: Arc<dyn StatsCollector>,
    response_read_timeout: Duration,
    msg_count_rate_limit: u64,
    msg_size_rate_limit: u64,
    batch_max_records: usize,
    batch_max_bytes: usize,
}

impl BatchDispatcher {
    pub fn builder(service: Arc<dyn StreamService>, stream: impl Into<String>) -> BatchDispatcherBuilder {
        BatchDispatcherBuilder::new(service, stream)
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }

    pub fn stats(&self) -> &Arc<dyn StatsCollector> {
        &self.stats
    }

    pub fn response_read_timeout(&self) -> Duration {
        self.response_read_timeout
    }

    /// Configured records per second.
    pub fn msg_count_rate_limit(&self) -> u64 {
        self.msg_count_rate_limit
    }

    /// Configured bytes per second.
    pub fn msg_size_rate_limit(&self) -> u64 {
        self.msg_size_rate_limit
    }

    pub fn batch_max_records(&self) -> usize {
        self.batch_max_records
    }

    pub fn batch_max_bytes(&self) -> usize {
        self.batch_max_bytes
    }

    /// Recommended number of concurrent dispatch workers: the stream's
    /// current open shard count, from a fresh describe call.
    pub async fn concurrency_multiplier(&self) -> Result<usize> {
        self.resolver.concurrency_multiplier(&self.stream).await
    }

    /// Dispatch `batch` to the dispatcher's stream.
    pub async fn dispatch(
        &self,
        batch: &mut [Message],
        on_failure: &dyn FailureHandler,
    ) -> Result<DispatchReport> {
        self.dispatch_to(&self.stream, batch, on_failure).await
    }

    /// Dispatch `batch` to `stream` with exactly one put-records call.
    ///
    /// An empty batch is a no-op: the service rejects empty requests.
    pub async fn dispatch_to(
        &self,
        stream: &str,
        batch: &mut [Message],
        on_failure: &dyn FailureHandler,
    ) -> Result<DispatchReport> {
        if batch.is_empty() {
            debug!(stream, "Skipping dispatch of empty batch");
            return Ok(DispatchReport::default());
        }

        let started = Instant::now();

        let request = PutRecordsRequest {
            stream_name: stream.to_string(),
            records: batch.iter().map(PutRecordsRequestEntry::from).collect(),
        };
        let build_elapsed = started.elapsed();
        self.stats.record_duration(Phase::Build, build_elapsed);
        debug!(stream, records = batch.len(), elapsed = ?build_elapsed, "Built put-records request");

        let send_started = Instant::now();
        self.stats.add_put_records_called(1);
        let response = timeout(self.response_read_timeout, self.service.put_records(request)).await;
        let send_elapsed = send_started.elapsed();
        self.stats.record_duration(Phase::Send, send_elapsed);
        debug!(stream, elapsed = ?send_elapsed, "Put-records call returned");

        let result = match response {
            Err(_) => Err(ClientError::Timeout(self.response_read_timeout)),
            Ok(Err(e)) => Err(e),
            Ok(Ok(output)) => self.apply_outcomes(stream, batch, output, on_failure),
        };
        self.stats.record_duration(Phase::Total, started.elapsed());

        match &result {
            Ok(report) => debug!(
                stream,
                sent = report.sent,
                failed = report.failed,
                throughput_exceeded = report.throughput_exceeded,
                "Dispatched batch"
            ),
            Err(e) => error!(stream, records = batch.len(), error = %e, "Dispatch failed"),
        }
        result
    }

    fn apply_outcomes(
        &self,
        stream: &str,
        batch: &mut [Message],
        output: Option<PutRecordsOutput>,
        on_failure: &dyn FailureHandler,
    ) -> Result<DispatchReport> {
        let output = output.ok_or(ClientError::NilPutRecordsResponse)?;
        let reported_failed = output
            .failed_record_count
            .ok_or(ClientError::NilFailedRecordCount)?;
        if output.records.len() != batch.len() {
            return Err(ClientError::OutcomeCountMismatch {
                submitted: batch.len(),
                returned: output.records.len(),
            });
        }

        let mut report = DispatchReport {
            attempted: batch.len(),
            ..Default::default()
        };

        for (index, (message, outcome)) in batch.iter_mut().zip(output.records).enumerate() {
            match (outcome.sequence_number, outcome.shard_id) {
                (Some(sequence_number), Some(shard_id)) => {
                    message.mark_success(sequence_number, shard_id);
                    report.sent += 1;
                }
                _ => {
                    let throttled =
                        outcome.error_code.as_deref() == Some(ERR_CODE_THROUGHPUT_EXCEEDED);
                    message.mark_failure(outcome.error_code, outcome.error_message);
                    report.failed += 1;
                    report.failed_indices.push(index);
                    if throttled {
                        report.throughput_exceeded += 1;
                    }
                    debug!(
                        stream,
                        partition_key = %message.partition_key,
                        error_code = message.error_code.as_deref().unwrap_or(""),
                        fail_count = message.fail_count,
                        "Record failed"
                    );
                    on_failure.on_failure(message);
                }
            }
        }

        if reported_failed != report.failed as u64 {
            warn!(
                stream,
                reported = reported_failed,
                observed = report.failed,
                "FailedRecordCount disagrees with per-record outcomes"
            );
        }

        self.stats.add_sent_success(report.sent as u64);
        self.stats.add_sent_failed(report.failed as u64);
        if report.throughput_exceeded > 0 {
            self.stats
                .add_throughput_exceeded(report.throughput_exceeded as u64);
        }
        Ok(report)
    }
}

/// Builder for [`BatchDispatcher`].
pub struct BatchDispatcherBuilder {
    service: Arc<dyn StreamService>,
    stream: String,
    stats: Arc<dyn StatsCollector>,
    config: KineticConfig,
}

impl BatchDispatcherBuilder {
    pub fn new(service: Arc<dyn StreamService>, stream: impl Into<String>) -> Self {
        Self {
            service,
            stream: stream.into(),
            stats: Arc::new(NilStatsCollector),
            config: KineticConfig::default(),
        }
    }

    /// Take timeout, rate limits and batch bounds from `config`.
    pub fn config(mut self, config: &KineticConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsCollector>) -> Self {
        self.stats = stats;
        self
    }

    pub fn response_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.response_read_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn rate_limits(mut self, msg_count: u64, msg_size: u64) -> Self {
        self.config.msg_count_rate_limit = msg_count;
        self.config.msg_size_rate_limit = msg_size;
        self
    }

    pub fn build(self) -> Result<BatchDispatcher> {
        if self.stream.is_empty() {
            return Err(ClientError::ConfigError("stream name is required".to_string()));
        }
        self.config.validate()?;

        Ok(BatchDispatcher {
            resolver: ShardTopologyResolver::new(Arc::clone(&self.service)),
            service: self.service,
            stream: self.stream,
            stats: self.stats,
            response_read_timeout: self.config.response_read_timeout(),
            msg_count_rate_limit: self.config.msg_count_rate_limit,
            msg_size_rate_limit: self.config.msg_size_rate_limit,
            batch_max_records: self.config.batch_max_records,
            batch_max_bytes: self.config.batch_max_bytes,
        })
    }
}
