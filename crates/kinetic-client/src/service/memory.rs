//! In-memory stream service.
//!
//! `MemoryStreamService` keeps streams, shards and appended records in process
//! memory. It is used for tests and local development in the same way an
//! in-memory metadata store would be: no network, deterministic behaviour, and
//! hooks to inject the failure modes the real service can produce.
//!
//! ## Failure injection
//!
//! Each put-records call first pops the next [`PutPlan`] (if any):
//!
//! ```ignore
//! let service = MemoryStreamService::new();
//! service.create_stream("orders", 2).await?;
//! service.push_put_plan(PutPlan::FailIndices(vec![
//!     (2, ERR_CODE_THROUGHPUT_EXCEEDED.to_string()),
//! ])).await;
//! ```
//!
//! ## Lifecycle timing
//!
//! `with_activation_delay(n)` keeps a new stream in `CREATING` for `n`
//! describe calls; `with_deletion_delay(n)` keeps a deleted stream visible as
//! `DELETING` for `n` describe calls before it disappears.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kinetic_core::Shard;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::{
    DescribeStreamOutput, PutRecordsOutput, PutRecordsRequest, PutRecordsResultEntry,
    StreamDescription, StreamService, StreamStatus, ERR_CODE_INTERNAL_FAILURE,
};
use crate::error::{ClientError, Result};
use crate::topology::ShardTopology;

/// Scripted behaviour for one put-records call.
#[derive(Debug, Clone)]
pub enum PutPlan {
    /// Reject the records at these indices with the given error code; the
    /// rest are appended normally.
    FailIndices(Vec<(usize, String)>),
    /// Return no response body.
    NilResponse,
    /// Append normally but omit the failed-record count.
    MissingFailedCount,
    /// Append normally but drop this many outcomes from the end of the list.
    TruncateOutcomes(usize),
    /// Fail the whole call.
    Error(String),
    /// Sleep before handling the call normally.
    Delay(Duration),
}

struct MemoryStream {
    status: StreamStatus,
    /// Describe calls left before the current transition completes.
    countdown: u32,
    shards: Vec<Shard>,
    /// shard id -> (sequence number, payload)
    records: HashMap<String, Vec<(String, Bytes)>>,
}

impl MemoryStream {
    fn next_shard_id(&self) -> String {
        format!("shardId-{:012}", self.shards.len())
    }
}

pub struct MemoryStreamService {
    streams: Mutex<HashMap<String, MemoryStream>>,
    put_plans: Mutex<VecDeque<PutPlan>>,
    next_sequence: AtomicU64,
    put_calls: AtomicU64,
    activation_delay: u32,
    deletion_delay: u32,
}

impl Default for MemoryStreamService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStreamService {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            put_plans: Mutex::new(VecDeque::new()),
            next_sequence: AtomicU64::new(1),
            put_calls: AtomicU64::new(0),
            activation_delay: 0,
            deletion_delay: 0,
        }
    }

    pub fn with_activation_delay(mut self, describes: u32) -> Self {
        self.activation_delay = describes;
        self
    }

    pub fn with_deletion_delay(mut self, describes: u32) -> Self {
        self.deletion_delay = describes;
        self
    }

    /// Queue a plan for a future put-records call (FIFO).
    pub async fn push_put_plan(&self, plan: PutPlan) {
        self.put_plans.lock().await.push_back(plan);
    }

    /// Number of put-records calls received, including failed ones.
    pub fn put_calls(&self) -> u64 {
        self.put_calls.load(Ordering::Relaxed)
    }

    /// Payloads appended to one shard, in append order.
    pub async fn shard_records(&self, stream: &str, shard_id: &str) -> Vec<Bytes> {
        let streams = self.streams.lock().await;
        streams
            .get(stream)
            .and_then(|s| s.records.get(shard_id))
            .map(|records| records.iter().map(|(_, data)| data.clone()).collect())
            .unwrap_or_default()
    }

    /// Total number of records appended to a stream.
    pub async fn record_count(&self, stream: &str) -> usize {
        let streams = self.streams.lock().await;
        streams
            .get(stream)
            .map(|s| s.records.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Split `shard_id` into two children. The parent stays in the shard list
    /// (closed) the way the real service retains it until it ages out.
    pub async fn split_shard(&self, stream: &str, shard_id: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::ResourceNotFound(stream.to_string()))?;
        if !s.shards.iter().any(|shard| shard.shard_id == shard_id) {
            return Err(ClientError::Service(
                "SplitShard",
                format!("shard {} not found", shard_id),
            ));
        }
        for _ in 0..2 {
            let child = Shard::new(s.next_shard_id()).with_parent(shard_id);
            s.shards.push(child);
        }
        debug!(stream, shard_id, "Split shard");
        Ok(())
    }

    /// Merge two shards into one child.
    pub async fn merge_shards(&self, stream: &str, shard_id: &str, adjacent_shard_id: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::ResourceNotFound(stream.to_string()))?;
        let child = Shard::new(s.next_shard_id())
            .with_parent(shard_id)
            .with_adjacent_parent(adjacent_shard_id);
        s.shards.push(child);
        debug!(stream, shard_id, adjacent_shard_id, "Merged shards");
        Ok(())
    }

    /// Forget the oldest `count` shards, as the service does once closed
    /// shards pass the retention period.
    pub async fn expire_shards(&self, stream: &str, count: usize) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::ResourceNotFound(stream.to_string()))?;
        let count = count.min(s.shards.len());
        s.shards.drain(..count);
        Ok(())
    }

    fn route<'a>(open: &'a [String], partition_key: &str) -> &'a str {
        let mut hasher = DefaultHasher::new();
        partition_key.hash(&mut hasher);
        let index = (hasher.finish() % open.len() as u64) as usize;
        &open[index]
    }
}

#[async_trait]
impl StreamService for MemoryStreamService {
    async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()> {
        let mut streams = self.streams.lock().await;
        if streams.contains_key(stream) {
            return Err(ClientError::Service(
                "CreateStream",
                format!("stream {} already exists", stream),
            ));
        }
        let shards = (0..shard_count)
            .map(|i| Shard::new(format!("shardId-{:012}", i)))
            .collect();
        streams.insert(
            stream.to_string(),
            MemoryStream {
                status: StreamStatus::Creating,
                countdown: self.activation_delay,
                shards,
                records: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn describe_stream(&self, stream: &str) -> Result<Option<DescribeStreamOutput>> {
        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::ResourceNotFound(stream.to_string()))?;

        match s.status {
            StreamStatus::Creating if s.countdown == 0 => s.status = StreamStatus::Active,
            StreamStatus::Deleting if s.countdown == 0 => {
                streams.remove(stream);
                return Err(ClientError::ResourceNotFound(stream.to_string()));
            }
            StreamStatus::Creating | StreamStatus::Deleting => s.countdown -= 1,
            _ => {}
        }

        Ok(Some(DescribeStreamOutput {
            stream_description: Some(StreamDescription {
                stream_name: stream.to_string(),
                stream_status: s.status,
                shards: s.shards.clone(),
            }),
        }))
    }

    async fn delete_stream(&self, stream: &str) -> Result<()> {
        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(stream)
            .ok_or_else(|| ClientError::ResourceNotFound(stream.to_string()))?;
        s.status = StreamStatus::Deleting;
        s.countdown = self.deletion_delay;
        Ok(())
    }

    async fn put_records(&self, request: PutRecordsRequest) -> Result<Option<PutRecordsOutput>> {
        self.put_calls.fetch_add(1, Ordering::Relaxed);
        let plan = self.put_plans.lock().await.pop_front();

        let mut failures: HashMap<usize, String> = HashMap::new();
        let mut missing_count = false;
        let mut truncate = 0;
        match plan {
            Some(PutPlan::NilResponse) => return Ok(None),
            Some(PutPlan::Error(message)) => return Err(ClientError::Service("PutRecords", message)),
            Some(PutPlan::Delay(delay)) => tokio::time::sleep(delay).await,
            Some(PutPlan::FailIndices(indices)) => failures = indices.into_iter().collect(),
            Some(PutPlan::MissingFailedCount) => missing_count = true,
            Some(PutPlan::TruncateOutcomes(n)) => truncate = n,
            None => {}
        }

        let mut streams = self.streams.lock().await;
        let s = streams
            .get_mut(&request.stream_name)
            .ok_or_else(|| ClientError::ResourceNotFound(request.stream_name.clone()))?;
        if !matches!(s.status, StreamStatus::Active | StreamStatus::Updating) {
            return Err(ClientError::Service(
                "PutRecords",
                format!("stream {} is not active", request.stream_name),
            ));
        }

        let open = ShardTopology::from_shards(&s.shards).open_shard_ids();
        if open.is_empty() {
            return Err(ClientError::Service(
                "PutRecords",
                format!("stream {} has no open shards", request.stream_name),
            ));
        }

        let mut outcomes = Vec::with_capacity(request.records.len());
        let mut failed = 0u64;
        for (index, entry) in request.records.into_iter().enumerate() {
            if let Some(code) = failures.remove(&index) {
                failed += 1;
                let message = if code == ERR_CODE_INTERNAL_FAILURE {
                    "Internal service failure."
                } else {
                    "Rate exceeded for shard"
                };
                outcomes.push(PutRecordsResultEntry::failure(code, message));
                continue;
            }
            let shard_id = Self::route(&open, &entry.partition_key).to_string();
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed).to_string();
            trace!(shard_id = %shard_id, sequence = %sequence, "Appended record");
            s.records
                .entry(shard_id.clone())
                .or_default()
                .push((sequence.clone(), entry.data));
            outcomes.push(PutRecordsResultEntry::success(sequence, shard_id));
        }

        let keep = outcomes.len().saturating_sub(truncate);
        outcomes.truncate(keep);

        Ok(Some(PutRecordsOutput {
            failed_record_count: if missing_count { None } else { Some(failed) },
            records: outcomes,
        }))
    }
}
