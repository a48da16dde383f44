//! Stream service seam.
//!
//! `StreamService` is the boundary between kinetic and the shard-partitioned
//! stream service's network API. Everything above it (dispatcher, topology
//! resolver, lifecycle waiters) is written against this trait so the wire
//! client can be swapped out, and tests run against [`MemoryStreamService`].
//!
//! ## Response shapes
//!
//! Responses mirror the service's JSON documents, including the fields the
//! service is allowed to omit. A `None` response models an empty body, and
//! optional fields model absent members. Callers validate them and turn
//! omissions into call-level errors instead of trusting defaults.

pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use kinetic_core::{Message, Shard};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use memory::{MemoryStreamService, PutPlan};

/// Error code the service uses for records rejected by shard rate limiting.
pub const ERR_CODE_THROUGHPUT_EXCEEDED: &str = "ProvisionedThroughputExceededException";

/// Error code the service uses for records that failed inside the service.
pub const ERR_CODE_INTERNAL_FAILURE: &str = "InternalFailure";

/// Lifecycle state reported by describe-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StreamStatus {
    Creating,
    Active,
    Updating,
    Deleting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescription {
    pub stream_name: String,
    pub stream_status: StreamStatus,
    pub shards: Vec<Shard>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeStreamOutput {
    pub stream_description: Option<StreamDescription>,
}

/// One record of a put-records request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordsRequestEntry {
    pub partition_key: String,
    pub data: Bytes,
}

impl From<&Message> for PutRecordsRequestEntry {
    fn from(message: &Message) -> Self {
        Self {
            partition_key: message.partition_key.clone(),
            data: message.data.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordsRequest {
    pub stream_name: String,
    pub records: Vec<PutRecordsRequestEntry>,
}

/// Outcome for one submitted record.
///
/// Success carries both `sequence_number` and `shard_id`; failure carries
/// `error_code` and usually `error_message`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutRecordsResultEntry {
    pub sequence_number: Option<String>,
    pub shard_id: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl PutRecordsResultEntry {
    pub fn success(sequence_number: impl Into<String>, shard_id: impl Into<String>) -> Self {
        Self {
            sequence_number: Some(sequence_number.into()),
            shard_id: Some(shard_id.into()),
            ..Default::default()
        }
    }

    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.into()),
            error_message: Some(error_message.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecordsOutput {
    pub failed_record_count: Option<u64>,
    /// One entry per submitted record, in submission order.
    pub records: Vec<PutRecordsResultEntry>,
}

/// Network API of the stream service.
#[async_trait]
pub trait StreamService: Send + Sync {
    /// Create a stream with `shard_count` shards. Returns once the request is
    /// accepted; the stream is usable only after it reports `Active`.
    async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()>;

    /// Describe a stream's status and current shard descriptors.
    ///
    /// Fails with `ClientError::ResourceNotFound` when the stream is gone.
    async fn describe_stream(&self, stream: &str) -> Result<Option<DescribeStreamOutput>>;

    /// Request deletion of a stream.
    async fn delete_stream(&self, stream: &str) -> Result<()>;

    /// Append a batch of records, one outcome per record.
    async fn put_records(&self, request: PutRecordsRequest) -> Result<Option<PutRecordsOutput>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_entry_from_message() {
        let message = Message::new("user-1", Bytes::from_static(b"hello"));
        let entry = PutRecordsRequestEntry::from(&message);
        assert_eq!(entry.partition_key, "user-1");
        assert_eq!(entry.data, Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_result_entry_constructors() {
        let ok = PutRecordsResultEntry::success("1", "shardId-000000000000");
        assert!(ok.error_code.is_none());
        assert_eq!(ok.shard_id.as_deref(), Some("shardId-000000000000"));

        let failed = PutRecordsResultEntry::failure(ERR_CODE_THROUGHPUT_EXCEEDED, "slow down");
        assert!(failed.sequence_number.is_none());
        assert_eq!(failed.error_code.as_deref(), Some(ERR_CODE_THROUGHPUT_EXCEEDED));
    }

    #[test]
    fn test_stream_status_serde() {
        assert_eq!(
            serde_json::to_string(&StreamStatus::Active).unwrap(),
            "\"ACTIVE\""
        );
    }
}
