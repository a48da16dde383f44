//! Message Data Structure
//!
//! This module defines `Message`, the unit of data moved through kinetic in
//! both directions: records submitted to the stream service by the dispatcher,
//! and records delivered to the listener by the multilang bridge.
//!
//! ## Structure
//! Each message carries:
//! - **partition_key**: determines which shard the service appends the record to
//! - **data**: the opaque payload bytes
//! - **sequence_number / shard_id**: assigned by the service, set only on success
//! - **error_code / error_message**: copied from the service on a failed attempt
//! - **fail_count**: incremented once per failed dispatch attempt, never reset
//!
//! ## Ownership
//! A message is owned by the batch that carries it. The dispatcher mutates the
//! message in place to report the outcome of a dispatch call, so the same
//! message must never be part of two in-flight batches.
//!
//! ## Example
//! ```ignore
//! let mut message = Message::new("user-123", Bytes::from(r#"{"action":"click"}"#));
//! message.mark_success("49590338271490256608559692538361571095921575989136588898", "shardId-000000000000");
//! assert!(message.is_delivered());
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// A single stream record and its dispatch outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Partition key used by the service to pick a shard
    pub partition_key: String,

    /// Payload
    pub data: Bytes,

    /// Sequence number assigned by the service
    pub sequence_number: Option<String>,

    /// Sub-sequence number for de-aggregated records (consumer side only)
    pub sub_sequence_number: Option<i64>,

    /// Approximate arrival time in milliseconds since epoch (consumer side only)
    pub approximate_arrival_timestamp: Option<i64>,

    /// Shard the record was appended to
    pub shard_id: Option<String>,

    /// Error code from the last failed attempt
    pub error_code: Option<String>,

    /// Error message from the last failed attempt
    pub error_message: Option<String>,

    /// Number of failed dispatch attempts
    pub fail_count: u32,
}

impl Message {
    pub fn new(partition_key: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            partition_key: partition_key.into(),
            data: data.into(),
            sequence_number: None,
            sub_sequence_number: None,
            approximate_arrival_timestamp: None,
            shard_id: None,
            error_code: None,
            error_message: None,
            fail_count: 0,
        }
    }

    /// Size counted against batch and rate limits: payload plus partition key.
    pub fn size_bytes(&self) -> usize {
        self.data.len() + self.partition_key.len()
    }

    /// Record a successful append.
    ///
    /// Clears any error left over from an earlier failed attempt; `fail_count`
    /// is kept so retry history stays visible.
    pub fn mark_success(&mut self, sequence_number: impl Into<String>, shard_id: impl Into<String>) {
        self.sequence_number = Some(sequence_number.into());
        self.shard_id = Some(shard_id.into());
        self.error_code = None;
        self.error_message = None;
    }

    /// Record a failed attempt and bump `fail_count`.
    ///
    /// Clears any sequence number and shard id the message arrived with, so a
    /// failed message never reads as delivered.
    pub fn mark_failure(&mut self, error_code: Option<String>, error_message: Option<String>) {
        self.sequence_number = None;
        self.shard_id = None;
        self.error_code = error_code;
        self.error_message = error_message;
        self.fail_count += 1;
    }

    /// True once the service assigned both a sequence number and a shard.
    pub fn is_delivered(&self) -> bool {
        self.sequence_number.is_some() && self.shard_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_message_is_pending() {
        let message = Message::new("key", Bytes::from_static(b"payload"));
        assert_eq!(message.partition_key, "key");
        assert_eq!(message.fail_count, 0);
        assert!(!message.is_delivered());
        assert!(message.error_code.is_none());
    }

    #[test]
    fn test_size_bytes_counts_key_and_payload() {
        let message = Message::new("abc", Bytes::from_static(b"12345"));
        assert_eq!(message.size_bytes(), 8);
    }

    #[test]
    fn test_mark_failure_increments_fail_count() {
        let mut message = Message::new("k", Bytes::from_static(b"v"));
        message.mark_failure(
            Some("ProvisionedThroughputExceededException".to_string()),
            Some("Rate exceeded for shard".to_string()),
        );
        message.mark_failure(Some("InternalFailure".to_string()), None);

        assert_eq!(message.fail_count, 2);
        assert_eq!(message.error_code.as_deref(), Some("InternalFailure"));
        assert!(message.error_message.is_none());
        assert!(!message.is_delivered());
    }

    #[test]
    fn test_mark_success_after_failure_clears_error() {
        let mut message = Message::new("k", Bytes::from_static(b"v"));
        message.mark_failure(Some("InternalFailure".to_string()), Some("boom".to_string()));
        message.mark_success("100", "shardId-000000000001");

        assert!(message.is_delivered());
        assert_eq!(message.sequence_number.as_deref(), Some("100"));
        assert_eq!(message.shard_id.as_deref(), Some("shardId-000000000001"));
        assert!(message.error_code.is_none());
        assert_eq!(message.fail_count, 1);
    }

    #[test]
    fn test_mark_failure_clears_stamped_ids() {
        let mut message = Message::new("k", Bytes::from_static(b"v"));
        message.sequence_number = Some("42".to_string());
        message.shard_id = Some("shardId-000000000009".to_string());
        assert!(message.is_delivered());

        message.mark_failure(Some("InternalFailure".to_string()), None);

        assert!(!message.is_delivered());
        assert!(message.sequence_number.is_none());
        assert!(message.shard_id.is_none());
        assert_eq!(message.fail_count, 1);
    }

    #[test]
    fn test_serde_json() {
        let message = Message::new("k", Bytes::from_static(b"v"));
        let json = serde_json::to_string(&message).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, message);
    }
}
