//! Batch Assembly
//!
//! A batch is an ordered run of messages bounded by a record count and a
//! cumulative byte size (payload plus partition key). The dispatcher does
//! not enforce these bounds; callers build batches with [`BatchBuilder`] and
//! flush whenever it reports `Full`.
//!
//! ```ignore
//! let mut builder = BatchBuilder::from_config(&config);
//! for message in incoming {
//!     if let PushResult::Full(message) = builder.push(message)? {
//!         dispatcher.dispatch(&mut builder.take(), &on_failure).await?;
//!         builder.push(message)?;
//!     }
//! }
//! ```
//!
//! Deciding *when* to flush a partially filled batch (linger timers) is left
//! to the caller; [`BatchBuilder::age`] is provided for that.

use tokio::time::{Duration, Instant};
use tracing::trace;

use kinetic_core::Message;

use crate::config::KineticConfig;
use crate::error::{ClientError, Result};

/// Outcome of [`BatchBuilder::push`].
#[derive(Debug, PartialEq, Eq)]
pub enum PushResult {
    Accepted,
    /// The message does not fit; it is handed back untouched.
    Full(Message),
}

#[derive(Debug)]
pub struct BatchBuilder {
    messages: Vec<Message>,
    size_bytes: usize,
    max_records: usize,
    max_bytes: usize,
    started_at: Instant,
}

impl BatchBuilder {
    pub fn new(max_records: usize, max_bytes: usize) -> Self {
        Self {
            messages: Vec::with_capacity(max_records.min(1024)),
            size_bytes: 0,
            max_records,
            max_bytes,
            started_at: Instant::now(),
        }
    }

    pub fn from_config(config: &KineticConfig) -> Self {
        Self::new(config.batch_max_records, config.batch_max_bytes)
    }

    /// Append `message` if it fits.
    ///
    /// Fails with `MessageTooLarge` when the message alone exceeds the byte
    /// bound, since no batch could ever carry it.
    pub fn push(&mut self, message: Message) -> Result<PushResult> {
        let size = message.size_bytes();
        if size > self.max_bytes {
            return Err(ClientError::MessageTooLarge {
                size,
                max: self.max_bytes,
            });
        }
        if self.messages.len() >= self.max_records || self.size_bytes + size > self.max_bytes {
            return Ok(PushResult::Full(message));
        }
        if self.messages.is_empty() {
            self.started_at = Instant::now();
        }
        self.size_bytes += size;
        self.messages.push(message);
        trace!(
            record_count = self.messages.len(),
            size_bytes = self.size_bytes,
            "Appended message to batch"
        );
        Ok(PushResult::Accepted)
    }

    /// True when no further message can be accepted.
    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.max_records || self.size_bytes >= self.max_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }

    /// Time since the first message of the current batch was accepted.
    pub fn age(&self) -> Duration {
        if self.messages.is_empty() {
            Duration::ZERO
        } else {
            self.started_at.elapsed()
        }
    }

    /// Hand out the current batch and start a new one.
    pub fn take(&mut self) -> Vec<Message> {
        self.size_bytes = 0;
        self.started_at = Instant::now();
        std::mem::take(&mut self.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn message(key: &str, len: usize) -> Message {
        Message::new(key, Bytes::from(vec![b'x'; len]))
    }

    #[test]
    fn test_full_by_count() {
        let mut builder = BatchBuilder::new(2, 1024);
        assert_eq!(builder.push(message("a", 1)).unwrap(), PushResult::Accepted);
        assert_eq!(builder.push(message("b", 1)).unwrap(), PushResult::Accepted);
        assert!(builder.is_full());

        let rejected = message("c", 1);
        assert_eq!(
            builder.push(rejected.clone()).unwrap(),
            PushResult::Full(rejected)
        );
        assert_eq!(builder.len(), 2);
    }

    #[test]
    fn test_full_by_bytes() {
        let mut builder = BatchBuilder::new(100, 10);
        builder.push(message("k", 5)).unwrap(); // 6 bytes
        let result = builder.push(message("k", 4)).unwrap(); // 5 more would be 11
        assert!(matches!(result, PushResult::Full(_)));
        assert_eq!(builder.size_bytes(), 6);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let mut builder = BatchBuilder::new(100, 10);
        let err = builder.push(message("key", 20)).unwrap_err();
        assert!(matches!(err, ClientError::MessageTooLarge { size: 23, max: 10 }));
        assert!(builder.is_empty());
    }

    #[test]
    fn test_take_resets() {
        let mut builder = BatchBuilder::new(10, 1024);
        builder.push(message("a", 3)).unwrap();
        builder.push(message("b", 3)).unwrap();

        let batch = builder.take();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].partition_key, "a");
        assert!(builder.is_empty());
        assert_eq!(builder.size_bytes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_starts_with_first_message() {
        let mut builder = BatchBuilder::new(10, 1024);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(builder.age(), Duration::ZERO);

        builder.push(message("a", 1)).unwrap();
        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(builder.age(), Duration::from_millis(250));
    }
}
