//! Stream Lifecycle
//!
//! Thin wrapper over the stream service for creating, describing and
//! deleting streams, plus the waiters that poll until a stream reaches the
//! expected state.
//!
//! ## Waiters
//!
//! ```text
//! attempt 1 ── check ── sleep(delay) ── attempt 2 ── ... ── attempt N ── give up
//!                  │           │
//!                  │           └─ cancellation token fires ─→ WaiterCancelled
//!                  └─ expected state reached ─→ Ok
//! ```
//!
//! Cancellation is cooperative: the token is checked before every attempt and
//! raced against every sleep, but an in-flight describe call is never
//! interrupted.
//!
//! - `wait_until_exists` succeeds once the stream reports `ACTIVE`; a missing
//!   stream is retried, since creation may not be visible yet.
//! - `wait_until_deleted` succeeds once describe fails with `ResourceNotFound`.

use std::sync::Arc;
use std::time::Duration;

use kinetic_core::Shard;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::service::{StreamService, StreamStatus};
use crate::topology::{shards_from_output, ShardTopology};

const WAIT_UNTIL_EXISTS: &str = "WaitUntilStreamExists";
const WAIT_UNTIL_DELETED: &str = "WaitUntilStreamIsDeleted";

/// Poll delay and attempt bound of a waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaiterConfig {
    pub delay: Duration,
    pub max_attempts: u32,
}

impl Default for WaiterConfig {
    /// 18 attempts, 10 seconds apart.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            max_attempts: 18,
        }
    }
}

impl WaiterConfig {
    pub fn new(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

#[derive(Clone)]
pub struct StreamLifecycleManager {
    service: Arc<dyn StreamService>,
}

impl StreamLifecycleManager {
    pub fn new(service: Arc<dyn StreamService>) -> Self {
        Self { service }
    }

    pub async fn create_stream(&self, stream: &str, shard_count: u32) -> Result<()> {
        if shard_count == 0 {
            return Err(ClientError::ConfigError(
                "shard_count must be > 0".to_string(),
            ));
        }
        self.service.create_stream(stream, shard_count).await?;
        info!(stream, shard_count, "Requested stream creation");
        Ok(())
    }

    pub async fn delete_stream(&self, stream: &str) -> Result<()> {
        self.service.delete_stream(stream).await?;
        info!(stream, "Requested stream deletion");
        Ok(())
    }

    pub async fn stream_status(&self, stream: &str) -> Result<StreamStatus> {
        let output = self
            .service
            .describe_stream(stream)
            .await?
            .ok_or(ClientError::NilDescribeStreamResponse)?;
        let description = output
            .stream_description
            .ok_or(ClientError::NilStreamDescription)?;
        Ok(description.stream_status)
    }

    /// Current shard descriptors, in service order.
    pub async fn describe_shards(&self, stream: &str) -> Result<Vec<Shard>> {
        let output = self.service.describe_stream(stream).await?;
        shards_from_output(output)
    }

    /// Ids of every shard the service still reports, open or closed.
    pub async fn get_shards(&self, stream: &str) -> Result<Vec<String>> {
        let shards = self.describe_shards(stream).await?;
        Ok(shards.into_iter().map(|s| s.shard_id).collect())
    }

    pub async fn topology(&self, stream: &str) -> Result<ShardTopology> {
        let shards = self.describe_shards(stream).await?;
        Ok(ShardTopology::from_shards(&shards))
    }

    /// Poll until `stream` reports `ACTIVE`.
    pub async fn wait_until_exists(
        &self,
        stream: &str,
        config: WaiterConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        poll(WAIT_UNTIL_EXISTS, config, cancel, move || async move {
            match self.stream_status(stream).await {
                Ok(StreamStatus::Active) => Ok(true),
                Ok(status) => {
                    debug!(stream, ?status, "Stream not active yet");
                    Ok(false)
                }
                Err(ClientError::ResourceNotFound(_)) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Poll until describing `stream` fails with `ResourceNotFound`.
    pub async fn wait_until_deleted(
        &self,
        stream: &str,
        config: WaiterConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        poll(WAIT_UNTIL_DELETED, config, cancel, move || async move {
            match self.service.describe_stream(stream).await {
                Err(ClientError::ResourceNotFound(_)) => Ok(true),
                Ok(_) => Ok(false),
                Err(e) => Err(e),
            }
        })
        .await
    }
}

async fn poll<F, Fut>(
    waiter: &'static str,
    config: WaiterConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for attempt in 1..=config.max_attempts {
        if cancel.is_cancelled() {
            return Err(ClientError::WaiterCancelled(waiter));
        }
        if check().await? {
            debug!(waiter, attempt, "Waiter satisfied");
            return Ok(());
        }
        if attempt == config.max_attempts {
            break;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ClientError::WaiterCancelled(waiter)),
            _ = tokio::time::sleep(config.delay) => {}
        }
    }
    Err(ClientError::WaiterExhausted {
        waiter,
        attempts: config.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::MemoryStreamService;
    use tokio::time::Instant;

    fn fast() -> WaiterConfig {
        WaiterConfig::new(Duration::from_millis(100), 5)
    }

    #[test]
    fn test_default_waiter_config() {
        let config = WaiterConfig::default();
        assert_eq!(config.max_attempts, 18);
        assert_eq!(config.delay, Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_after_activation() {
        let service = Arc::new(MemoryStreamService::new().with_activation_delay(2));
        let manager = StreamLifecycleManager::new(service);
        manager.create_stream("orders", 1).await.unwrap();

        let start = Instant::now();
        manager
            .wait_until_exists("orders", fast(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_exists_exhausts() {
        let service = Arc::new(MemoryStreamService::new());
        let manager = StreamLifecycleManager::new(service);

        let err = manager
            .wait_until_exists("missing", fast(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::WaiterExhausted {
                waiter: WAIT_UNTIL_EXISTS,
                attempts: 5
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_until_deleted() {
        let service = Arc::new(MemoryStreamService::new().with_deletion_delay(3));
        let manager = StreamLifecycleManager::new(service);
        manager.create_stream("orders", 1).await.unwrap();
        manager.delete_stream("orders").await.unwrap();

        manager
            .wait_until_deleted("orders", fast(), &CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            manager.stream_status("orders").await,
            Err(ClientError::ResourceNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_before_first_attempt() {
        let service = Arc::new(MemoryStreamService::new());
        let manager = StreamLifecycleManager::new(service);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = manager
            .wait_until_deleted("orders", fast(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WaiterCancelled(WAIT_UNTIL_DELETED)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_sleep() {
        let service = Arc::new(MemoryStreamService::new().with_activation_delay(100));
        let manager = StreamLifecycleManager::new(service);
        manager.create_stream("orders", 1).await.unwrap();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = manager
            .wait_until_exists("orders", WaiterConfig::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::WaiterCancelled(_)));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_get_shards_lists_all_ids() {
        let service = Arc::new(MemoryStreamService::new());
        let manager = StreamLifecycleManager::new(service.clone());
        manager.create_stream("orders", 2).await.unwrap();
        service.split_shard("orders", "shardId-000000000000").await.unwrap();

        let ids = manager.get_shards("orders").await.unwrap();
        assert_eq!(
            ids,
            vec![
                "shardId-000000000000",
                "shardId-000000000001",
                "shardId-000000000002",
                "shardId-000000000003",
            ]
        );
        assert_eq!(manager.topology("orders").await.unwrap().open_count(), 3);
    }

    #[tokio::test]
    async fn test_zero_shards_rejected() {
        let manager = StreamLifecycleManager::new(Arc::new(MemoryStreamService::new()));
        assert!(matches!(
            manager.create_stream("orders", 0).await,
            Err(ClientError::ConfigError(_))
        ));
    }
}
