//! Integration tests for stream lifecycle management and its waiters.

use std::sync::Arc;
use std::time::Duration;

use kinetic_client::{
    ClientError, MemoryStreamService, ShardTopologyResolver, StreamLifecycleManager, StreamStatus, WaiterConfig,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_create_wait_reshard_delete() {
    let service = Arc::new(MemoryStreamService::new().with_activation_delay(3).with_deletion_delay(2));
    let lifecycle = StreamLifecycleManager::new(service.clone());
    let cancel = CancellationToken::new();
    let waiter = WaiterConfig::new(Duration::from_secs(1), 10);

    lifecycle.create_stream("payments", 2).await.unwrap();
    assert_eq!(lifecycle.stream_status("payments").await.unwrap(), StreamStatus::Creating);

    let start = Instant::now();
    lifecycle.wait_until_exists("payments", waiter, &cancel).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(lifecycle.stream_status("payments").await.unwrap(), StreamStatus::Active);

    let resolver = ShardTopologyResolver::new(service.clone());
    assert_eq!(resolver.resolve("payments").await.unwrap(), 2);

    service.split_shard("payments", "shardId-000000000001").await.unwrap();
    let topology = lifecycle.topology("payments").await.unwrap();
    assert_eq!(topology.open_count(), 3);
    assert_eq!(topology.closed_shard_ids(), ["shardId-000000000001".to_string()]);

    // The split parent ages out of the shard list; its children stay open.
    service.expire_shards("payments", 2).await.unwrap();
    assert_eq!(resolver.resolve("payments").await.unwrap(), 2);
    assert_eq!(
        lifecycle.get_shards("payments").await.unwrap(),
        vec!["shardId-000000000002", "shardId-000000000003"]
    );

    lifecycle.delete_stream("payments").await.unwrap();
    lifecycle.wait_until_deleted("payments", waiter, &cancel).await.unwrap();
    assert!(matches!(
        lifecycle.stream_status("payments").await,
        Err(ClientError::ResourceNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_deletion_waiter_gives_up() {
    let service = Arc::new(MemoryStreamService::new().with_deletion_delay(50));
    let lifecycle = StreamLifecycleManager::new(service);
    lifecycle.create_stream("logs", 1).await.unwrap();
    lifecycle.delete_stream("logs").await.unwrap();

    let start = Instant::now();
    let err = lifecycle
        .wait_until_deleted("logs", WaiterConfig::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::WaiterExhausted { attempts: 18, .. }));
    assert_eq!(start.elapsed(), Duration::from_secs(170));
}

#[tokio::test(start_paused = true)]
async fn test_parent_cancellation_stops_waiter() {
    let service = Arc::new(MemoryStreamService::new().with_activation_delay(1000));
    let lifecycle = StreamLifecycleManager::new(service);
    lifecycle.create_stream("audit", 1).await.unwrap();

    let parent = CancellationToken::new();
    let child = parent.child_token();
    let waiting = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.wait_until_exists("audit", WaiterConfig::default(), &child).await })
    };

    tokio::time::sleep(Duration::from_secs(25)).await;
    parent.cancel();
    let err = waiting.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::WaiterCancelled(_)));
}

#[tokio::test]
async fn test_describe_missing_stream() {
    let lifecycle = StreamLifecycleManager::new(Arc::new(MemoryStreamService::new()));
    assert!(matches!(
        lifecycle.get_shards("nope").await,
        Err(ClientError::ResourceNotFound(_))
    ));
    assert!(matches!(
        lifecycle.delete_stream("nope").await,
        Err(ClientError::ResourceNotFound(_))
    ));
}
