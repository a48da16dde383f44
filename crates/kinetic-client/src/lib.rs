//! Kinetic Client - producer side of the kinetic stream client
//!
//! This crate sends records to a shard-partitioned, append-only stream
//! service. It covers batch dispatch with per-record failure accounting,
//! shard-topology-aware concurrency sizing, and the stream lifecycle calls
//! needed to set up and tear down streams.
//!
//! # Examples
//!
//! ## Dispatching a batch
//!
//! ```ignore
//! use kinetic_client::{BatchDispatcher, KineticConfig, AtomicStatsCollector};
//!
//! let stats = Arc::new(AtomicStatsCollector::new());
//! let dispatcher = BatchDispatcher::builder(service, "orders")
//!     .config(&config)
//!     .stats(stats.clone())
//!     .build()?;
//!
//! let report = dispatcher
//!     .dispatch(&mut batch, &|m: &Message| retry_queue.push(m.clone()))
//!     .await?;
//! println!("sent {} failed {}", report.sent, report.failed);
//! ```
//!
//! ## Running a dispatch pool
//!
//! ```ignore
//! use kinetic_client::{DispatchPool, BatchBuilder, PushResult};
//!
//! let pool = DispatchPool::start(Arc::new(dispatcher), &config, Arc::new(|m: Message| {
//!     eprintln!("dropped record {}", m.partition_key);
//! })).await?;
//!
//! let mut builder = BatchBuilder::from_config(&config);
//! for message in messages {
//!     if let PushResult::Full(message) = builder.push(message)? {
//!         pool.submit(builder.take()).await?;
//!         builder.push(message)?;
//!     }
//! }
//! pool.submit(builder.take()).await?;
//! pool.shutdown().await;
//! ```
//!
//! ## Waiting for a stream
//!
//! ```ignore
//! use kinetic_client::{StreamLifecycleManager, WaiterConfig};
//!
//! let lifecycle = StreamLifecycleManager::new(service);
//! lifecycle.create_stream("orders", 4).await?;
//! lifecycle.wait_until_exists("orders", WaiterConfig::default(), &cancel).await?;
//! ```

pub mod batch;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod pool;
pub mod retry;
pub mod service;
pub mod stats;
pub mod throttle;
pub mod topology;

pub use batch::{BatchBuilder, PushResult};
pub use config::{Concurrency, KineticConfig, LogLevel, RetryConfig};
pub use dispatcher::{BatchDispatcher, BatchDispatcherBuilder, DispatchReport, FailureHandler};
pub use error::{ClientError, Result};
pub use lifecycle::{StreamLifecycleManager, WaiterConfig};
pub use pool::{DispatchPool, DropHandler, PoolStats};
pub use retry::{RetryDecision, RetryPolicy};
pub use service::{
    MemoryStreamService, PutPlan, StreamService, StreamStatus, ERR_CODE_INTERNAL_FAILURE,
    ERR_CODE_THROUGHPUT_EXCEEDED,
};
pub use stats::{AtomicStatsCollector, NilStatsCollector, Phase, StatsCollector, StatsSnapshot};
pub use throttle::RateThrottle;
pub use topology::{open_shard_count, ShardTopology, ShardTopologyResolver};
