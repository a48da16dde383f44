//! Dispatch Pool
//!
//! A fixed set of worker tasks that pull batches from one bounded queue and
//! dispatch them, roughly one in-flight batch per writable shard.
//!
//! ## Architecture
//!
//! ```text
//!  submit(batch) ──→ [ bounded mpsc queue ] ──┬─→ worker 0 ─┐
//!   (awaits when full)                         ├─→ worker 1 ─┼─→ throttle ─→ BatchDispatcher
//!                                              └─→ worker N ─┘        ↑
//!                                                     │ failed records │
//!                                                     └── RetryPolicy ─┘ ─→ DropHandler
//! ```
//!
//! - **Sizing**: `Concurrency::Fixed(n)` or the stream's open shard count
//!   (minimum 1). `resize_from_topology` re-derives it from a fresh snapshot.
//! - **Backpressure**: `submit` awaits queue capacity; the queue never grows
//!   beyond `queue_depth` batches.
//! - **Rate**: every attempt passes through a [`RateThrottle`] built from the
//!   dispatcher's rate-limit accessors.
//! - **Retry**: a worker keeps a batch until every record is delivered or
//!   dropped. A retryable call-level error counts as a failed attempt for
//!   every record in the batch; a non-retryable one drops them all.
//! - **Shutdown**: closing the queue lets workers drain what is queued, then
//!   they exit and are joined.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kinetic_core::Message;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::{Concurrency, KineticConfig};
use crate::dispatcher::BatchDispatcher;
use crate::error::{ClientError, Result};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::throttle::RateThrottle;

/// Receives records the pool gave up on, with their last error attached.
pub trait DropHandler: Send + Sync {
    fn on_drop(&self, message: Message);
}

impl<F> DropHandler for F
where
    F: Fn(Message) + Send + Sync,
{
    fn on_drop(&self, message: Message) {
        self(message)
    }
}

/// Counters of a running pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub batches_dispatched: u64,
    pub records_delivered: u64,
    pub records_retried: u64,
    pub records_dropped: u64,
}

struct Shared {
    dispatcher: Arc<BatchDispatcher>,
    throttle: RateThrottle,
    retry: RetryPolicy,
    on_drop: Arc<dyn DropHandler>,
    queue: Mutex<mpsc::Receiver<Vec<Message>>>,
    batches_dispatched: AtomicU64,
    records_delivered: AtomicU64,
    records_retried: AtomicU64,
    records_dropped: AtomicU64,
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct DispatchPool {
    sender: mpsc::Sender<Vec<Message>>,
    shared: Arc<Shared>,
    workers: Vec<Worker>,
    next_worker_id: usize,
}

impl DispatchPool {
    /// Start the pool and its workers.
    ///
    /// With `Concurrency::FromTopology` the stream is described once to size
    /// the pool; a missing topology fails startup.
    pub async fn start(
        dispatcher: Arc<BatchDispatcher>,
        config: &KineticConfig,
        on_drop: Arc<dyn DropHandler>,
    ) -> Result<Self> {
        config.validate()?;
        let worker_count = match config.concurrency {
            Concurrency::Fixed(n) => n,
            Concurrency::FromTopology => dispatcher.concurrency_multiplier().await?.max(1),
        };

        let (sender, receiver) = mpsc::channel(config.queue_depth);
        let shared = Arc::new(Shared {
            throttle: RateThrottle::new(
                dispatcher.msg_count_rate_limit(),
                dispatcher.msg_size_rate_limit(),
            ),
            dispatcher,
            retry: config.retry_policy(),
            on_drop,
            queue: Mutex::new(receiver),
            batches_dispatched: AtomicU64::new(0),
            records_delivered: AtomicU64::new(0),
            records_retried: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
        });

        let mut pool = Self {
            sender,
            shared,
            workers: Vec::new(),
            next_worker_id: 0,
        };
        pool.resize(worker_count).await;
        info!(
            stream = pool.shared.dispatcher.stream(),
            workers = worker_count,
            queue_depth = config.queue_depth,
            "Started dispatch pool"
        );
        Ok(pool)
    }

    /// Queue a batch, waiting for capacity when the queue is full.
    pub async fn submit(&self, batch: Vec<Message>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.sender
            .send(batch)
            .await
            .map_err(|_| ClientError::PoolClosed)
    }

    /// Queue a batch without waiting. A full queue hands the batch back.
    pub fn try_submit(&self, batch: Vec<Message>) -> std::result::Result<(), Vec<Message>> {
        match self.sender.try_send(batch) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(batch))
            | Err(mpsc::error::TrySendError::Closed(batch)) => Err(batch),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.stats()
    }

    /// Grow or shrink to `workers` (minimum 1). Retired workers finish the
    /// batch they hold before exiting.
    pub async fn resize(&mut self, workers: usize) {
        let target = workers.max(1);
        while self.workers.len() < target {
            let id = self.next_worker_id;
            self.next_worker_id += 1;
            let cancel = CancellationToken::new();
            let shared = Arc::clone(&self.shared);
            let token = cancel.clone();
            let handle = tokio::spawn(async move { shared.run_worker(id, token).await });
            self.workers.push(Worker { cancel, handle });
        }

        let mut retired = Vec::new();
        while self.workers.len() > target {
            if let Some(worker) = self.workers.pop() {
                worker.cancel.cancel();
                retired.push(worker.handle);
            }
        }
        for handle in retired {
            if let Err(e) = handle.await {
                error!(error = %e, "Dispatch worker panicked");
            }
        }
        debug!(workers = self.workers.len(), "Resized dispatch pool");
    }

    /// Re-derive the worker count from the stream's current open shards.
    pub async fn resize_from_topology(&mut self) -> Result<usize> {
        let open = self.shared.dispatcher.concurrency_multiplier().await?;
        self.resize(open).await;
        Ok(self.workers.len())
    }

    /// Stop accepting batches, let workers drain the queue, and join them.
    pub async fn shutdown(self) -> PoolStats {
        let DispatchPool {
            sender,
            shared,
            workers,
            ..
        } = self;
        drop(sender);
        for worker in workers {
            if let Err(e) = worker.handle.await {
                error!(error = %e, "Dispatch worker panicked");
            }
        }
        let stats = shared.stats();
        info!(
            batches = stats.batches_dispatched,
            delivered = stats.records_delivered,
            dropped = stats.records_dropped,
            "Dispatch pool shut down"
        );
        stats
    }
}

impl Shared {
    fn stats(&self) -> PoolStats {
        PoolStats {
            batches_dispatched: self.batches_dispatched.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_retried: self.records_retried.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }

    async fn run_worker(&self, id: usize, cancel: CancellationToken) {
        trace!(worker = id, "Dispatch worker started");
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                batch = async { self.queue.lock().await.recv().await } => batch,
            };
            let Some(batch) = next else { break };
            self.process(id, batch).await;
        }
        trace!(worker = id, "Dispatch worker stopped");
    }

    async fn process(&self, worker: usize, batch: Vec<Message>) {
        let mut pending = batch;
        while !pending.is_empty() {
            let bytes: usize = pending.iter().map(Message::size_bytes).sum();
            self.throttle
                .acquire(pending.len() as u64, bytes as u64)
                .await;

            let on_failure = |m: &Message| {
                trace!(worker, partition_key = %m.partition_key, fail_count = m.fail_count, "Record will be re-evaluated");
            };
            let failed = match self.dispatcher.dispatch(&mut pending, &on_failure).await {
                Ok(report) => {
                    self.batches_dispatched.fetch_add(1, Ordering::Relaxed);
                    self.records_delivered
                        .fetch_add(report.sent as u64, Ordering::Relaxed);
                    report.failed_indices
                }
                Err(e) if e.is_retryable() => {
                    warn!(worker, records = pending.len(), error = %e, "Retryable dispatch error");
                    let reason = e.to_string();
                    for message in pending.iter_mut() {
                        message.mark_failure(None, Some(reason.clone()));
                    }
                    (0..pending.len()).collect()
                }
                Err(e) => {
                    error!(worker, records = pending.len(), error = %e, "Dropping batch after dispatch error");
                    let reason = e.to_string();
                    for mut message in pending.drain(..) {
                        message.mark_failure(None, Some(reason.clone()));
                        self.drop_message(message);
                    }
                    return;
                }
            };

            // Only this attempt's outcomes count: a message may arrive
            // already carrying ids from elsewhere.
            let mut failed = failed.into_iter().peekable();
            let mut retry_after = Duration::ZERO;
            let mut retry = Vec::new();
            for (index, message) in pending.drain(..).enumerate() {
                if failed.next_if_eq(&index).is_none() {
                    continue;
                }
                match self.retry.decide(&message) {
                    RetryDecision::Retry(backoff) => {
                        retry_after = retry_after.max(backoff);
                        retry.push(message);
                    }
                    RetryDecision::Drop => self.drop_message(message),
                }
            }

            if !retry.is_empty() {
                self.records_retried
                    .fetch_add(retry.len() as u64, Ordering::Relaxed);
                debug!(worker, records = retry.len(), backoff = ?retry_after, "Retrying failed records");
                tokio::time::sleep(retry_after).await;
            }
            pending = retry;
        }
    }

    fn drop_message(&self, message: Message) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
        warn!(
            partition_key = %message.partition_key,
            fail_count = message.fail_count,
            error_code = message.error_code.as_deref().unwrap_or(""),
            "Dropping record"
        );
        self.on_drop.on_drop(message);
    }
}
