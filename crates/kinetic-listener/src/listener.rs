//! Delivery pipeline
//!
//! A [`Listener`] owns the consumer end of a bounded channel that a
//! [`ProtocolBridge`] feeds. Starting it spawns two tasks:
//!
//! - **input**: runs the bridge's input loop over the daemon's output
//! - **pump**: pulls every buffered batch into the channel, which in turn
//!   releases the processRecords acknowledgment
//!
//! Messages leave the channel through [`Listener::retrieve`] or
//! [`Listener::listen`]. `listen` runs at most `throttle_permits` handlers at
//! once; when every permit is taken it stops reading, the channel fills, the
//! pump blocks, and the daemon waits for its acknowledgment.

use std::future::Future;
use std::sync::Arc;

use kinetic_core::Message;
use tokio::io::{AsyncRead, AsyncWrite, Stdout};
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bridge::ProtocolBridge;
use crate::config::ListenerConfig;
use crate::error::{ListenerError, Result};

struct Tasks {
    input: JoinHandle<Result<()>>,
    pump: JoinHandle<Result<()>>,
}

pub struct Listener<W> {
    bridge: Arc<ProtocolBridge<W>>,
    receiver: Mutex<mpsc::Receiver<Message>>,
    permits: Arc<Semaphore>,
    permit_count: u32,
    drained: CancellationToken,
    tasks: Mutex<Option<Tasks>>,
}

impl Listener<Stdout> {
    /// Listener wired to this process's standard output. Pass
    /// `tokio::io::stdin()` to [`Listener::start`].
    pub fn stdio(config: &ListenerConfig) -> Result<Self> {
        let bridge = ProtocolBridge::builder(tokio::io::stdout())
            .max_line_length(config.max_line_length)
            .build();
        Self::new(Arc::new(bridge), config)
    }
}

impl<W> Listener<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Associate `bridge` with a new delivery pipeline of `queue_depth`
    /// messages.
    pub fn new(bridge: Arc<ProtocolBridge<W>>, config: &ListenerConfig) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_depth.max(1));
        bridge.associate(sender)?;

        let permit_count = u32::try_from(config.throttle_permits.max(1)).unwrap_or(u32::MAX);
        Ok(Self {
            bridge,
            receiver: Mutex::new(receiver),
            permits: Arc::new(Semaphore::new(permit_count as usize)),
            permit_count,
            drained: CancellationToken::new(),
            tasks: Mutex::new(None),
        })
    }

    pub fn bridge(&self) -> &Arc<ProtocolBridge<W>> {
        &self.bridge
    }

    /// Spawn the input and pump tasks. Cancelling `cancel` stops both; a
    /// pull already waiting on pipeline capacity finishes first.
    pub async fn start<R>(&self, reader: R, cancel: CancellationToken) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_some() {
            return Err(ListenerError::AlreadyRunning);
        }

        let bridge = self.bridge.clone();
        let input_cancel = cancel.clone();
        let input = tokio::spawn(async move {
            tokio::select! {
                _ = input_cancel.cancelled() => {
                    debug!("Input loop cancelled");
                    Ok(())
                }
                result = bridge.run(reader) => result,
            }
        });

        let bridge = self.bridge.clone();
        let drained = self.drained.clone();
        let pump = tokio::spawn(async move {
            let result = drain_bridge(&bridge, &cancel).await;
            drained.cancel();
            result
        });

        *tasks = Some(Tasks { input, pump });
        info!("Listener started");
        Ok(())
    }

    /// Next delivered message. Returns `None` once the daemon has shut down
    /// and every delivered message was retrieved.
    pub async fn retrieve(&self) -> Option<Message> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            message = receiver.recv() => message,
            _ = self.drained.cancelled() => receiver.try_recv().ok(),
        }
    }

    /// Feed delivered messages to `handler` until the daemon shuts down or
    /// `cancel` fires, with at most `throttle_permits` handlers in flight.
    /// Waits for in-flight handlers before returning the number handled.
    pub async fn listen<F, Fut>(&self, handler: F, cancel: &CancellationToken) -> Result<u64>
    where
        F: Fn(Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let mut handled = 0u64;

        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => {
                    permit.map_err(|_| ListenerError::PipelineClosed)?
                }
            };
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = self.retrieve() => message,
            };
            let Some(message) = message else {
                break;
            };

            let handler = handler.clone();
            tokio::spawn(async move {
                handler(message).await;
                drop(permit);
            });
            handled += 1;
            trace!(handled, "Dispatched message to handler");
        }

        // Every permit back means every handler has finished.
        let _all = self
            .permits
            .acquire_many(self.permit_count)
            .await
            .map_err(|_| ListenerError::PipelineClosed)?;
        debug!(handled, "Listener stopped");
        Ok(handled)
    }

    /// Wait for the input and pump tasks. Returns the first error either of
    /// them ended with.
    pub async fn wait(&self) -> Result<()> {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return Ok(());
        };
        let input = tasks.input.await?;
        let pump = tasks.pump.await?;
        input.and(pump)
    }
}

async fn drain_bridge<W>(bridge: &ProtocolBridge<W>, cancel: &CancellationToken) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = bridge.work_available() => {}
        }

        match bridge.pull_all().await {
            Ok(moved) => trace!(moved, "Pulled buffered records"),
            Err(e) => {
                warn!(error = %e, "Pump stopped");
                return Err(e);
            }
        }

        if bridge.is_finished().await {
            debug!("Bridge drained");
            return Ok(());
        }
    }
}
