//! Multilang Protocol Bridge
//!
//! Speaks the multilang handshake with an external record-delivery daemon and
//! forwards the records it delivers into a bounded delivery pipeline.
//!
//! ## Phases
//!
//! ```text
//! Uninitialized ──initialize──→ Initialized ──processRecords──→ AwaitingAck
//!                                                  ↑                 │
//!                                                  └── Active ←──────┘ (buffer drained, ack sent)
//!
//! any ──shutdown──→ ShuttingDown ──→ Terminated
//! ```
//!
//! `checkpoint` is accepted in every phase before `Terminated` and never
//! changes the phase.
//!
//! ## Ack gating
//!
//! A processRecords batch is acknowledged only after every record it carried
//! has been pulled into the pipeline. The daemon does not send another batch
//! until it sees that acknowledgment, so downstream consumption speed is the
//! only throttle on delivery.
//!
//! The record buffer, the ack-pending flag and the output writer share one
//! lock. Appending a batch, draining the buffer and emitting the ack each
//! happen inside that lock, so an ack is never written while records remain
//! buffered and two batches are never outstanding at once.
//!
//! A processRecords that arrives while an ack is pending is rejected: it is
//! logged, counted in [`ProtocolBridge::violations`], and the buffer is left
//! untouched.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use futures::{SinkExt, StreamExt};
use kinetic_core::Message;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::error::{ListenerError, Result};
use crate::protocol::{Action, ActionCodec, ActionMessage, KclRecord, StatusMessage, DEFAULT_MAX_LINE_LENGTH};

/// Outcome of a lifecycle callback.
pub type CallbackResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Lifecycle callback. Receives the action's argument: the shard id for
/// initialize, the sequence number for checkpoint, the reason for shutdown.
pub type Callback = Box<dyn Fn(Option<&str>) -> CallbackResult + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgePhase {
    Uninitialized,
    Initialized,
    Active,
    AwaitingAck,
    ShuttingDown,
    Terminated,
}

impl BridgePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgePhase::Uninitialized => "uninitialized",
            BridgePhase::Initialized => "initialized",
            BridgePhase::Active => "active",
            BridgePhase::AwaitingAck => "awaiting_ack",
            BridgePhase::ShuttingDown => "shutting_down",
            BridgePhase::Terminated => "terminated",
        }
    }
}

impl fmt::Display for BridgePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Callbacks {
    on_initialize: Option<Callback>,
    on_checkpoint: Option<Callback>,
    on_shutdown: Option<Callback>,
}

impl Callbacks {
    fn get(&self, action: Action) -> Option<&Callback> {
        match action {
            Action::Initialize => self.on_initialize.as_ref(),
            Action::Checkpoint => self.on_checkpoint.as_ref(),
            Action::Shutdown => self.on_shutdown.as_ref(),
            Action::ProcessRecords | Action::Status => None,
        }
    }
}

struct State<W> {
    buffer: VecDeque<Message>,
    ack_pending: bool,
    phase: BridgePhase,
    shard_id: Option<String>,
    writer: FramedWrite<W, ActionCodec>,
}

impl<W> State<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Write one status line. A failed write is logged only; the daemon times
    /// out and recovers on its own.
    async fn acknowledge(&mut self, action: Action, acks_sent: &AtomicU64) {
        match self.writer.send(StatusMessage::new(action)).await {
            Ok(()) => {
                acks_sent.fetch_add(1, Ordering::Relaxed);
                debug!(response_for = %action, "Sent status");
            }
            Err(e) => warn!(response_for = %action, error = %e, "Failed to write status"),
        }
    }
}

/// Builder for [`ProtocolBridge`].
pub struct BridgeBuilder<W> {
    writer: W,
    callbacks: Callbacks,
    max_line_length: usize,
}

impl<W> BridgeBuilder<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn on_initialize<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.on_initialize = Some(Box::new(f));
        self
    }

    pub fn on_checkpoint<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.on_checkpoint = Some(Box::new(f));
        self
    }

    pub fn on_shutdown<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&str>) -> CallbackResult + Send + Sync + 'static,
    {
        self.callbacks.on_shutdown = Some(Box::new(f));
        self
    }

    pub fn max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    pub fn build(self) -> ProtocolBridge<W> {
        ProtocolBridge {
            state: Mutex::new(State {
                buffer: VecDeque::new(),
                ack_pending: false,
                phase: BridgePhase::Uninitialized,
                shard_id: None,
                writer: FramedWrite::new(self.writer, ActionCodec::new()),
            }),
            pipeline: OnceLock::new(),
            callbacks: self.callbacks,
            max_line_length: self.max_line_length,
            work: Notify::new(),
            running: AtomicBool::new(false),
            input_done: AtomicBool::new(false),
            violations: AtomicU64::new(0),
            acks_sent: AtomicU64::new(0),
        }
    }
}

pub struct ProtocolBridge<W> {
    state: Mutex<State<W>>,
    pipeline: OnceLock<mpsc::Sender<Message>>,
    callbacks: Callbacks,
    max_line_length: usize,
    work: Notify,
    running: AtomicBool,
    input_done: AtomicBool,
    violations: AtomicU64,
    acks_sent: AtomicU64,
}

impl<W> ProtocolBridge<W>
where
    W: AsyncWrite + Unpin + Send,
{
    /// Start building a bridge that writes status lines to `writer`.
    pub fn builder(writer: W) -> BridgeBuilder<W> {
        BridgeBuilder {
            writer,
            callbacks: Callbacks::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }

    pub fn new(writer: W) -> Self {
        Self::builder(writer).build()
    }

    /// Attach the delivery pipeline. A bridge feeds exactly one pipeline.
    pub fn associate(&self, pipeline: mpsc::Sender<Message>) -> Result<()> {
        self.pipeline
            .set(pipeline)
            .map_err(|_| ListenerError::AlreadyAssociated)
    }

    pub fn is_associated(&self) -> bool {
        self.pipeline.get().is_some()
    }

    /// Read and handle actions from `reader` until shutdown, end of input, or
    /// a fatal error.
    ///
    /// Protocol violations and callback failures are logged and the loop
    /// continues. Malformed lines and undecodable records end it.
    pub async fn run<R>(&self, reader: R) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ListenerError::AlreadyRunning);
        }

        let mut frames = FramedRead::new(reader, ActionCodec::with_max_line_length(self.max_line_length));
        let result = loop {
            let action = match frames.next().await {
                Some(Ok(action)) => action,
                Some(Err(e)) => {
                    error!(error = %e, "Failed to read action, stopping input loop");
                    break Err(e);
                }
                None => {
                    info!("Daemon closed input");
                    break Ok(());
                }
            };

            match self.handle(action).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Fatal error handling action, stopping input loop");
                    break Err(e);
                }
                Err(e) => error!(error = %e, "Rejected action"),
            }

            if self.phase().await == BridgePhase::Terminated {
                break Ok(());
            }
        };

        self.input_done.store(true, Ordering::SeqCst);
        self.work.notify_one();
        result
    }

    /// Apply one action to the bridge.
    pub async fn handle(&self, action: ActionMessage) -> Result<()> {
        let kind = action.action();
        {
            let state = self.state.lock().await;
            if state.phase == BridgePhase::Terminated {
                self.violations.fetch_add(1, Ordering::Relaxed);
                return Err(ListenerError::ProtocolViolation(format!(
                    "{kind} received after shutdown"
                )));
            }
        }

        match action {
            ActionMessage::Initialize { shard_id } => {
                {
                    let mut state = self.state.lock().await;
                    if state.phase != BridgePhase::Uninitialized {
                        warn!(phase = %state.phase, "Repeated initialize");
                    }
                    state.shard_id = shard_id.clone();
                    if state.phase == BridgePhase::Uninitialized {
                        state.phase = BridgePhase::Initialized;
                    }
                }
                info!(shard_id = shard_id.as_deref().unwrap_or("-"), "Initialized");
                self.invoke(kind, shard_id.as_deref());
                self.acknowledge(kind).await;
                Ok(())
            }
            ActionMessage::Checkpoint { checkpoint, error } => {
                if self.state.lock().await.phase == BridgePhase::Uninitialized {
                    warn!("checkpoint received before initialize");
                }
                if let Some(error) = error.as_deref() {
                    warn!(error, "Daemon reported checkpoint error");
                }
                self.invoke(kind, checkpoint.as_deref());
                self.acknowledge(kind).await;
                Ok(())
            }
            ActionMessage::Shutdown { reason } => {
                self.state.lock().await.phase = BridgePhase::ShuttingDown;
                info!(reason = reason.as_deref().unwrap_or("-"), "Shutting down");
                self.invoke(kind, reason.as_deref());

                let mut state = self.state.lock().await;
                state.acknowledge(kind, &self.acks_sent).await;
                state.phase = BridgePhase::Terminated;
                drop(state);
                self.work.notify_one();
                Ok(())
            }
            ActionMessage::ProcessRecords { records } => self.buffer_records(records).await,
        }
    }

    async fn buffer_records(&self, records: Vec<KclRecord>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.ack_pending {
            let violations = self.violations.fetch_add(1, Ordering::Relaxed) + 1;
            error!(
                buffered = state.buffer.len(),
                rejected = records.len(),
                violations,
                "processRecords received while previous batch is unacknowledged"
            );
            return Err(ListenerError::ProtocolViolation(
                "processRecords received while an acknowledgment is pending".to_string(),
            ));
        }
        if state.phase == BridgePhase::Uninitialized {
            warn!("processRecords received before initialize");
        }

        let shard_id = state.shard_id.as_deref();
        let messages = records
            .into_iter()
            .map(|record| record.into_message(shard_id))
            .collect::<kinetic_core::Result<Vec<_>>>()?;

        debug!(count = messages.len(), "Buffered records");
        state.buffer.extend(messages);
        state.ack_pending = true;
        state.phase = BridgePhase::AwaitingAck;
        drop(state);

        self.work.notify_one();
        Ok(())
    }

    /// Move at most one buffered record into the pipeline.
    pub async fn pull_one(&self) -> Result<usize> {
        self.pull(1).await
    }

    /// Move every buffered record into the pipeline.
    pub async fn pull_all(&self) -> Result<usize> {
        self.pull(usize::MAX).await
    }

    /// Move up to `limit` records, front first, into the pipeline. Once the
    /// buffer is empty the pending processRecords acknowledgment is sent.
    ///
    /// Waits for pipeline capacity while holding the bridge lock, so a slow
    /// consumer also delays the next action from the daemon.
    pub async fn pull(&self, limit: usize) -> Result<usize> {
        let pipeline = self.pipeline.get().ok_or(ListenerError::NotAssociated)?;
        let mut state = self.state.lock().await;

        let mut moved = 0;
        while moved < limit {
            let Some(message) = state.buffer.pop_front() else {
                break;
            };
            if let Err(mpsc::error::SendError(message)) = pipeline.send(message).await {
                state.buffer.push_front(message);
                return Err(ListenerError::PipelineClosed);
            }
            moved += 1;
        }

        if state.buffer.is_empty() && state.ack_pending {
            state.acknowledge(Action::ProcessRecords, &self.acks_sent).await;
            state.ack_pending = false;
            if state.phase == BridgePhase::AwaitingAck {
                state.phase = BridgePhase::Active;
            }
        }
        Ok(moved)
    }

    /// Resolve once there may be records to pull or the input loop ended.
    pub async fn work_available(&self) {
        self.work.notified().await
    }

    /// True once the input loop has ended and nothing remains to drain.
    pub async fn is_finished(&self) -> bool {
        if !self.input_done.load(Ordering::SeqCst) && self.phase().await != BridgePhase::Terminated {
            return false;
        }
        let state = self.state.lock().await;
        state.buffer.is_empty() && !state.ack_pending
    }

    pub async fn phase(&self) -> BridgePhase {
        self.state.lock().await.phase
    }

    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    pub async fn ack_pending(&self) -> bool {
        self.state.lock().await.ack_pending
    }

    pub async fn shard_id(&self) -> Option<String> {
        self.state.lock().await.shard_id.clone()
    }

    /// processRecords actions rejected because an ack was pending.
    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub fn acks_sent(&self) -> u64 {
        self.acks_sent.load(Ordering::Relaxed)
    }

    fn invoke(&self, action: Action, argument: Option<&str>) {
        let Some(callback) = self.callbacks.get(action) else {
            return;
        };
        if let Err(e) = callback(argument) {
            let err = ListenerError::Callback {
                action,
                message: e.to_string(),
            };
            error!(error = %err, "Lifecycle callback failed");
        }
    }

    async fn acknowledge(&self, action: Action) {
        let mut state = self.state.lock().await;
        state.acknowledge(action, &self.acks_sent).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader, DuplexStream, Lines};

    fn record(key: &str, data: &str) -> KclRecord {
        KclRecord {
            data: STANDARD.encode(data),
            partition_key: Some(key.to_string()),
            sequence_number: None,
            sub_sequence_number: None,
            approximate_arrival_timestamp: None,
        }
    }

    fn records(n: usize) -> Vec<KclRecord> {
        (0..n).map(|i| record(&format!("k{i}"), &format!("r{i}"))).collect()
    }

    fn setup(
        depth: usize,
    ) -> (
        ProtocolBridge<DuplexStream>,
        mpsc::Receiver<Message>,
        Lines<BufReader<DuplexStream>>,
    ) {
        let (ours, theirs) = duplex(64 * 1024);
        let bridge = ProtocolBridge::new(ours);
        let (tx, rx) = mpsc::channel(depth);
        bridge.associate(tx).unwrap();
        (bridge, rx, BufReader::new(theirs).lines())
    }

    async fn next_status(lines: &mut Lines<BufReader<DuplexStream>>) -> StatusMessage {
        let line = lines.next_line().await.unwrap().unwrap();
        serde_json::from_str(&line).unwrap()
    }

    // ============================================================
    // Ack gating
    // ============================================================

    #[tokio::test]
    async fn test_pull_one_then_pull_all_acks_once() {
        let (bridge, mut rx, mut lines) = setup(16);
        bridge
            .handle(ActionMessage::ProcessRecords { records: records(3) })
            .await
            .unwrap();
        assert_eq!(bridge.phase().await, BridgePhase::AwaitingAck);

        assert_eq!(bridge.pull_one().await.unwrap(), 1);
        assert_eq!(bridge.buffered().await, 2);
        assert!(bridge.ack_pending().await);
        assert_eq!(bridge.acks_sent(), 0);

        assert_eq!(bridge.pull_all().await.unwrap(), 2);
        assert_eq!(bridge.buffered().await, 0);
        assert!(!bridge.ack_pending().await);
        assert_eq!(bridge.acks_sent(), 1);
        assert_eq!(bridge.phase().await, BridgePhase::Active);

        let status = next_status(&mut lines).await;
        assert_eq!(status, StatusMessage::new(Action::ProcessRecords));

        let keys: Vec<String> = (0..3).map(|_| rx.try_recv().unwrap().partition_key).collect();
        assert_eq!(keys, vec!["k0", "k1", "k2"]);
    }

    #[tokio::test]
    async fn test_pull_without_pending_batch_sends_nothing() {
        let (bridge, _rx, _lines) = setup(4);
        assert_eq!(bridge.pull_all().await.unwrap(), 0);
        assert_eq!(bridge.acks_sent(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_acked_on_next_pull() {
        let (bridge, _rx, mut lines) = setup(4);
        bridge
            .handle(ActionMessage::ProcessRecords { records: vec![] })
            .await
            .unwrap();
        assert!(bridge.ack_pending().await);

        assert_eq!(bridge.pull_one().await.unwrap(), 0);
        assert_eq!(next_status(&mut lines).await.response_for, Action::ProcessRecords);
    }

    #[tokio::test]
    async fn test_checkpoint_while_awaiting_ack_keeps_batch() {
        let (bridge, _rx, mut lines) = setup(16);
        bridge
            .handle(ActionMessage::ProcessRecords { records: records(3) })
            .await
            .unwrap();

        bridge
            .handle(ActionMessage::Checkpoint {
                checkpoint: Some("2".to_string()),
                error: None,
            })
            .await
            .unwrap();

        assert_eq!(next_status(&mut lines).await, StatusMessage::new(Action::Checkpoint));
        assert_eq!(bridge.phase().await, BridgePhase::AwaitingAck);
        assert_eq!(bridge.buffered().await, 3);
        assert!(bridge.ack_pending().await);
        assert_eq!(bridge.acks_sent(), 1);

        assert_eq!(bridge.pull_all().await.unwrap(), 3);
        assert_eq!(next_status(&mut lines).await, StatusMessage::new(Action::ProcessRecords));
    }

    #[tokio::test]
    async fn test_checkpoint_before_initialize_is_acked() {
        let (bridge, _rx, mut lines) = setup(4);
        bridge
            .handle(ActionMessage::Checkpoint {
                checkpoint: None,
                error: None,
            })
            .await
            .unwrap();

        assert_eq!(next_status(&mut lines).await.response_for, Action::Checkpoint);
        assert_eq!(bridge.phase().await, BridgePhase::Uninitialized);
    }

    // ============================================================
    // Violations
    // ============================================================

    #[tokio::test]
    async fn test_second_batch_while_pending_is_rejected() {
        let (bridge, mut rx, _lines) = setup(16);
        bridge
            .handle(ActionMessage::ProcessRecords { records: records(2) })
            .await
            .unwrap();

        let err = bridge
            .handle(ActionMessage::ProcessRecords {
                records: vec![record("intruder", "x")],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::ProtocolViolation(_)));
        assert_eq!(bridge.violations(), 1);
        assert_eq!(bridge.buffered().await, 2);

        bridge.pull_all().await.unwrap();
        assert_eq!(rx.try_recv().unwrap().partition_key, "k0");
        assert_eq!(rx.try_recv().unwrap().partition_key, "k1");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_bad_record_leaves_buffer_untouched() {
        let (bridge, _rx, _lines) = setup(16);
        let mut batch = records(2);
        batch.push(KclRecord {
            data: "%%%".to_string(),
            ..record("bad", "")
        });

        let err = bridge
            .handle(ActionMessage::ProcessRecords { records: batch })
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bridge.buffered().await, 0);
        assert!(!bridge.ack_pending().await);
    }

    // ============================================================
    // Lifecycle actions
    // ============================================================

    #[tokio::test]
    async fn test_lifecycle_actions_ack_even_when_callback_fails() {
        let (ours, theirs) = duplex(4096);
        let bridge = ProtocolBridge::builder(ours)
            .on_initialize(|_| Err("boom".into()))
            .on_checkpoint(|_| Err("boom".into()))
            .on_shutdown(|_| Err("boom".into()))
            .build();
        let mut lines = BufReader::new(theirs).lines();

        bridge
            .handle(ActionMessage::Initialize {
                shard_id: Some("shardId-000000000001".to_string()),
            })
            .await
            .unwrap();
        bridge
            .handle(ActionMessage::Checkpoint {
                checkpoint: Some("5".to_string()),
                error: None,
            })
            .await
            .unwrap();
        bridge
            .handle(ActionMessage::Shutdown { reason: None })
            .await
            .unwrap();

        assert_eq!(next_status(&mut lines).await.response_for, Action::Initialize);
        assert_eq!(next_status(&mut lines).await.response_for, Action::Checkpoint);
        assert_eq!(next_status(&mut lines).await.response_for, Action::Shutdown);
        assert_eq!(bridge.acks_sent(), 3);
        assert_eq!(bridge.phase().await, BridgePhase::Terminated);
    }

    #[tokio::test]
    async fn test_initialize_stamps_shard_id() {
        let (bridge, mut rx, _lines) = setup(4);
        bridge
            .handle(ActionMessage::Initialize {
                shard_id: Some("shardId-7".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(bridge.phase().await, BridgePhase::Initialized);

        bridge
            .handle(ActionMessage::ProcessRecords { records: records(1) })
            .await
            .unwrap();
        bridge.pull_all().await.unwrap();
        assert_eq!(rx.try_recv().unwrap().shard_id.as_deref(), Some("shardId-7"));
    }

    #[tokio::test]
    async fn test_actions_after_shutdown_are_violations() {
        let (bridge, _rx, _lines) = setup(4);
        bridge.handle(ActionMessage::Shutdown { reason: None }).await.unwrap();
        let err = bridge
            .handle(ActionMessage::Checkpoint {
                checkpoint: None,
                error: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ListenerError::ProtocolViolation(_)));
    }

    // ============================================================
    // Association
    // ============================================================

    #[tokio::test]
    async fn test_associate_twice_fails() {
        let (bridge, _rx, _lines) = setup(4);
        let (tx, _rx2) = mpsc::channel(1);
        assert!(matches!(bridge.associate(tx), Err(ListenerError::AlreadyAssociated)));
    }

    #[tokio::test]
    async fn test_pull_before_association_fails() {
        let (ours, _theirs) = duplex(64);
        let bridge = ProtocolBridge::new(ours);
        assert!(matches!(bridge.pull_all().await, Err(ListenerError::NotAssociated)));
    }

    #[tokio::test]
    async fn test_closed_pipeline_keeps_record() {
        let (bridge, rx, _lines) = setup(4);
        bridge
            .handle(ActionMessage::ProcessRecords { records: records(2) })
            .await
            .unwrap();
        drop(rx);

        assert!(matches!(bridge.pull_all().await, Err(ListenerError::PipelineClosed)));
        assert_eq!(bridge.buffered().await, 2);
        assert!(bridge.ack_pending().await);
        assert_eq!(bridge.acks_sent(), 0);
    }

    // ============================================================
    // Input loop
    // ============================================================

    #[tokio::test]
    async fn test_run_stops_on_malformed_line() {
        let (bridge, _rx, _lines) = setup(4);
        let input: &[u8] = b"{\"action\":\"initialize\"}\nnot json\n{\"action\":\"shutdown\"}\n";
        let err = bridge.run(input).await.unwrap_err();
        assert!(matches!(err, ListenerError::Parse(_)));
        assert_eq!(bridge.phase().await, BridgePhase::Initialized);
        assert!(bridge.is_finished().await);
    }

    #[tokio::test]
    async fn test_run_twice_fails() {
        let (bridge, _rx, _lines) = setup(4);
        bridge.run(&b""[..]).await.unwrap();
        assert!(matches!(bridge.run(&b""[..]).await, Err(ListenerError::AlreadyRunning)));
    }

    #[tokio::test]
    async fn test_run_continues_after_violation() {
        let (bridge, _rx, _lines) = setup(4);
        let input: &[u8] = b"{\"action\":\"processRecords\",\"records\":[]}\n\
            {\"action\":\"processRecords\",\"records\":[]}\n\
            {\"action\":\"shutdown\",\"reason\":\"TERMINATE\"}\n";
        bridge.run(input).await.unwrap();
        assert_eq!(bridge.violations(), 1);
        assert_eq!(bridge.phase().await, BridgePhase::Terminated);
    }
}
