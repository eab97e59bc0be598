//! WebSocket client for one collaborative document.
//!
//! Provides:
//! - Connection lifecycle with exponential backoff between attempts
//! - A FIFO queue for messages sent while disconnected
//! - The join / replay / version-check handshake on every (re)connect
//! - Typed inbound dispatch: raw frames are decoded once here
//!
//! ```text
//!            open                 close/error
//! Connecting ────► Connected ─────────────────► Disconnected
//!                      ▲                              │ backoff
//!                      │          open                ▼
//!                      └──────────────────────── Reconnecting
//! ```
//!
//! `Error` is terminal: reached only when `max_reconnect_attempts` runs out.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use scribe_ot::OutboundOperation;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

use crate::presence::Identity;
use crate::protocol::{CollabMessage, ProtocolError};

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    Reconnecting,
    Error,
}

/// Events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StatusChanged(ConnectionState),
    /// A decoded inbound message. Malformed and unknown messages are
    /// logged and never reach this channel.
    Message(CollabMessage),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    pub document_id: String,
    pub identity: Identity,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Messages held while disconnected.
    pub queue_capacity: usize,
}

impl ClientConfig {
    pub fn new(url: impl Into<String>, document_id: impl Into<String>, identity: Identity) -> Self {
        Self {
            url: url.into(),
            document_id: document_id.into(),
            identity,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_reconnect_attempts: None,
            queue_capacity: 10_000,
        }
    }
}

/// Exponential backoff: initial, 2x, 4x, ... capped at `max`.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial.min(max),
            attempts: 0,
        }
    }

    /// Delay before the next attempt.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        self.attempts += 1;
        delay
    }

    /// Start over after a successful connection.
    pub fn reset(&mut self) {
        self.current = self.initial.min(self.max);
        self.attempts = 0;
    }

    /// Delays handed out since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// Outbound messages waiting for a connection.
///
/// Strictly FIFO. A presence update supersedes a queued one of the same
/// kind. A text change is never merged or dropped, but a resend of a queued
/// one (same client id and sequence number) takes its place instead of
/// queueing a second copy.
#[derive(Debug)]
pub struct OperationQueue {
    queue: VecDeque<CollabMessage>,
    capacity: usize,
}

impl OperationQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a message.
    ///
    /// Fails with [`ProtocolError::QueueFull`] only for presence updates;
    /// a text change evicts the oldest presence update instead, or grows
    /// the queue past capacity when there is none.
    pub fn push(&mut self, msg: CollabMessage) -> Result<(), ProtocolError> {
        if let Some(at) = self.position_of_resend(&msg) {
            log::debug!("replacing queued {} with its resend", msg.kind());
            self.queue[at] = msg;
            return Ok(());
        }
        if msg.is_presence() {
            let kind = msg.kind();
            self.queue.retain(|queued| queued.kind() != kind);
        }

        if self.queue.len() >= self.capacity {
            if let Some(at) = self.queue.iter().position(CollabMessage::is_presence) {
                self.queue.remove(at);
            } else if msg.is_presence() {
                log::warn!("operation queue full, dropping {}", msg.kind());
                return Err(ProtocolError::QueueFull);
            } else {
                log::warn!(
                    "operation queue over capacity ({}), keeping {}",
                    self.capacity,
                    msg.kind()
                );
            }
        }

        self.queue.push_back(msg);
        Ok(())
    }

    /// Put messages that never reached the socket back at the front, in
    /// their original order. Anything queued since supersedes them.
    pub fn restore(&mut self, unsent: Vec<CollabMessage>) {
        for msg in unsent.into_iter().rev() {
            let superseded = self.position_of_resend(&msg).is_some()
                || (msg.is_presence() && self.queue.iter().any(|queued| queued.kind() == msg.kind()));
            if superseded {
                continue;
            }
            self.queue.push_front(msg);
        }
    }

    fn position_of_resend(&self, msg: &CollabMessage) -> Option<usize> {
        match msg {
            CollabMessage::TextChange {
                client_id: Some(client_id),
                op_seq,
                ..
            } if *op_seq != 0 => self.queue.iter().position(|queued| {
                matches!(
                    queued,
                    CollabMessage::TextChange { client_id: Some(c), op_seq: s, .. }
                        if c == client_id && s == op_seq
                )
            }),
            CollabMessage::ResyncRequest => self
                .queue
                .iter()
                .position(|queued| *queued == CollabMessage::ResyncRequest),
            _ => None,
        }
    }

    /// Remove every queued message, oldest first.
    pub fn drain(&mut self) -> Vec<CollabMessage> {
        self.queue.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollabMessage> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

struct ClientShared {
    state: ConnectionState,
    queue: OperationQueue,
    /// Feeds the socket writer while connected.
    outgoing: Option<mpsc::UnboundedSender<CollabMessage>>,
}

/// State shared between the handle and the connection task.
struct ClientContext {
    config: ClientConfig,
    client_id: Uuid,
    shared: Mutex<ClientShared>,
    known_version: AtomicU64,
    event_tx: mpsc::Sender<ClientEvent>,
    wake: Notify,
}

impl ClientContext {
    async fn set_state(&self, state: ConnectionState) {
        let changed = {
            let mut shared = self.shared.lock().await;
            let changed = shared.state != state;
            shared.state = state;
            changed
        };
        if changed {
            log::info!("doc {}: connection {:?}", self.config.document_id, state);
            let _ = self.event_tx.send(ClientEvent::StatusChanged(state)).await;
        }
    }

    fn join_message(&self) -> CollabMessage {
        let identity = &self.config.identity;
        CollabMessage::UserJoin {
            user_id: identity.user_id.clone(),
            user_name: Some(identity.user_name.clone()),
            color: Some(identity.color.clone()),
            client_id: Some(self.client_id),
            document_id: Some(self.config.document_id.clone()),
        }
    }

    /// Reconnect loop. Runs until shutdown or until attempts run out.
    async fn supervise(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut backoff = Backoff::new(self.config.initial_backoff, self.config.max_backoff);
        let mut state = ConnectionState::Connecting;

        loop {
            self.set_state(state).await;

            let attempt = tokio::select! {
                attempt = tokio_tungstenite::connect_async(self.config.url.as_str()) => attempt,
                _ = shutdown.changed() => break,
            };

            match attempt {
                Ok((ws, _)) => {
                    backoff.reset();
                    let stopped = self.run_connection(ws, &mut shutdown).await;
                    self.set_state(ConnectionState::Disconnected).await;
                    if stopped {
                        return;
                    }
                }
                Err(e) => {
                    log::warn!("connect to {} failed: {e}", self.config.url);
                    self.set_state(ConnectionState::Disconnected).await;
                }
            }

            if let Some(max) = self.config.max_reconnect_attempts {
                if backoff.attempts() >= max {
                    log::error!(
                        "doc {}: giving up after {max} reconnect attempts",
                        self.config.document_id
                    );
                    self.set_state(ConnectionState::Error).await;
                    return;
                }
            }

            let delay = backoff.next_delay();
            log::debug!("reconnecting to {} in {delay:?}", self.config.url);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.wake.notified() => log::debug!("reconnect requested, skipping backoff"),
                _ = shutdown.changed() => break,
            }
            state = ConnectionState::Reconnecting;
        }

        self.set_state(ConnectionState::Disconnected).await;
    }

    /// Drive one open socket. Returns `true` when stopped by shutdown.
    async fn run_connection(
        &self,
        ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        let (mut writer, mut reader) = ws.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<CollabMessage>();

        // Handshake under the lock so no send can slip in between.
        {
            let mut shared = self.shared.lock().await;
            let queued = shared.queue.drain();
            let version = self.known_version.load(Ordering::Acquire);
            let handshake = std::iter::once(self.join_message())
                .chain(queued.iter().cloned())
                .chain(std::iter::once(CollabMessage::VersionCheck { version }));
            for msg in handshake {
                let _ = out_tx.send(msg);
            }
            if !queued.is_empty() {
                log::info!(
                    "doc {}: replaying {} queued messages",
                    self.config.document_id,
                    queued.len()
                );
            }
            shared.outgoing = Some(out_tx);
        }
        self.set_state(ConnectionState::Connected).await;

        let stopped = loop {
            tokio::select! {
                outgoing = out_rx.recv() => {
                    let Some(msg) = outgoing else { break false };
                    let text = match msg.encode() {
                        Ok(text) => text,
                        Err(e) => {
                            log::error!("dropping unencodable {}: {e}", msg.kind());
                            continue;
                        }
                    };
                    if let Err(e) = writer.send(Message::Text(text.into())).await {
                        log::warn!("send failed: {e}");
                        break false;
                    }
                }
                incoming = reader.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.dispatch(text.as_str()).await,
                    Some(Ok(Message::Binary(_))) => {
                        log::warn!("dropping binary frame");
                    }
                    Some(Ok(Message::Close(_))) | None => break false,
                    Some(Err(e)) => {
                        log::warn!("socket error: {e}");
                        break false;
                    }
                    Some(Ok(_)) => {}
                },
                _ = shutdown.changed() => {
                    let _ = writer.send(Message::Close(None)).await;
                    break true;
                }
            }
        };

        let mut shared = self.shared.lock().await;
        shared.outgoing = None;
        // The next handshake sends a fresh join and version check.
        let unsent: Vec<CollabMessage> = std::iter::from_fn(|| out_rx.try_recv().ok())
            .filter(|msg| {
                !matches!(
                    msg,
                    CollabMessage::UserJoin { .. } | CollabMessage::VersionCheck { .. }
                )
            })
            .collect();
        if !unsent.is_empty() {
            log::info!(
                "doc {}: requeueing {} unsent messages",
                self.config.document_id,
                unsent.len()
            );
            shared.queue.restore(unsent);
        }
        stopped
    }

    async fn dispatch(&self, raw: &str) {
        match CollabMessage::decode(raw) {
            Ok(CollabMessage::Unknown) => {
                log::warn!("dropping message of unknown type: {raw}");
            }
            Ok(msg) => {
                log::trace!("received {}", msg.kind());
                let _ = self.event_tx.send(ClientEvent::Message(msg)).await;
            }
            Err(e) => log::warn!("dropping {e}"),
        }
    }
}

/// Collaboration client for one document.
///
/// Sends go straight to the socket while connected and into the
/// [`OperationQueue`] otherwise; neither case blocks on the network.
pub struct CollabClient {
    ctx: Arc<ClientContext>,
    event_rx: Option<mpsc::Receiver<ClientEvent>>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl CollabClient {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown, _) = watch::channel(false);
        let queue = OperationQueue::new(config.queue_capacity);
        Self {
            ctx: Arc::new(ClientContext {
                config,
                client_id: Uuid::new_v4(),
                shared: Mutex::new(ClientShared {
                    state: ConnectionState::Disconnected,
                    queue,
                    outgoing: None,
                }),
                known_version: AtomicU64::new(0),
                event_tx,
                wake: Notify::new(),
            }),
            event_rx: Some(event_rx),
            shutdown,
            task: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.event_rx.take()
    }

    /// Start the connection task. Returns once the task is running; the
    /// outcome of each attempt arrives as [`ClientEvent::StatusChanged`].
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        let url = &self.ctx.config.url;
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ProtocolError::InvalidUrl(url.clone()));
        }
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        self.shutdown.send_replace(false);
        let ctx = self.ctx.clone();
        let shutdown = self.shutdown.subscribe();
        self.task = Some(tokio::spawn(ctx.supervise(shutdown)));
        Ok(())
    }

    /// Connect now instead of waiting out the backoff.
    ///
    /// No-op while connected or connecting. Restarts the connection task
    /// after it gave up.
    pub async fn reconnect(&mut self) -> Result<(), ProtocolError> {
        match self.connection_state().await {
            ConnectionState::Connected | ConnectionState::Connecting => Ok(()),
            _ if self.task.as_ref().is_some_and(|task| !task.is_finished()) => {
                self.ctx.wake.notify_one();
                Ok(())
            }
            _ => self.connect(),
        }
    }

    /// Stop the connection task and close the socket. Idempotent.
    pub async fn close(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        self.shutdown.send_replace(true);
        if tokio::time::timeout(Duration::from_secs(1), &mut task).await.is_err() {
            log::warn!("connection task did not stop in time, aborting");
            task.abort();
        }
        let mut shared = self.ctx.shared.lock().await;
        shared.outgoing = None;
        shared.state = ConnectionState::Disconnected;
    }

    /// Send a message now if connected, otherwise queue it.
    ///
    /// Messages handed to a socket that closes before writing them return
    /// to the queue.
    pub async fn send(&self, msg: CollabMessage) -> Result<(), ProtocolError> {
        let mut shared = self.ctx.shared.lock().await;
        let msg = match &shared.outgoing {
            Some(tx) => match tx.send(msg) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(msg)) => msg,
            },
            None => msg,
        };
        log::trace!("queueing {}", msg.kind());
        shared.queue.push(msg)
    }

    /// Send a local operation as a `text-change`.
    pub async fn send_operation(&self, outbound: &OutboundOperation) -> Result<(), ProtocolError> {
        self.send(CollabMessage::TextChange {
            user_id: self.ctx.config.identity.user_id.clone(),
            client_id: Some(self.ctx.client_id),
            op_seq: outbound.seq,
            version: outbound.base_version,
            op: outbound.operation.clone(),
        })
        .await
    }

    /// The last server version the document has seen; sent in the
    /// version check after every reconnect.
    pub fn set_known_version(&self, version: u64) {
        self.ctx.known_version.store(version, Ordering::Release);
    }

    pub fn known_version(&self) -> u64 {
        self.ctx.known_version.load(Ordering::Acquire)
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.ctx.shared.lock().await.state
    }

    pub async fn queued_len(&self) -> usize {
        self.ctx.shared.lock().await.queue.len()
    }

    /// Snapshot of the queued messages, oldest first.
    pub async fn queued_messages(&self) -> Vec<CollabMessage> {
        self.ctx.shared.lock().await.queue.iter().cloned().collect()
    }

    /// Per-client id carried by every text change.
    pub fn client_id(&self) -> Uuid {
        self.ctx.client_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }
}

impl Drop for CollabClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_ot::Operation;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::new(url, "doc", Identity::new("u1", "Ada"))
    }

    fn cursor_at(column: u32) -> CollabMessage {
        CollabMessage::CursorChange {
            user_id: "u1".into(),
            user_name: "Ada".into(),
            color: "#000000".into(),
            position: crate::protocol::CursorPosition::new(1, column),
        }
    }

    fn outbound(seq: u64) -> OutboundOperation {
        OutboundOperation {
            seq,
            base_version: 0,
            operation: Operation::builder().insert("x").build(),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
        assert_eq!(backoff.attempts(), 7);

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_queue_is_fifo() {
        let mut queue = OperationQueue::new(100);
        for seq in 1..=3 {
            queue
                .push(CollabMessage::Ack { version: seq, op_seq: seq })
                .unwrap();
        }
        let drained = queue.drain();
        let order: Vec<u64> = drained
            .iter()
            .map(|m| match m {
                CollabMessage::Ack { op_seq, .. } => *op_seq,
                _ => 0,
            })
            .collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_coalesces_presence() {
        let mut queue = OperationQueue::new(100);
        queue.push(cursor_at(1)).unwrap();
        queue.push(CollabMessage::VersionCheck { version: 1 }).unwrap();
        queue.push(cursor_at(9)).unwrap();

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0], CollabMessage::VersionCheck { version: 1 });
        assert_eq!(drained[1], cursor_at(9));
    }

    #[test]
    fn test_queue_capacity_rejects_presence_keeps_edits() {
        let mut queue = OperationQueue::new(2);
        queue.push(CollabMessage::ResyncRequest).unwrap();
        queue.push(CollabMessage::VersionCheck { version: 0 }).unwrap();

        assert_eq!(queue.push(cursor_at(1)), Err(ProtocolError::QueueFull));

        let edit = CollabMessage::TextChange {
            user_id: "u1".into(),
            client_id: None,
            op_seq: 1,
            version: 0,
            op: Operation::builder().insert("a").build(),
        };
        queue.push(edit.clone()).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.iter().last(), Some(&edit));
    }

    #[test]
    fn test_queue_full_evicts_oldest_presence() {
        let mut queue = OperationQueue::new(2);
        queue.push(cursor_at(1)).unwrap();
        queue.push(CollabMessage::ResyncRequest).unwrap();
        queue
            .push(CollabMessage::TypingIndicator {
                user_id: "u1".into(),
                is_typing: true,
            })
            .unwrap();

        let kinds: Vec<_> = queue.iter().map(CollabMessage::kind).collect();
        assert_eq!(kinds, vec!["resync-request", "typing-indicator"]);
    }

    fn resend(seq: u64, version: u64) -> CollabMessage {
        CollabMessage::TextChange {
            user_id: "u1".into(),
            client_id: Some(Uuid::nil()),
            op_seq: seq,
            version,
            op: Operation::builder().insert("x").build(),
        }
    }

    #[test]
    fn test_queue_replaces_resent_text_change() {
        let mut queue = OperationQueue::new(100);
        queue.push(resend(1, 0)).unwrap();
        queue.push(cursor_at(1)).unwrap();
        for _ in 0..5 {
            queue.push(resend(1, 3)).unwrap();
        }
        queue.push(CollabMessage::ResyncRequest).unwrap();
        queue.push(CollabMessage::ResyncRequest).unwrap();

        let drained = queue.drain();
        assert_eq!(drained, vec![resend(1, 3), cursor_at(1), CollabMessage::ResyncRequest]);
    }

    #[test]
    fn test_queue_restore_puts_unsent_first() {
        let mut queue = OperationQueue::new(100);
        queue.push(resend(2, 1)).unwrap();
        queue.push(cursor_at(7)).unwrap();

        queue.restore(vec![
            resend(1, 0),
            CollabMessage::ResyncRequest,
            cursor_at(3),
            resend(2, 0),
        ]);

        // The stale cursor and the older copy of seq 2 give way.
        let drained = queue.drain();
        assert_eq!(
            drained,
            vec![resend(1, 0), CollabMessage::ResyncRequest, resend(2, 1), cursor_at(7)]
        );
    }

    #[tokio::test]
    async fn test_client_initial_state() {
        let client = CollabClient::new(config("ws://127.0.0.1:9"));
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
        assert_eq!(client.queued_len().await, 0);
        assert_eq!(client.known_version(), 0);
    }

    #[tokio::test]
    async fn test_send_while_disconnected_queues() {
        let client = CollabClient::new(config("ws://127.0.0.1:9"));
        client.send_operation(&outbound(1)).await.unwrap();
        client.send_operation(&outbound(2)).await.unwrap();

        let queued = client.queued_messages().await;
        assert_eq!(queued.len(), 2);
        match &queued[0] {
            CollabMessage::TextChange {
                client_id, op_seq, user_id, ..
            } => {
                assert_eq!(*client_id, Some(client.client_id()));
                assert_eq!(*op_seq, 1);
                assert_eq!(user_id, "u1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let mut client = CollabClient::new(config("http://localhost"));
        assert!(matches!(client.connect(), Err(ProtocolError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn test_take_event_rx_once() {
        let mut client = CollabClient::new(config("ws://127.0.0.1:9"));
        assert!(client.take_event_rx().is_some());
        assert!(client.take_event_rx().is_none());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let mut cfg = config("ws://127.0.0.1:1");
        cfg.initial_backoff = Duration::from_millis(5);
        cfg.max_reconnect_attempts = Some(2);
        let mut client = CollabClient::new(cfg);
        let mut events = client.take_event_rx().unwrap();
        client.connect().unwrap();

        let mut last = None;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            if let ClientEvent::StatusChanged(state) = event {
                last = Some(state);
                if state == ConnectionState::Error {
                    break;
                }
            }
        }
        assert_eq!(last, Some(ConnectionState::Error));
        assert_eq!(client.connection_state().await, ConnectionState::Error);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut cfg = config("ws://127.0.0.1:1");
        cfg.initial_backoff = Duration::from_millis(5);
        let mut client = CollabClient::new(cfg);
        client.close().await;
        client.connect().unwrap();
        client.close().await;
        client.close().await;
        assert_eq!(client.connection_state().await, ConnectionState::Disconnected);
    }
}
