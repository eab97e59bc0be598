//! WebSocket relay server with per-document rooms.
//!
//! ```text
//! Client A ──┐
//!             ├── DocumentRoom (doc id) ── RoomState (text, version, history)
//! Client B ──┘          │
//!                       └── broadcast ──► every connection in the room
//! ```
//!
//! Each connection tracks the last version it delivered to its client.
//! A connection starts unsynced: its first `version-check` or `text-change`
//! replays the history the client is missing (or sends a snapshot when
//! history no longer covers it). From then on operations are forwarded
//! from the room broadcast; the author receives an `ack` instead of its own
//! operation.
//!
//! Documents live in memory for the lifetime of the server.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::broadcast::{ApplyOutcome, DocumentRoom, RoomEvent, RoomManager};
use crate::protocol::CollabMessage;

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;

/// Relay configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    /// Broadcast channel capacity per room.
    pub broadcast_capacity: usize,
    /// Operations retained per document for catch-up and rebasing.
    pub max_history: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            max_history: 10_000,
        }
    }
}

/// Relay statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub malformed_messages: u64,
}

/// The relay server.
pub struct RelayServer {
    config: RelayConfig,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<RelayStats>>,
    shutdown: watch::Sender<bool>,
}

impl RelayServer {
    pub fn new(config: RelayConfig) -> Self {
        let rooms = Arc::new(RoomManager::new(config.broadcast_capacity, config.max_history));
        Self::with_rooms(config, rooms)
    }

    pub fn with_defaults() -> Self {
        Self::new(RelayConfig::default())
    }

    /// Serve existing rooms, e.g. across a restart of the listener.
    pub fn with_rooms(config: RelayConfig, rooms: Arc<RoomManager>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            config,
            rooms,
            stats: Arc::new(RwLock::new(RelayStats::default())),
            shutdown,
        }
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("relay listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        let mut shutdown = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    log::debug!("new TCP connection from {addr}");
                    let rooms = self.rooms.clone();
                    let stats = self.stats.clone();
                    let shutdown = self.shutdown.subscribe();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, addr, rooms, stats, shutdown).await {
                            log::error!("connection error from {addr}: {e}");
                        }
                    });
                }
                _ = shutdown.changed() => {
                    log::info!("relay on {} shutting down", self.config.bind_addr);
                    return Ok(());
                }
            }
        }
    }

    /// Stop accepting and close every open connection.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub async fn stats(&self) -> RelayStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn rooms(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<RelayStats>>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    log::info!("WebSocket connection established from {addr}");
    {
        let mut s = stats.write().await;
        s.total_connections += 1;
        s.active_connections += 1;
    }

    let mut connection = Connection::new(addr, rooms, stats.clone());
    let result = connection.serve(ws, shutdown).await;
    connection.leave().await;

    stats.write().await.active_connections -= 1;
    log::info!("connection from {addr} closed");
    result
}

/// Per-connection relay state.
struct Connection {
    id: Uuid,
    addr: SocketAddr,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<RelayStats>>,
    room: Option<Arc<DocumentRoom>>,
    events: Option<broadcast::Receiver<RoomEvent>>,
    client_id: Option<Uuid>,
    synced: bool,
    /// Highest version this client has been sent.
    delivered: u64,
}

async fn next_event(events: &mut Option<broadcast::Receiver<RoomEvent>>) -> Result<RoomEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Connection {
    fn new(addr: SocketAddr, rooms: Arc<RoomManager>, stats: Arc<RwLock<RelayStats>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr,
            rooms,
            stats,
            room: None,
            events: None,
            client_id: None,
            synced: false,
            delivered: 0,
        }
    }

    async fn serve(
        &mut self,
        ws: WebSocketStream<TcpStream>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), BoxError> {
        let (mut sink, mut source) = ws.split();

        loop {
            tokio::select! {
                frame = source.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.stats.write().await.total_messages += 1;
                        match CollabMessage::decode(text.as_str()) {
                            Ok(msg) => self.handle_message(msg, &mut sink).await?,
                            Err(e) => {
                                log::warn!("dropping {e} from {}", self.addr);
                                self.stats.write().await.malformed_messages += 1;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => sink.send(Message::Pong(data)).await?,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => {
                        log::warn!("WebSocket error from {}: {e}", self.addr);
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                },
                event = next_event(&mut self.events) => match event {
                    Ok(event) => self.forward(event, &mut sink).await?,
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("connection {} lagged by {n} events", self.addr);
                        if self.synced {
                            self.catch_up(self.delivered, &mut sink).await?;
                        }
                    }
                    Err(RecvError::Closed) => return Ok(()),
                },
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_message(&mut self, msg: CollabMessage, sink: &mut WsSink) -> Result<(), BoxError> {
        if let CollabMessage::UserJoin { .. } = msg {
            return self.join(msg, sink).await;
        }
        let Some(room) = self.room.clone() else {
            log::warn!("{} from {} before user-join", msg.kind(), self.addr);
            return Ok(());
        };

        match &msg {
            CollabMessage::TextChange {
                user_id,
                client_id,
                op_seq,
                version,
                op,
            } => {
                // The client builds on `version`; if that cannot be caught
                // up, it gets a snapshot and drops the operation itself.
                if !self.synced && !self.catch_up(*version, sink).await? {
                    return Ok(());
                }
                match room.submit(user_id, *client_id, *op_seq, *version, op).await {
                    Ok(ApplyOutcome::Applied(entry)) => {
                        log::debug!("doc {}: v{} from {user_id}", room.document_id(), entry.version);
                    }
                    Ok(ApplyOutcome::Duplicate { op_seq }) => {
                        log::debug!("doc {}: duplicate seq {op_seq} from {user_id}", room.document_id());
                    }
                    Err(e) => {
                        log::warn!("doc {}: rejecting text-change from {user_id}: {e}", room.document_id());
                        self.send_snapshot(&room, sink).await?;
                    }
                }
            }
            CollabMessage::CursorChange { .. }
            | CollabMessage::SelectionChange { .. }
            | CollabMessage::TypingIndicator { .. } => {
                room.publish_presence(self.id, &msg);
            }
            CollabMessage::VersionCheck { version } => {
                if self.synced {
                    log::debug!("{} already synced at v{}", self.addr, self.delivered);
                } else {
                    self.catch_up(*version, sink).await?;
                }
            }
            CollabMessage::ResyncRequest => {
                log::info!("doc {}: resync requested by {}", room.document_id(), self.addr);
                self.send_snapshot(&room, sink).await?;
            }
            other => log::debug!("ignoring {} from {}", other.kind(), self.addr),
        }
        Ok(())
    }

    async fn join(&mut self, msg: CollabMessage, sink: &mut WsSink) -> Result<(), BoxError> {
        let CollabMessage::UserJoin {
            user_id,
            client_id,
            document_id,
            ..
        } = &msg
        else {
            return Ok(());
        };
        if self.room.is_some() {
            log::debug!("{} joined twice, ignoring", self.addr);
            return Ok(());
        }

        let document_id = document_id.as_deref().unwrap_or("default");
        let room = self.rooms.get_or_create(document_id).await;
        self.events = Some(room.subscribe());
        self.client_id = *client_id;

        let roster = room.join(self.id, msg.clone()).await;
        room.publish_presence(self.id, &msg);
        log::info!("{user_id} joined doc {document_id} from {}", self.addr);
        self.room = Some(room);

        for existing in &roster {
            send(sink, existing).await?;
        }
        Ok(())
    }

    /// Send everything after `from`. Returns `false` when a snapshot had to
    /// be sent instead.
    async fn catch_up(&mut self, from: u64, sink: &mut WsSink) -> Result<bool, BoxError> {
        let Some(room) = self.room.clone() else {
            return Ok(false);
        };
        let (entries, current) = {
            let state = room.state().await;
            (state.entries_after(from), state.version())
        };
        let Some(entries) = entries else {
            log::info!(
                "doc {}: history does not cover v{from} for {}, sending snapshot",
                room.document_id(),
                self.addr
            );
            self.send_snapshot(&room, sink).await?;
            return Ok(false);
        };

        if !entries.is_empty() {
            log::debug!("catching up {} with {} operations", self.addr, entries.len());
        }
        for entry in &entries {
            send(sink, &entry.to_message()).await?;
        }
        self.delivered = current;
        self.synced = true;
        Ok(true)
    }

    async fn send_snapshot(&mut self, room: &DocumentRoom, sink: &mut WsSink) -> Result<(), BoxError> {
        let snapshot = room.state().await.snapshot();
        if let CollabMessage::Snapshot { version, .. } = &snapshot {
            self.delivered = *version;
        }
        self.synced = true;
        send(sink, &snapshot).await
    }

    async fn forward(&mut self, event: RoomEvent, sink: &mut WsSink) -> Result<(), BoxError> {
        match event {
            RoomEvent::Operation(entry) => {
                if !self.synced || entry.version <= self.delivered {
                    return Ok(());
                }
                if entry.version > self.delivered + 1 {
                    self.catch_up(self.delivered, sink).await?;
                    return Ok(());
                }
                let own = entry.client_id.is_some() && entry.client_id == self.client_id;
                let msg = if own {
                    CollabMessage::Ack {
                        version: entry.version,
                        op_seq: entry.op_seq,
                    }
                } else {
                    entry.to_message()
                };
                send(sink, &msg).await?;
                self.delivered = entry.version;
            }
            RoomEvent::Presence { origin, payload } => {
                if origin != self.id {
                    sink.send(Message::Text(payload.as_str().to_owned().into())).await?;
                }
            }
        }
        Ok(())
    }

    async fn leave(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        if let Some(CollabMessage::UserJoin {
            user_id,
            user_name,
            color,
            ..
        }) = room.leave(&self.id).await
        {
            log::info!("{user_id} left doc {}", room.document_id());
            room.publish_presence(
                self.id,
                &CollabMessage::UserLeave {
                    user_id,
                    user_name,
                    color,
                },
            );
        }
    }
}

async fn send(sink: &mut WsSink, msg: &CollabMessage) -> Result<(), BoxError> {
    let encoded = msg.encode()?;
    sink.send(Message::Text(encoded.into())).await?;
    Ok(())
}
