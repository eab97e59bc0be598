//! Per-document rooms for the relay: authoritative text, operation
//! history, and fan-out to every connection in the room.
//!
//! Each room owns a tokio broadcast channel. Operations are published while
//! the room state lock is held, so every receiver sees them in version order.
//! A receiver that lags behind catches up from the retained history.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use scribe_ot::{apply, transform, Operation, OtError, Priority};
use tokio::sync::{broadcast, Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::protocol::CollabMessage;

/// One applied operation, as retained in history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Version the operation produced.
    pub version: u64,
    pub user_id: String,
    pub client_id: Option<Uuid>,
    pub op_seq: u64,
    pub op: Operation,
}

impl HistoryEntry {
    /// The `text-change` every other participant receives.
    pub fn to_message(&self) -> CollabMessage {
        CollabMessage::TextChange {
            user_id: self.user_id.clone(),
            client_id: self.client_id,
            op_seq: self.op_seq,
            version: self.version,
            op: self.op.clone(),
        }
    }
}

/// Result of submitting an operation to a room.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(Arc<HistoryEntry>),
    /// The author already submitted this sequence number.
    Duplicate { op_seq: u64 },
}

/// Room-side failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomError {
    #[error("base version {base} is ahead of the document (v{current})")]
    FutureBase { base: u64, current: u64 },
    #[error("base version {base} is older than retained history (oldest v{oldest})")]
    StaleBase { base: u64, oldest: u64 },
    #[error(transparent)]
    Ot(#[from] OtError),
}

/// Authoritative state of one document.
#[derive(Debug)]
pub struct RoomState {
    text: String,
    version: u64,
    history: VecDeque<Arc<HistoryEntry>>,
    max_history: usize,
    /// Highest sequence number applied per client.
    last_seq: FxHashMap<Uuid, u64>,
}

impl RoomState {
    pub fn new(max_history: usize) -> Self {
        Self::with_text(String::new(), 0, max_history)
    }

    pub fn with_text(text: impl Into<String>, version: u64, max_history: usize) -> Self {
        Self {
            text: text.into(),
            version,
            history: VecDeque::new(),
            max_history: max_history.max(1),
            last_seq: FxHashMap::default(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Oldest base version history can still rebase from.
    pub fn oldest_base(&self) -> u64 {
        self.version - self.history.len() as u64
    }

    /// Rebase an operation built against `base_version` onto the current
    /// text and apply it.
    ///
    /// The incoming operation wins insert ties against history, matching
    /// clients, which give their pending operations the same priority.
    pub fn apply_client_operation(
        &mut self,
        user_id: &str,
        client_id: Option<Uuid>,
        op_seq: u64,
        base_version: u64,
        op: &Operation,
    ) -> Result<ApplyOutcome, RoomError> {
        if let Some(client_id) = client_id {
            let seen = self.last_seq.get(&client_id).copied().unwrap_or(0);
            if op_seq != 0 && op_seq <= seen {
                return Ok(ApplyOutcome::Duplicate { op_seq });
            }
        }
        if base_version > self.version {
            return Err(RoomError::FutureBase {
                base: base_version,
                current: self.version,
            });
        }
        let oldest = self.oldest_base();
        if base_version < oldest {
            return Err(RoomError::StaleBase {
                base: base_version,
                oldest,
            });
        }

        let skip = (base_version - oldest) as usize;
        let mut rebased = op.clone();
        for entry in self.history.iter().skip(skip) {
            rebased = transform(&rebased, &entry.op, Priority::Left)?.0;
        }
        self.text = apply(&self.text, &rebased)?;
        self.version += 1;

        if let Some(client_id) = client_id {
            self.last_seq.insert(client_id, op_seq);
        }
        let entry = Arc::new(HistoryEntry {
            version: self.version,
            user_id: user_id.to_owned(),
            client_id,
            op_seq,
            op: rebased,
        });
        self.history.push_back(entry.clone());
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
        Ok(ApplyOutcome::Applied(entry))
    }

    /// Entries after `version`, or `None` when history no longer reaches
    /// back that far or `version` is in the future.
    pub fn entries_after(&self, version: u64) -> Option<Vec<Arc<HistoryEntry>>> {
        if version > self.version || version < self.oldest_base() {
            return None;
        }
        let skip = (version - self.oldest_base()) as usize;
        Some(self.history.iter().skip(skip).cloned().collect())
    }

    pub fn snapshot(&self) -> CollabMessage {
        CollabMessage::Snapshot {
            version: self.version,
            text: self.text.clone(),
        }
    }
}

/// What travels over a room's broadcast channel.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    Operation(Arc<HistoryEntry>),
    /// A pre-encoded presence message from connection `origin`.
    Presence { origin: Uuid, payload: Arc<String> },
}

/// Broadcast statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomStats {
    pub operations: u64,
    pub presence_messages: u64,
    pub participants: usize,
}

/// A document room: state, participants and fan-out.
pub struct DocumentRoom {
    document_id: String,
    state: Mutex<RoomState>,
    sender: broadcast::Sender<RoomEvent>,
    /// The `user-join` each connection announced itself with.
    participants: RwLock<FxHashMap<Uuid, CollabMessage>>,
    operations: AtomicU64,
    presence_messages: AtomicU64,
}

impl DocumentRoom {
    pub fn new(document_id: impl Into<String>, capacity: usize, max_history: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            document_id: document_id.into(),
            state: Mutex::new(RoomState::new(max_history)),
            sender,
            participants: RwLock::new(FxHashMap::default()),
            operations: AtomicU64::new(0),
            presence_messages: AtomicU64::new(0),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomEvent> {
        self.sender.subscribe()
    }

    /// Lock the room state. Hold it only for synchronous work.
    pub async fn state(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().await
    }

    /// Apply an operation and publish it in version order.
    pub async fn submit(
        &self,
        user_id: &str,
        client_id: Option<Uuid>,
        op_seq: u64,
        base_version: u64,
        op: &Operation,
    ) -> Result<ApplyOutcome, RoomError> {
        let mut state = self.state.lock().await;
        let outcome = state.apply_client_operation(user_id, client_id, op_seq, base_version, op)?;
        if let ApplyOutcome::Applied(entry) = &outcome {
            self.operations.fetch_add(1, Ordering::Relaxed);
            // No receivers is fine: the entry stays in history.
            let _ = self.sender.send(RoomEvent::Operation(entry.clone()));
        }
        Ok(outcome)
    }

    /// Fan a presence message out to every other connection.
    pub fn publish_presence(&self, origin: Uuid, msg: &CollabMessage) -> usize {
        let payload = match msg.encode() {
            Ok(payload) => Arc::new(payload),
            Err(e) => {
                log::error!("could not encode {}: {e}", msg.kind());
                return 0;
            }
        };
        self.presence_messages.fetch_add(1, Ordering::Relaxed);
        self.sender
            .send(RoomEvent::Presence { origin, payload })
            .unwrap_or(0)
    }

    /// Register a connection's `user-join`; returns the existing roster.
    pub async fn join(&self, connection: Uuid, join: CollabMessage) -> Vec<CollabMessage> {
        let mut participants = self.participants.write().await;
        let roster = participants.values().cloned().collect();
        participants.insert(connection, join);
        roster
    }

    /// Forget a connection; returns its `user-join` if it had joined.
    pub async fn leave(&self, connection: &Uuid) -> Option<CollabMessage> {
        self.participants.write().await.remove(connection)
    }

    pub async fn participant_count(&self) -> usize {
        self.participants.read().await.len()
    }

    pub async fn stats(&self) -> RoomStats {
        RoomStats {
            operations: self.operations.load(Ordering::Relaxed),
            presence_messages: self.presence_messages.load(Ordering::Relaxed),
            participants: self.participant_count().await,
        }
    }
}

/// Maps document ids to rooms.
///
/// Rooms live for the lifetime of the manager so a document survives all
/// of its participants disconnecting.
pub struct RoomManager {
    rooms: RwLock<FxHashMap<String, Arc<DocumentRoom>>>,
    capacity: usize,
    max_history: usize,
}

impl RoomManager {
    pub fn new(capacity: usize, max_history: usize) -> Self {
        Self {
            rooms: RwLock::new(FxHashMap::default()),
            capacity,
            max_history,
        }
    }

    /// Get or create the room for a document.
    pub async fn get_or_create(&self, document_id: &str) -> Arc<DocumentRoom> {
        if let Some(room) = self.rooms.read().await.get(document_id) {
            return room.clone();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(document_id.to_owned())
            .or_insert_with(|| {
                log::info!("created room for doc {document_id}");
                Arc::new(DocumentRoom::new(document_id, self.capacity, self.max_history))
            })
            .clone()
    }

    pub async fn get(&self, document_id: &str) -> Option<Arc<DocumentRoom>> {
        self.rooms.read().await.get(document_id).cloned()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn active_documents(&self) -> Vec<String> {
        self.rooms.read().await.keys().cloned().collect()
    }
}
