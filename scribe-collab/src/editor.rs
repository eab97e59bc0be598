//! Collaborative editor controller.
//!
//! Binds a host [`EditorSurface`] to a [`SessionState`] and a
//! [`CollabClient`]. All handling for one document happens on a single task:
//! [`CollaborativeEditor::run`] selects over surface input, client events,
//! the send debounce and the remote typing expiry, and runs each handler to
//! completion.
//!
//! ```text
//! surface ──ContentChanged──► from_text_change ──► session (optimistic)
//!                                                      │ debounce
//!                                                      ▼
//! surface ◄── set_text ◄── session ◄── text-change ◄── client ◄──► relay
//! ```

use std::time::Duration;

use scribe_ot::{compose, from_text_change, transform, Operation, Priority, SessionError, SessionState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use crate::client::{ClientConfig, ClientEvent, CollabClient, ConnectionState};
use crate::presence::{color_for_user, Identity, Participant, PresenceChange, PresenceRoster};
use crate::protocol::{CollabMessage, CursorPosition, ProtocolError, SelectionRange};

/// Editor-side configuration, as supplied by the host application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub ws_url: String,
    pub document_id: String,
    pub user_id: String,
    pub session_id: String,
    pub user_name: String,
    /// Empty means derive a color from the user id.
    pub user_color: String,
    pub enable_cursor_sync: bool,
    pub enable_selection_sync: bool,
    pub debounce_ms: u64,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9090".to_string(),
            document_id: "default".to_string(),
            user_id: String::new(),
            session_id: String::new(),
            user_name: "Anonymous".to_string(),
            user_color: String::new(),
            enable_cursor_sync: true,
            enable_selection_sync: true,
            debounce_ms: 300,
        }
    }
}

impl EditorConfig {
    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    pub fn identity(&self) -> Identity {
        let color = if self.user_color.is_empty() {
            color_for_user(&self.user_id)
        } else {
            self.user_color.clone()
        };
        Identity {
            user_id: self.user_id.clone(),
            user_name: self.user_name.clone(),
            color,
            session_id: self.session_id.clone(),
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(&self.ws_url, &self.document_id, self.identity())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// The host surface rejected a change.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface rejected change: {0}")]
    Rejected(String),
    #[error("surface is gone")]
    Detached,
}

/// A remote collaborator's caret or selection, as drawn by the surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoration {
    pub user_id: String,
    pub label: String,
    pub color: String,
    pub kind: DecorationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationKind {
    Caret(CursorPosition),
    Selection(SelectionRange),
}

/// The host text-editing surface.
pub trait EditorSurface {
    fn text(&self) -> Result<String, SurfaceError>;
    fn set_text(&mut self, text: &str) -> Result<(), SurfaceError>;
    fn cursor(&self) -> Result<CursorPosition, SurfaceError>;
    fn set_cursor(&mut self, position: CursorPosition) -> Result<(), SurfaceError>;
    /// Replace every decoration drawn by the controller.
    fn set_decorations(&mut self, decorations: &[Decoration]) -> Result<(), SurfaceError>;
}

/// Notifications from the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorInput {
    /// The surface text changed; the controller reads and diffs it.
    ContentChanged,
    CursorMoved(CursorPosition),
    SelectionChanged(SelectionRange),
    Dispose,
}

/// Notifications for the surrounding application.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    UserJoined(Participant),
    UserLeft(Participant),
    TypingIndicator { user_id: String, is_typing: bool },
    ConnectionStatusChanged(ConnectionState),
    /// The document was replaced by a server snapshot.
    Resynced { version: u64, discarded: usize },
}

/// Character offset of a 1-based line/column, clamped to the text.
pub fn position_to_offset(text: &str, position: CursorPosition) -> usize {
    let mut chars = text.chars();
    let mut offset = 0;
    let mut line = 1;
    while line < position.line {
        match chars.next() {
            Some('\n') => line += 1,
            Some(_) => {}
            None => return offset,
        }
        offset += 1;
    }
    for _ in 1..position.column {
        match chars.next() {
            Some('\n') | None => break,
            Some(_) => offset += 1,
        }
    }
    offset
}

/// 1-based line/column of a character offset, clamped to the text.
pub fn offset_to_position(text: &str, offset: usize) -> CursorPosition {
    let mut position = CursorPosition::START;
    for c in text.chars().take(offset) {
        if c == '\n' {
            position.line += 1;
            position.column = 1;
        } else {
            position.column += 1;
        }
    }
    position
}

/// Map a position in `before` through `op` to the matching position in `after`.
fn transform_position(op: &Operation, before: &str, after: &str, position: CursorPosition) -> CursorPosition {
    let offset = op.transform_index(position_to_offset(before, position));
    offset_to_position(after, offset)
}

/// Trailing debounce: each schedule pushes the deadline out.
#[derive(Debug, Default)]
struct Debounce {
    deadline: Option<Instant>,
}

impl Debounce {
    fn schedule(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    fn cancel(&mut self) {
        self.deadline = None;
    }

    fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// What the surface shows while it lags behind the session because a
/// `set_text` was rejected.
#[derive(Debug, Clone)]
struct SurfaceLag {
    shown: String,
    /// Takes `shown` to the session text.
    catch_up: Operation,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Controller for one collaboratively edited document.
pub struct CollaborativeEditor<S: EditorSurface> {
    config: EditorConfig,
    identity: Identity,
    surface: S,
    session: SessionState,
    client: CollabClient,
    client_events: Option<mpsc::Receiver<ClientEvent>>,
    roster: PresenceRoster,
    surface_lag: Option<SurfaceLag>,
    input_tx: mpsc::UnboundedSender<EditorInput>,
    input_rx: mpsc::UnboundedReceiver<EditorInput>,
    event_tx: mpsc::UnboundedSender<EditorEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<EditorEvent>>,
    debounce: Debounce,
    local_typing: bool,
    resync_requested: bool,
    status: ConnectionState,
    disposed: bool,
}

impl<S: EditorSurface> CollaborativeEditor<S> {
    /// Bind `surface`, whose current text is the document at version 0.
    pub fn new(config: EditorConfig, surface: S) -> Self {
        let client = CollabClient::new(config.client_config());
        Self::with_client(config, surface, client, 0)
    }

    /// Bind `surface`, whose current text is the document at `version`,
    /// using a preconfigured client.
    pub fn with_client(config: EditorConfig, surface: S, mut client: CollabClient, version: u64) -> Self {
        let text = surface.text().unwrap_or_else(|e| {
            log::warn!("could not read initial surface text: {e}");
            String::new()
        });
        let identity = client.config().identity.clone();
        let client_events = client.take_event_rx();
        client.set_known_version(version);
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            session: SessionState::new(config.document_id.clone(), text, version),
            roster: PresenceRoster::new(client.client_id()),
            surface_lag: None,
            config,
            identity,
            surface,
            client,
            client_events,
            input_tx,
            input_rx,
            event_tx,
            event_rx: Some(event_rx),
            debounce: Debounce::default(),
            local_typing: false,
            resync_requested: false,
            status: ConnectionState::Disconnected,
            disposed: false,
        }
    }

    /// Start connecting. Progress arrives as
    /// [`EditorEvent::ConnectionStatusChanged`].
    pub fn connect(&mut self) -> Result<(), ProtocolError> {
        self.client.connect()
    }

    /// Handle for the surface to report changes through.
    pub fn input_sender(&self) -> mpsc::UnboundedSender<EditorInput> {
        self.input_tx.clone()
    }

    /// Take the application event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<EditorEvent>> {
        self.event_rx.take()
    }

    /// Process input and network events until disposed.
    pub async fn run(&mut self) {
        while !self.disposed {
            let flush_at = self.debounce.deadline();
            let typing_expiry = self.roster.next_typing_expiry().map(Instant::from_std);
            let inputs = &mut self.input_rx;
            let Some(client_events) = self.client_events.as_mut() else {
                log::warn!("client events were taken elsewhere");
                return;
            };

            tokio::select! {
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input).await,
                    None => self.dispose().await,
                },
                event = client_events.recv() => match event {
                    Some(event) => self.handle_client_event(event).await,
                    None => {
                        log::warn!("client event stream ended");
                        self.dispose().await;
                    }
                },
                _ = sleep_until(flush_at) => self.flush().await,
                _ = sleep_until(typing_expiry) => self.expire_typing(),
            }
        }
    }

    pub async fn handle_input(&mut self, input: EditorInput) {
        match input {
            EditorInput::ContentChanged => {
                if let Err(e) = self.handle_local_change().await {
                    log::error!("local edit rejected: {e}");
                }
            }
            EditorInput::CursorMoved(position) => self.handle_cursor_moved(position).await,
            EditorInput::SelectionChanged(selection) => self.handle_selection_changed(selection).await,
            EditorInput::Dispose => self.dispose().await,
        }
    }

    /// Diff the surface against the session and record the change.
    ///
    /// The change is applied locally right away; only its transmission is
    /// debounced.
    pub async fn handle_local_change(&mut self) -> Result<(), SessionError> {
        if self.disposed {
            return Ok(());
        }
        let current = match self.surface.text() {
            Ok(text) => text,
            Err(e) => {
                log::warn!("could not read surface text: {e}");
                return Ok(());
            }
        };
        let op = match self.surface_lag.take() {
            None => {
                if current == self.session.text() {
                    return Ok(());
                }
                from_text_change(self.session.text(), &current)
            }
            Some(lag) => {
                if current == lag.shown {
                    self.surface_lag = Some(lag);
                    return Ok(());
                }
                // The edit was made on stale text: rebase it onto the
                // session and retry showing what the surface missed.
                let edit = from_text_change(&lag.shown, &current);
                let (op, catch_up) = match transform(&edit, &lag.catch_up, Priority::Left) {
                    Ok(pair) => pair,
                    Err(e) => {
                        self.surface_lag = Some(lag);
                        return Err(e.into());
                    }
                };
                if let Err(e) = self.record_and_shift(op) {
                    self.surface_lag = Some(lag);
                    return Err(e);
                }
                self.show_session_text(&catch_up, current);
                self.after_local_change().await;
                return Ok(());
            }
        };
        self.record_and_shift(op)?;
        self.after_local_change().await;
        Ok(())
    }

    /// Record a local operation built against the session text, shifting
    /// remote carets along with it.
    fn record_and_shift(&mut self, op: Operation) -> Result<(), SessionError> {
        let before = self.session.text().to_owned();
        self.session.record_local_operation(op.clone())?;
        let after = self.session.text();
        self.roster
            .map_positions(|p| transform_position(&op, &before, after, p));
        Ok(())
    }

    async fn after_local_change(&mut self) {
        if !self.local_typing {
            self.local_typing = true;
            self.send_typing(true).await;
        }
        self.debounce.schedule(self.config.debounce());
        self.render_decorations();
    }

    /// Send the pending edits now.
    pub async fn flush(&mut self) {
        self.debounce.cancel();
        if self.disposed {
            return;
        }
        self.send_outbound().await;
        if self.local_typing {
            self.local_typing = false;
            self.send_typing(false).await;
        }
    }

    pub async fn handle_cursor_moved(&mut self, position: CursorPosition) {
        if self.disposed || !self.config.enable_cursor_sync {
            return;
        }
        let msg = CollabMessage::CursorChange {
            user_id: self.identity.user_id.clone(),
            user_name: self.identity.user_name.clone(),
            color: self.identity.color.clone(),
            position,
        };
        self.send_presence(msg).await;
    }

    pub async fn handle_selection_changed(&mut self, selection: SelectionRange) {
        if self.disposed || !self.config.enable_selection_sync {
            return;
        }
        let msg = CollabMessage::SelectionChange {
            user_id: self.identity.user_id.clone(),
            user_name: self.identity.user_name.clone(),
            color: self.identity.color.clone(),
            selection,
        };
        self.send_presence(msg).await;
    }

    pub async fn handle_client_event(&mut self, event: ClientEvent) {
        if self.disposed {
            return;
        }
        match event {
            ClientEvent::StatusChanged(state) => {
                let was_connected = self.status == ConnectionState::Connected;
                self.status = state;
                // Later failed attempts report Disconnected again; by then
                // the head already waits in the client queue.
                if was_connected && state == ConnectionState::Disconnected {
                    if self.session.requeue_in_flight() {
                        log::debug!("requeueing in-flight operation {:?}", self.session.head_seq());
                    }
                    if self.resync_requested {
                        // The request may have died with the socket.
                        self.resync_requested = false;
                        self.request_resync().await;
                    }
                    if !self.roster.is_empty() {
                        self.roster.clear();
                        self.render_decorations();
                    }
                    if !self.debounce.is_pending() {
                        self.send_outbound().await;
                    }
                }
                self.emit(EditorEvent::ConnectionStatusChanged(state));
            }
            ClientEvent::Message(msg) => self.handle_message(msg).await,
        }
    }

    pub async fn handle_message(&mut self, msg: CollabMessage) {
        if self.disposed {
            return;
        }
        match msg {
            CollabMessage::TextChange {
                user_id,
                client_id,
                op_seq,
                version,
                op,
            } => {
                self.handle_remote_change(&user_id, client_id, op_seq, version, &op)
                    .await
            }
            CollabMessage::Ack { version, op_seq } => self.handle_ack(version, op_seq).await,
            CollabMessage::Snapshot { version, text } => self.apply_snapshot(version, text),
            CollabMessage::CursorChange { .. }
            | CollabMessage::SelectionChange { .. }
            | CollabMessage::UserJoin { .. }
            | CollabMessage::UserLeave { .. }
            | CollabMessage::TypingIndicator { .. } => self.handle_presence(&msg).await,
            CollabMessage::VersionCheck { .. } | CollabMessage::ResyncRequest | CollabMessage::Unknown => {
                log::debug!("ignoring inbound {}", msg.kind());
            }
        }
    }

    async fn handle_remote_change(
        &mut self,
        user_id: &str,
        client_id: Option<Uuid>,
        op_seq: u64,
        version: u64,
        op: &Operation,
    ) {
        let server_version = self.session.server_version();
        if version <= server_version {
            log::debug!("dropping stale text-change v{version} from {user_id}");
            return;
        }

        if client_id == Some(self.client.client_id()) {
            if self.session.head_seq() == Some(op_seq) {
                // Our own operation came back, e.g. during catch-up.
                self.handle_ack(version, op_seq).await;
            } else {
                log::warn!("unexpected echo of seq {op_seq} at v{version}");
                self.request_resync().await;
            }
            return;
        }

        let before = self.session.text().to_owned();
        match self.session.receive_remote_operation(op, version) {
            Ok(applied) => {
                self.client.set_known_version(version);
                self.apply_remote_to_surface(&applied, &before);
            }
            Err(e @ SessionError::OutOfOrder { .. }) => {
                log::warn!("text-change from {user_id}: {e}");
                self.request_resync().await;
            }
            Err(e) => {
                log::warn!("could not integrate text-change v{version} from {user_id}: {e}");
                self.request_resync().await;
            }
        }
    }

    /// Push the session text to the surface, keeping the local caret and
    /// remote carets on the characters they were next to.
    fn apply_remote_to_surface(&mut self, applied: &Operation, before: &str) {
        let (shown, change) = match self.surface_lag.take() {
            None => (before.to_owned(), applied.clone()),
            Some(lag) => match compose(&lag.catch_up, applied) {
                Ok(change) => (lag.shown, change),
                Err(e) => {
                    log::warn!("could not extend surface catch-up: {e}");
                    let shown = self.surface.text().unwrap_or(lag.shown);
                    let change = from_text_change(&shown, self.session.text());
                    (shown, change)
                }
            },
        };
        self.show_session_text(&change, shown);

        let after = self.session.text();
        self.roster
            .map_positions(|p| transform_position(applied, before, after, p));
        self.render_decorations();
    }

    /// Push the session text to a surface showing `shown`, where `change`
    /// takes `shown` to the session text. On rejection the surface is
    /// remembered as lagging so later local edits are rebased, not diffed
    /// against text the user never saw.
    fn show_session_text(&mut self, change: &Operation, shown: String) {
        let after = self.session.text();
        let caret = self
            .surface
            .cursor()
            .ok()
            .map(|caret| transform_position(change, &shown, after, caret));

        match self.surface.set_text(after) {
            Ok(()) => {
                if let Some(caret) = caret {
                    if let Err(e) = self.surface.set_cursor(caret) {
                        log::warn!("could not restore caret: {e}");
                    }
                }
            }
            Err(e) => {
                log::warn!("surface rejected remote change: {e}");
                self.surface_lag = Some(SurfaceLag {
                    shown,
                    catch_up: change.clone(),
                });
            }
        }
    }

    async fn handle_ack(&mut self, version: u64, op_seq: u64) {
        if version <= self.session.server_version() {
            log::debug!("ignoring duplicate ack v{version}");
            return;
        }
        if self.session.head_seq() != Some(op_seq) {
            log::warn!(
                "ack for seq {op_seq} but in-flight seq is {:?}",
                self.session.head_seq()
            );
            self.request_resync().await;
            return;
        }

        match self.session.acknowledge_local_operation(version) {
            Ok(_) => {
                self.client.set_known_version(version);
                if !self.debounce.is_pending() {
                    self.send_outbound().await;
                }
            }
            Err(e) => {
                log::warn!("ack v{version}: {e}");
                self.request_resync().await;
            }
        }
    }

    fn apply_snapshot(&mut self, version: u64, text: String) {
        let caret = self.surface.cursor().ok();
        let discarded = self.session.reset(text, version);
        if discarded > 0 {
            log::warn!("snapshot v{version} discarded {discarded} pending operations");
        } else {
            log::info!("accepted snapshot v{version}");
        }
        self.resync_requested = false;
        self.debounce.cancel();
        self.client.set_known_version(version);

        self.surface_lag = None;
        let text = self.session.text();
        if let Err(e) = self.surface.set_text(text) {
            log::warn!("surface rejected snapshot: {e}");
            if let Ok(shown) = self.surface.text() {
                let catch_up = from_text_change(&shown, text);
                self.surface_lag = Some(SurfaceLag { shown, catch_up });
            }
        } else if let Some(caret) = caret {
            let clamped = offset_to_position(text, position_to_offset(text, caret));
            if let Err(e) = self.surface.set_cursor(clamped) {
                log::warn!("could not restore caret: {e}");
            }
        }
        self.render_decorations();
        self.emit(EditorEvent::Resynced { version, discarded });
    }

    async fn handle_presence(&mut self, msg: &CollabMessage) {
        match self.roster.handle_message(msg) {
            Some(PresenceChange::Joined(participant)) => {
                log::info!("{} joined", participant.user_name);
                self.render_decorations();
                self.emit(EditorEvent::UserJoined(participant));
                self.announce_cursor().await;
            }
            Some(PresenceChange::Left(participant)) => {
                log::info!("{} left", participant.user_name);
                self.render_decorations();
                self.emit(EditorEvent::UserLeft(participant));
            }
            Some(PresenceChange::CursorMoved(_)) | Some(PresenceChange::SelectionChanged(_)) => {
                self.render_decorations();
            }
            Some(PresenceChange::Typing { user_id, is_typing }) => {
                self.emit(EditorEvent::TypingIndicator { user_id, is_typing });
            }
            None => {}
        }
    }

    /// Let a newcomer see where we are.
    async fn announce_cursor(&mut self) {
        if !self.config.enable_cursor_sync {
            return;
        }
        if let Ok(position) = self.surface.cursor() {
            self.handle_cursor_moved(position).await;
        }
    }

    fn expire_typing(&mut self) {
        for user_id in self.roster.expire_typing(std::time::Instant::now()) {
            self.emit(EditorEvent::TypingIndicator {
                user_id,
                is_typing: false,
            });
        }
    }

    async fn send_outbound(&mut self) {
        match self.session.take_outbound() {
            Ok(Some(outbound)) => {
                if let Err(e) = self.client.send_operation(&outbound).await {
                    log::warn!("could not send seq {}: {e}", outbound.seq);
                }
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("could not prepare pending operations: {e}");
                self.request_resync().await;
            }
        }
    }

    async fn send_typing(&mut self, is_typing: bool) {
        let msg = CollabMessage::TypingIndicator {
            user_id: self.identity.user_id.clone(),
            is_typing,
        };
        self.send_presence(msg).await;
    }

    async fn send_presence(&mut self, msg: CollabMessage) {
        if let Err(e) = self.client.send(msg).await {
            log::debug!("presence update dropped: {e}");
        }
    }

    async fn request_resync(&mut self) {
        if self.resync_requested {
            return;
        }
        self.resync_requested = true;
        log::warn!("doc {}: requesting resync", self.session.document_id());
        if let Err(e) = self.client.send(CollabMessage::ResyncRequest).await {
            log::warn!("could not request resync: {e}");
        }
    }

    fn render_decorations(&mut self) {
        let mut decorations: Vec<Decoration> = self
            .roster
            .participants()
            .filter_map(|p| {
                let kind = match (p.selection, p.cursor) {
                    (Some(selection), _) if !selection.is_empty() => DecorationKind::Selection(selection),
                    (_, Some(cursor)) => DecorationKind::Caret(cursor),
                    _ => return None,
                };
                Some(Decoration {
                    user_id: p.user_id.clone(),
                    label: p.user_name.clone(),
                    color: p.color.clone(),
                    kind,
                })
            })
            .collect();
        decorations.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        if let Err(e) = self.surface.set_decorations(&decorations) {
            log::warn!("surface rejected decorations: {e}");
        }
    }

    fn emit(&self, event: EditorEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Close the connection, cancel timers and remove all decorations.
    /// Safe to call more than once.
    pub async fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        self.debounce.cancel();
        self.client.close().await;
        self.roster.clear();
        if let Err(e) = self.surface.set_decorations(&[]) {
            log::warn!("could not clear decorations: {e}");
        }
        log::info!("doc {}: editor disposed", self.session.document_id());
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// The document text including unacknowledged local edits.
    pub fn text(&self) -> &str {
        self.session.text()
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn roster(&self) -> &PresenceRoster {
        &self.roster
    }

    pub fn client(&self) -> &CollabClient {
        &self.client
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Last connection state reported by the client.
    pub fn status(&self) -> ConnectionState {
        self.status
    }

    /// Whether edits are waiting for the debounce to fire.
    pub fn has_scheduled_flush(&self) -> bool {
        self.debounce.is_pending()
    }
}
