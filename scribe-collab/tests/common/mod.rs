//! Helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use scribe_collab::client::{ClientEvent, CollabClient, ConnectionState};
use scribe_collab::editor::{
    CollaborativeEditor, Decoration, EditorConfig, EditorEvent, EditorInput, EditorSurface, SurfaceError,
};
use scribe_collab::protocol::CursorPosition;
use scribe_collab::server::{RelayConfig, RelayServer};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};

pub const WAIT: Duration = Duration::from_secs(5);

/// Find a free port for testing.
pub async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

pub fn relay_config(port: u16) -> RelayConfig {
    RelayConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        broadcast_capacity: 64,
        ..RelayConfig::default()
    }
}

/// Run `server` in the background and give it time to bind.
pub async fn spawn_relay(server: Arc<RelayServer>) -> JoinHandle<()> {
    let handle = tokio::spawn(async move {
        server.run().await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle
}

/// Start a relay on a free port, return the port and the server.
pub async fn start_test_server() -> (u16, Arc<RelayServer>) {
    let port = free_port().await;
    let server = Arc::new(RelayServer::new(relay_config(port)));
    spawn_relay(server.clone()).await;
    (port, server)
}

/// Poll `check` until it holds or the wait runs out.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

pub async fn wait_for_status(events: &mut mpsc::Receiver<ClientEvent>, wanted: ConnectionState) {
    let found = timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if event == ClientEvent::StatusChanged(wanted) {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(found, Ok(true)), "never reached {wanted:?}");
}

/// Next client message matching `pred`, skipping everything else.
pub async fn next_client_message(
    events: &mut mpsc::Receiver<ClientEvent>,
    mut pred: impl FnMut(&scribe_collab::CollabMessage) -> bool,
) -> Option<scribe_collab::CollabMessage> {
    timeout(WAIT, async {
        while let Some(event) = events.recv().await {
            if let ClientEvent::Message(msg) = event {
                if pred(&msg) {
                    return Some(msg);
                }
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

#[derive(Debug, Default)]
pub struct SurfaceState {
    pub text: String,
    pub cursor: CursorPosition,
    pub decorations: Vec<Decoration>,
}

/// A surface the test can edit while the editor owns a clone.
#[derive(Debug, Clone, Default)]
pub struct SharedSurface(pub Arc<Mutex<SurfaceState>>);

impl SharedSurface {
    pub fn text_now(&self) -> String {
        self.0.lock().unwrap().text.clone()
    }

    pub fn decorations_now(&self) -> Vec<Decoration> {
        self.0.lock().unwrap().decorations.clone()
    }

    pub fn type_text(&self, text: &str) {
        self.0.lock().unwrap().text = text.to_string();
    }
}

impl EditorSurface for SharedSurface {
    fn text(&self) -> Result<String, SurfaceError> {
        Ok(self.text_now())
    }

    fn set_text(&mut self, text: &str) -> Result<(), SurfaceError> {
        self.type_text(text);
        Ok(())
    }

    fn cursor(&self) -> Result<CursorPosition, SurfaceError> {
        Ok(self.0.lock().unwrap().cursor)
    }

    fn set_cursor(&mut self, position: CursorPosition) -> Result<(), SurfaceError> {
        self.0.lock().unwrap().cursor = position;
        Ok(())
    }

    fn set_decorations(&mut self, decorations: &[Decoration]) -> Result<(), SurfaceError> {
        self.0.lock().unwrap().decorations = decorations.to_vec();
        Ok(())
    }
}

/// An editor running in its own task.
pub struct Peer {
    pub surface: SharedSurface,
    pub input: mpsc::UnboundedSender<EditorInput>,
    pub events: mpsc::UnboundedReceiver<EditorEvent>,
    pub handle: JoinHandle<CollaborativeEditor<SharedSurface>>,
}

impl Peer {
    /// Replace the surface text and tell the editor about it.
    pub fn type_text(&self, text: &str) {
        self.surface.type_text(text);
        self.input.send(EditorInput::ContentChanged).unwrap();
    }

    pub async fn next_event(&mut self, mut pred: impl FnMut(&EditorEvent) -> bool) -> Option<EditorEvent> {
        timeout(WAIT, async {
            while let Some(event) = self.events.recv().await {
                if pred(&event) {
                    return Some(event);
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    pub async fn wait_connected(&mut self) {
        let event = self
            .next_event(|e| *e == EditorEvent::ConnectionStatusChanged(ConnectionState::Connected))
            .await;
        assert!(event.is_some(), "editor never connected");
    }

    /// Dispose the editor and wait for its task to finish.
    pub async fn dispose(self) -> CollaborativeEditor<SharedSurface> {
        let _ = self.input.send(EditorInput::Dispose);
        timeout(WAIT, self.handle).await.unwrap().unwrap()
    }
}

pub fn editor_config(port: u16, document_id: &str, user: &str) -> EditorConfig {
    EditorConfig {
        ws_url: format!("ws://127.0.0.1:{port}"),
        document_id: document_id.to_string(),
        user_id: user.to_lowercase(),
        user_name: user.to_string(),
        debounce_ms: 30,
        ..EditorConfig::default()
    }
}

/// Start an editor with a fast-retrying client.
pub fn spawn_editor(config: EditorConfig) -> Peer {
    let mut client_config = config.client_config();
    client_config.initial_backoff = Duration::from_millis(50);
    client_config.max_backoff = Duration::from_millis(200);
    let client = CollabClient::new(client_config);

    let surface = SharedSurface::default();
    let mut editor = CollaborativeEditor::with_client(config, surface.clone(), client, 0);
    let events = editor.take_event_rx().unwrap();
    let input = editor.input_sender();
    editor.connect().unwrap();
    let handle = tokio::spawn(async move {
        editor.run().await;
        editor
    });

    Peer {
        surface,
        input,
        events,
        handle,
    }
}
