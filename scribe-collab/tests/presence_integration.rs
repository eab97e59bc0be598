//! Presence over a real relay: joins, leaves, cursors, typing.

mod common;

use common::*;
use scribe_collab::client::{ClientConfig, CollabClient, ConnectionState};
use scribe_collab::editor::{DecorationKind, EditorEvent, EditorInput};
use scribe_collab::presence::Identity;
use scribe_collab::protocol::{CollabMessage, CursorPosition, SelectionRange};

#[tokio::test]
async fn test_join_and_leave_events() {
    let (port, _server) = start_test_server().await;
    let mut alice = spawn_editor(editor_config(port, "presence", "Alice"));
    alice.wait_connected().await;
    let mut bob = spawn_editor(editor_config(port, "presence", "Bob"));
    bob.wait_connected().await;

    let joined = alice.next_event(|e| matches!(e, EditorEvent::UserJoined(_))).await;
    match joined {
        Some(EditorEvent::UserJoined(p)) => {
            assert_eq!(p.user_id, "bob");
            assert_eq!(p.user_name, "Bob");
        }
        other => panic!("expected bob to join, got {other:?}"),
    }

    // Bob learns about Alice from the roster.
    let existing = bob.next_event(|e| matches!(e, EditorEvent::UserJoined(_))).await;
    assert!(matches!(existing, Some(EditorEvent::UserJoined(p)) if p.user_id == "alice"));

    bob.dispose().await;
    let left = alice.next_event(|e| matches!(e, EditorEvent::UserLeft(_))).await;
    assert!(matches!(left, Some(EditorEvent::UserLeft(p)) if p.user_id == "bob"));
    let alice = alice.dispose().await;
    assert!(alice.roster().is_empty());
}

#[tokio::test]
async fn test_remote_cursor_becomes_decoration() {
    let (port, _server) = start_test_server().await;
    let mut alice = spawn_editor(editor_config(port, "cursors", "Alice"));
    let mut bob = spawn_editor(editor_config(port, "cursors", "Bob"));
    alice.wait_connected().await;
    bob.wait_connected().await;
    assert!(alice.next_event(|e| matches!(e, EditorEvent::UserJoined(_))).await.is_some());

    let position = CursorPosition::new(2, 3);
    bob.input.send(EditorInput::CursorMoved(position)).unwrap();

    assert!(
        eventually(|| {
            alice
                .surface
                .decorations_now()
                .iter()
                .any(|d| d.user_id == "bob" && d.kind == DecorationKind::Caret(position))
        })
        .await
    );

    let selection = SelectionRange::new(CursorPosition::new(1, 1), CursorPosition::new(1, 4));
    bob.input.send(EditorInput::SelectionChanged(selection)).unwrap();
    assert!(
        eventually(|| {
            alice
                .surface
                .decorations_now()
                .iter()
                .any(|d| d.user_id == "bob" && d.kind == DecorationKind::Selection(selection))
        })
        .await
    );

    // Leaving removes the decoration.
    bob.dispose().await;
    assert!(eventually(|| alice.surface.decorations_now().is_empty()).await);
    alice.dispose().await;
}

#[tokio::test]
async fn test_typing_indicator_round_trip() {
    let (port, _server) = start_test_server().await;
    let mut alice = spawn_editor(editor_config(port, "typing", "Alice"));
    let mut bob = spawn_editor(editor_config(port, "typing", "Bob"));
    alice.wait_connected().await;
    bob.wait_connected().await;
    assert!(bob.next_event(|e| matches!(e, EditorEvent::UserJoined(_))).await.is_some());

    alice.type_text("h");
    let started = bob.next_event(|e| matches!(e, EditorEvent::TypingIndicator { .. })).await;
    assert_eq!(
        started,
        Some(EditorEvent::TypingIndicator {
            user_id: "alice".into(),
            is_typing: true
        })
    );

    // The debounced flush ends the typing burst.
    let stopped = bob.next_event(|e| matches!(e, EditorEvent::TypingIndicator { .. })).await;
    assert_eq!(
        stopped,
        Some(EditorEvent::TypingIndicator {
            user_id: "alice".into(),
            is_typing: false
        })
    );

    alice.dispose().await;
    bob.dispose().await;
}

#[tokio::test]
async fn test_presence_is_not_echoed_to_sender() {
    let (port, _server) = start_test_server().await;
    let url = format!("ws://127.0.0.1:{port}");

    let mut alice = CollabClient::new(ClientConfig::new(&url, "echo", Identity::new("alice", "Alice")));
    let mut alice_events = alice.take_event_rx().unwrap();
    alice.connect().unwrap();
    wait_for_status(&mut alice_events, ConnectionState::Connected).await;

    let mut bob = CollabClient::new(ClientConfig::new(&url, "echo", Identity::new("bob", "Bob")));
    let mut bob_events = bob.take_event_rx().unwrap();
    bob.connect().unwrap();
    wait_for_status(&mut bob_events, ConnectionState::Connected).await;

    let cursor = CollabMessage::CursorChange {
        user_id: "alice".into(),
        user_name: "Alice".into(),
        color: "#336699".into(),
        position: CursorPosition::new(1, 5),
    };
    alice.send(cursor.clone()).await.unwrap();

    let received = next_client_message(&mut bob_events, |m| matches!(m, CollabMessage::CursorChange { .. })).await;
    assert_eq!(received, Some(cursor));

    // Alice only hears about Bob joining, never her own cursor.
    let own = tokio::time::timeout(std::time::Duration::from_millis(200), async {
        while let Some(event) = alice_events.recv().await {
            if let scribe_collab::ClientEvent::Message(CollabMessage::CursorChange { .. }) = event {
                return true;
            }
        }
        false
    })
    .await;
    assert!(!matches!(own, Ok(true)));

    alice.close().await;
    bob.close().await;
}

#[tokio::test]
async fn test_same_user_in_two_tabs_sees_caret() {
    let (port, _server) = start_test_server().await;
    let mut first = spawn_editor(editor_config(port, "tabs", "Alice"));
    first.wait_connected().await;
    let mut second = spawn_editor(editor_config(port, "tabs", "Alice"));
    second.wait_connected().await;
    assert!(first.next_event(|e| matches!(e, EditorEvent::UserJoined(_))).await.is_some());

    let position = CursorPosition::new(1, 2);
    second.input.send(EditorInput::CursorMoved(position)).unwrap();
    assert!(
        eventually(|| {
            first
                .surface
                .decorations_now()
                .iter()
                .any(|d| d.user_id == "alice" && d.kind == DecorationKind::Caret(position))
        })
        .await
    );

    first.dispose().await;
    second.dispose().await;
}
