//! # scribe-collab — real-time collaborative text editing
//!
//! Connects an editing surface to a shared document over WebSocket,
//! keeping every replica convergent with operational transformation
//! from `scribe-ot`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   JSON over WS    ┌─────────────┐
//! │CollaborativeEditor│ ◄───────────────► │ RelayServer │
//! │  SessionState     │                   │ (reference) │
//! │  PresenceRoster   │                   └──────┬──────┘
//! └────────┬─────────┘                          │
//!          │                             ┌──────┴───────┐
//!          ▼                             │ DocumentRoom │
//! ┌──────────────────┐                   │ text+history │
//! │  CollabClient    │                   │ (fan-out)    │
//! │  backoff, queue  │                   └──────────────┘
//! └──────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — wire messages and cursor/selection types
//! - [`client`] — reconnecting WebSocket client with a FIFO outbound queue
//! - [`presence`] — remote participants, colors, typing expiry
//! - [`editor`] — the controller binding a surface to a session
//! - [`broadcast`] — per-document rooms: authoritative text, history, fan-out
//! - [`server`] — WebSocket relay serving those rooms

pub mod protocol;
pub mod client;
pub mod presence;
pub mod editor;
pub mod broadcast;
pub mod server;

pub use protocol::{CollabMessage, CursorPosition, ProtocolError, SelectionRange};
pub use client::{Backoff, ClientConfig, ClientEvent, CollabClient, ConnectionState, OperationQueue};
pub use presence::{color_for_user, Identity, Participant, PresenceChange, PresenceRoster};
pub use editor::{
    offset_to_position, position_to_offset, CollaborativeEditor, Decoration, DecorationKind,
    EditorConfig, EditorEvent, EditorInput, EditorSurface, SurfaceError,
};
pub use broadcast::{ApplyOutcome, DocumentRoom, HistoryEntry, RoomError, RoomManager, RoomState};
pub use server::{RelayConfig, RelayServer, RelayStats};
