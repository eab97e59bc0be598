//! JSON wire protocol for collaborative editing.
//!
//! One message per logical event, tagged by `type`:
//! ```text
//! {"type":"text-change","userId":"u1","clientId":"…","opSeq":3,"version":7,"op":{…}}
//! {"type":"cursor-change","userId":"u1","userName":"Ada","color":"#e91e63","position":{"line":1,"column":4}}
//! {"type":"ack","version":8,"opSeq":3}
//! ```
//!
//! Messages are decoded once at the transport boundary into [`CollabMessage`].
//! A well-formed envelope with an unrecognised `type` decodes to
//! [`CollabMessage::Unknown`]; anything else that fails to parse is a
//! [`ProtocolError::Malformed`].

use scribe_ot::Operation;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A caret position, 1-based like the host editors that produce it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorPosition {
    pub line: u32,
    pub column: u32,
}

impl CursorPosition {
    pub const START: CursorPosition = CursorPosition { line: 1, column: 1 };

    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Default for CursorPosition {
    fn default() -> Self {
        Self::START
    }
}

/// A selected range, 1-based, end exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl SelectionRange {
    pub fn new(start: CursorPosition, end: CursorPosition) -> Self {
        Self {
            start_line: start.line,
            start_column: start.column,
            end_line: end.line,
            end_column: end.column,
        }
    }

    pub fn start(&self) -> CursorPosition {
        CursorPosition::new(self.start_line, self.start_column)
    }

    pub fn end(&self) -> CursorPosition {
        CursorPosition::new(self.end_line, self.end_column)
    }

    pub fn is_empty(&self) -> bool {
        self.start() == self.end()
    }
}

/// Every message exchanged between clients and the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum CollabMessage {
    /// An edit. Outbound `version` is the base version the op was built
    /// against; inbound `version` is the version the server assigned.
    TextChange {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<Uuid>,
        #[serde(default)]
        op_seq: u64,
        version: u64,
        op: Operation,
    },
    /// The server applied the author's operation `op_seq` at `version`.
    Ack { version: u64, op_seq: u64 },
    CursorChange {
        user_id: String,
        user_name: String,
        color: String,
        position: CursorPosition,
    },
    SelectionChange {
        user_id: String,
        user_name: String,
        color: String,
        selection: SelectionRange,
    },
    UserJoin {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_id: Option<String>,
    },
    UserLeave {
        user_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<String>,
    },
    TypingIndicator { user_id: String, is_typing: bool },
    /// Handshake: the last version this client has seen.
    VersionCheck { version: u64 },
    /// Ask the server for a full snapshot.
    ResyncRequest,
    /// Full document state.
    Snapshot { version: u64, text: String },
    #[serde(other)]
    Unknown,
}

impl CollabMessage {
    /// Serialize to the JSON wire format.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Parse a JSON wire message.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// The wire `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            CollabMessage::TextChange { .. } => "text-change",
            CollabMessage::Ack { .. } => "ack",
            CollabMessage::CursorChange { .. } => "cursor-change",
            CollabMessage::SelectionChange { .. } => "selection-change",
            CollabMessage::UserJoin { .. } => "user-join",
            CollabMessage::UserLeave { .. } => "user-leave",
            CollabMessage::TypingIndicator { .. } => "typing-indicator",
            CollabMessage::VersionCheck { .. } => "version-check",
            CollabMessage::ResyncRequest => "resync-request",
            CollabMessage::Snapshot { .. } => "snapshot",
            CollabMessage::Unknown => "unknown",
        }
    }

    /// The user a message originates from, when it names one.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            CollabMessage::TextChange { user_id, .. }
            | CollabMessage::CursorChange { user_id, .. }
            | CollabMessage::SelectionChange { user_id, .. }
            | CollabMessage::UserJoin { user_id, .. }
            | CollabMessage::UserLeave { user_id, .. }
            | CollabMessage::TypingIndicator { user_id, .. } => Some(user_id),
            _ => None,
        }
    }

    /// Ephemeral presence updates, superseded by the next one of the same kind.
    pub fn is_presence(&self) -> bool {
        matches!(
            self,
            CollabMessage::CursorChange { .. }
                | CollabMessage::SelectionChange { .. }
                | CollabMessage::TypingIndicator { .. }
        )
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("operation queue full")]
    QueueFull,
}
