//! Presence tracking: who is in the document, where their caret is,
//! and whether they are typing.
//!
//! The roster is fed every inbound presence message. Entries are replaced
//! wholesale on each update, so a renderer never has to patch stale state.

use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use rustc_hash::{FxHashMap, FxHasher};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{CollabMessage, CursorPosition, SelectionRange};

/// How long a remote typing flag lives without a refresh.
pub const TYPING_TIMEOUT: Duration = Duration::from_secs(5);

/// The local user, supplied by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    #[serde(default)]
    pub session_id: String,
}

impl Identity {
    /// An identity whose color is derived from the user id.
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            color: color_for_user(&user_id),
            user_id,
            user_name: user_name.into(),
            session_id: String::new(),
        }
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// A stable `#rrggbb` color for a user id.
///
/// Hue comes from a hash of the id; saturation and lightness are fixed so
/// every caret is vivid and readable on a light background.
pub fn color_for_user(user_id: &str) -> String {
    let mut hasher = FxHasher::default();
    user_id.hash(&mut hasher);
    let hue = (hasher.finish() % 360) as f32 / 360.0;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.5);
    format!(
        "#{:02x}{:02x}{:02x}",
        channel_byte(r),
        channel_byte(g),
        channel_byte(b)
    )
}

fn channel_byte(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_channel(p, q, h + 1.0 / 3.0),
        hue_channel(p, q, h),
        hue_channel(p, q, h - 1.0 / 3.0),
    )
}

fn hue_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    match t {
        t if t < 1.0 / 6.0 => p + (q - p) * 6.0 * t,
        t if t < 0.5 => q,
        t if t < 2.0 / 3.0 => p + (q - p) * (2.0 / 3.0 - t) * 6.0,
        _ => p,
    }
}

/// One remote collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub user_name: String,
    pub color: String,
    pub cursor: Option<CursorPosition>,
    pub selection: Option<SelectionRange>,
    pub is_typing: bool,
    typing_updated: Option<Instant>,
}

impl Participant {
    fn new(user_id: &str, user_name: Option<&str>, color: Option<&str>) -> Self {
        Self {
            user_id: user_id.to_owned(),
            user_name: user_name
                .map(str::to_owned)
                .unwrap_or_else(|| placeholder_name(user_id)),
            color: color
                .map(str::to_owned)
                .unwrap_or_else(|| color_for_user(user_id)),
            cursor: None,
            selection: None,
            is_typing: false,
            typing_updated: None,
        }
    }
}

fn placeholder_name(user_id: &str) -> String {
    let short: String = user_id.chars().take(8).collect();
    format!("User-{short}")
}

/// What a presence message changed.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceChange {
    Joined(Participant),
    Left(Participant),
    CursorMoved(String),
    SelectionChanged(String),
    Typing { user_id: String, is_typing: bool },
}

/// Participants on the other connections to one document.
///
/// Keyed by user id, so further tabs of the local user show up under the
/// local user id. The relay never echoes presence to its origin connection;
/// only a join carrying this connection's client id is dropped.
#[derive(Debug)]
pub struct PresenceRoster {
    local_client_id: Uuid,
    participants: FxHashMap<String, Participant>,
    typing_timeout: Duration,
}

impl PresenceRoster {
    pub fn new(local_client_id: Uuid) -> Self {
        Self {
            local_client_id,
            participants: FxHashMap::default(),
            typing_timeout: TYPING_TIMEOUT,
        }
    }

    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    /// Fold one inbound message into the roster.
    ///
    /// Returns `None` for messages that carry no presence, for this
    /// connection's own join, and for leaves of unknown users.
    pub fn handle_message(&mut self, msg: &CollabMessage) -> Option<PresenceChange> {
        if let CollabMessage::UserJoin {
            client_id: Some(client_id),
            ..
        } = msg
        {
            if *client_id == self.local_client_id {
                return None;
            }
        }

        match msg {
            CollabMessage::UserJoin {
                user_id,
                user_name,
                color,
                ..
            } => {
                let mut participant = Participant::new(user_id, user_name.as_deref(), color.as_deref());
                // A rejoin keeps the last known caret.
                if let Some(previous) = self.participants.get(user_id) {
                    participant.cursor = previous.cursor;
                    participant.selection = previous.selection;
                }
                self.participants.insert(user_id.clone(), participant.clone());
                Some(PresenceChange::Joined(participant))
            }
            CollabMessage::UserLeave { user_id, .. } => self
                .participants
                .remove(user_id)
                .map(PresenceChange::Left),
            CollabMessage::CursorChange {
                user_id,
                user_name,
                color,
                position,
            } => {
                let participant = self.touch(user_id, user_name, color);
                participant.cursor = Some(*position);
                participant.selection = None;
                Some(PresenceChange::CursorMoved(user_id.clone()))
            }
            CollabMessage::SelectionChange {
                user_id,
                user_name,
                color,
                selection,
            } => {
                let participant = self.touch(user_id, user_name, color);
                participant.selection = Some(*selection);
                participant.cursor = Some(selection.end());
                Some(PresenceChange::SelectionChanged(user_id.clone()))
            }
            CollabMessage::TypingIndicator { user_id, is_typing } => {
                let participant = self
                    .participants
                    .entry(user_id.clone())
                    .or_insert_with(|| Participant::new(user_id, None, None));
                participant.is_typing = *is_typing;
                participant.typing_updated = is_typing.then(Instant::now);
                Some(PresenceChange::Typing {
                    user_id: user_id.clone(),
                    is_typing: *is_typing,
                })
            }
            _ => None,
        }
    }

    /// Get or create a participant, refreshing name and color.
    fn touch(&mut self, user_id: &str, user_name: &str, color: &str) -> &mut Participant {
        let participant = self
            .participants
            .entry(user_id.to_owned())
            .or_insert_with(|| Participant::new(user_id, Some(user_name), Some(color)));
        if participant.user_name != user_name {
            participant.user_name = user_name.to_owned();
        }
        if participant.color != color {
            participant.color = color.to_owned();
        }
        participant
    }

    /// Clear typing flags not refreshed within the timeout.
    ///
    /// Returns the users whose flag was cleared.
    pub fn expire_typing(&mut self, now: Instant) -> Vec<String> {
        let timeout = self.typing_timeout;
        let mut expired = Vec::new();
        for participant in self.participants.values_mut() {
            let stale = participant
                .typing_updated
                .is_some_and(|at| now.saturating_duration_since(at) >= timeout);
            if participant.is_typing && stale {
                participant.is_typing = false;
                participant.typing_updated = None;
                expired.push(participant.user_id.clone());
            }
        }
        expired
    }

    /// When the next typing flag will expire, if any is set.
    pub fn next_typing_expiry(&self) -> Option<Instant> {
        self.participants
            .values()
            .filter(|p| p.is_typing)
            .filter_map(|p| p.typing_updated)
            .min()
            .map(|at| at + self.typing_timeout)
    }

    /// Rewrite every caret and selection, e.g. after the text changed under them.
    pub fn map_positions(&mut self, mut f: impl FnMut(CursorPosition) -> CursorPosition) {
        for participant in self.participants.values_mut() {
            if let Some(cursor) = participant.cursor.as_mut() {
                *cursor = f(*cursor);
            }
            if let Some(selection) = participant.selection.as_mut() {
                *selection = SelectionRange::new(f(selection.start()), f(selection.end()));
            }
        }
    }

    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.get(user_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }

    pub fn local_client_id(&self) -> Uuid {
        self.local_client_id
    }
}
