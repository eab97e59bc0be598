//! Operation representation for operational transform.
//!
//! An [`Operation`] is an ordered sequence of [`Action`]s that walks a text
//! from left to right:
//!
//! ```text
//!   base:    H e l l o ␠ W o r l d
//!            └─ retain 6 ─┘ └ delete 5 ┘
//!   insert "Beautiful " ───┘
//!   target:  H e l l o ␠ B e a u t i f u l ␠
//! ```
//!
//! Lengths are counted in Unicode scalar values (`char`s), never bytes.
//! Operations are only built through [`OperationBuilder`], which elides
//! zero-length actions and merges adjacent actions of the same kind, so two
//! operations with the same effect compare equal.

use serde::{Deserialize, Serialize};

use crate::engine::OtError;

/// A single step of an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Skip over `n` characters unchanged.
    Retain(usize),
    /// Insert literal text at the current position.
    Insert(String),
    /// Remove `n` characters.
    Delete(usize),
}

impl Action {
    /// Length of the action in characters.
    pub fn len(&self) -> usize {
        match self {
            Action::Retain(n) | Action::Delete(n) => *n,
            Action::Insert(text) => text.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consume the first `n` characters of this action and return what is
    /// left, or `None` when nothing remains.
    pub(crate) fn consume(self, n: usize) -> Option<Action> {
        match self {
            Action::Retain(len) if len > n => Some(Action::Retain(len - n)),
            Action::Delete(len) if len > n => Some(Action::Delete(len - n)),
            Action::Insert(text) => {
                let (_, rest) = split_at_char(&text, n);
                if rest.is_empty() {
                    None
                } else {
                    Some(Action::Insert(rest.to_owned()))
                }
            }
            _ => None,
        }
    }
}

/// Split `text` after `n` characters.
pub(crate) fn split_at_char(text: &str, n: usize) -> (&str, &str) {
    match text.char_indices().nth(n) {
        Some((idx, _)) => text.split_at(idx),
        None => (text, ""),
    }
}

/// An immutable, canonical text operation.
///
/// Invariants:
/// - `retain + delete` lengths sum to `base_length`
/// - `retain + insert` lengths sum to `target_length`
/// - no zero-length actions, no two adjacent actions of the same kind
/// - an insert never directly follows a delete
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawOperation")]
pub struct Operation {
    #[serde(rename = "ops")]
    actions: Vec<Action>,
    #[serde(rename = "baseLength")]
    base_length: usize,
    #[serde(rename = "targetLength")]
    target_length: usize,
}

impl Operation {
    /// Start building a new operation.
    pub fn builder() -> OperationBuilder {
        OperationBuilder::new()
    }

    /// The operation that leaves a text of `len` characters unchanged.
    pub fn identity(len: usize) -> Self {
        OperationBuilder::new().retain(len).build()
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Length of the text this operation applies to.
    pub fn base_length(&self) -> usize {
        self.base_length
    }

    /// Length of the text this operation produces.
    pub fn target_length(&self) -> usize {
        self.target_length
    }

    /// Whether applying this operation leaves the text unchanged.
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(|a| matches!(a, Action::Retain(_)))
    }

    /// Map a character offset in the base text to the matching offset in the
    /// target text.
    ///
    /// Text inserted exactly at `index` pushes the index to the right; an
    /// index inside a deleted range collapses to the start of that range.
    pub fn transform_index(&self, index: usize) -> usize {
        let mut remaining = index as isize;
        let mut new_index = index as isize;

        for action in &self.actions {
            match action {
                Action::Retain(n) => remaining -= *n as isize,
                Action::Insert(text) => new_index += text.chars().count() as isize,
                Action::Delete(n) => {
                    new_index -= remaining.min(*n as isize);
                    remaining -= *n as isize;
                }
            }
            if remaining < 0 {
                break;
            }
        }

        new_index.max(0) as usize
    }
}

/// Wire shape of an operation before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    ops: Vec<Action>,
    base_length: usize,
    target_length: usize,
}

impl TryFrom<RawOperation> for Operation {
    type Error = OtError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let mut builder = OperationBuilder::new();
        for action in raw.ops {
            if action.is_empty() {
                return Err(OtError::InvalidOperation(
                    "zero-length action".to_string(),
                ));
            }
            builder.push(action);
        }
        let op = builder.build();

        if op.base_length != raw.base_length {
            return Err(OtError::LengthMismatch {
                expected: raw.base_length,
                actual: op.base_length,
            });
        }
        if op.target_length != raw.target_length {
            return Err(OtError::LengthMismatch {
                expected: raw.target_length,
                actual: op.target_length,
            });
        }
        Ok(op)
    }
}

/// Incremental builder that keeps operations canonical.
#[derive(Debug, Clone, Default)]
pub struct OperationBuilder {
    actions: Vec<Action>,
    base_length: usize,
    target_length: usize,
}

impl OperationBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip `n` characters.
    pub fn retain(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.base_length += n;
        self.target_length += n;
        if let Some(Action::Retain(last)) = self.actions.last_mut() {
            *last += n;
        } else {
            self.actions.push(Action::Retain(n));
        }
        self
    }

    /// Insert `text` at the current position.
    pub fn insert(&mut self, text: &str) -> &mut Self {
        if text.is_empty() {
            return self;
        }
        self.target_length += text.chars().count();

        if let Some(Action::Insert(last)) = self.actions.last_mut() {
            last.push_str(text);
            return self;
        }

        // Inserts are kept in front of an adjacent delete.
        let n = self.actions.len();
        if matches!(self.actions.last(), Some(Action::Delete(_))) {
            if n >= 2 {
                if let Action::Insert(prev) = &mut self.actions[n - 2] {
                    prev.push_str(text);
                    return self;
                }
            }
            self.actions.insert(n - 1, Action::Insert(text.to_owned()));
            return self;
        }

        self.actions.push(Action::Insert(text.to_owned()));
        self
    }

    /// Remove `n` characters.
    pub fn delete(&mut self, n: usize) -> &mut Self {
        if n == 0 {
            return self;
        }
        self.base_length += n;
        if let Some(Action::Delete(last)) = self.actions.last_mut() {
            *last += n;
        } else {
            self.actions.push(Action::Delete(n));
        }
        self
    }

    /// Append any action.
    pub fn push(&mut self, action: Action) -> &mut Self {
        match action {
            Action::Retain(n) => self.retain(n),
            Action::Insert(text) => self.insert(&text),
            Action::Delete(n) => self.delete(n),
        }
    }

    /// Finish the operation, leaving the builder empty.
    pub fn build(&mut self) -> Operation {
        Operation {
            actions: std::mem::take(&mut self.actions),
            base_length: std::mem::take(&mut self.base_length),
            target_length: std::mem::take(&mut self.target_length),
        }
    }
}
