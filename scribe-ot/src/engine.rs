//! Pure operational transform functions.
//!
//! All functions are side-effect free and never panic on bad input; a
//! mismatched operation is reported as an [`OtError`].
//!
//! Reference: Ellis & Gibbs, "Concurrency Control in Groupware Systems"

use crate::operation::{split_at_char, Action, Operation, OperationBuilder};

/// Errors produced by the OT engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtError {
    /// The operation does not fit the text it was applied to.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    /// Two operations that must share a length do not.
    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Tie-break used by [`transform`] when both operations insert at the same
/// position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    /// The first operation's insert is ordered first.
    Left,
    /// The second operation's insert is ordered first.
    Right,
}

/// Apply `op` to `text`.
pub fn apply(text: &str, op: &Operation) -> Result<String, OtError> {
    let len = text.chars().count();
    if len != op.base_length() {
        return Err(OtError::InvalidOperation(format!(
            "operation expects base length {}, text has {len}",
            op.base_length()
        )));
    }

    let mut chars = text.chars();
    let mut out = String::with_capacity(text.len());

    for action in op.actions() {
        match action {
            Action::Retain(n) => {
                for _ in 0..*n {
                    let c = chars.next().ok_or_else(past_end)?;
                    out.push(c);
                }
            }
            Action::Insert(inserted) => out.push_str(inserted),
            Action::Delete(n) => {
                for _ in 0..*n {
                    chars.next().ok_or_else(past_end)?;
                }
            }
        }
    }

    if chars.next().is_some() {
        return Err(OtError::InvalidOperation(
            "operation did not consume the whole text".to_string(),
        ));
    }
    Ok(out)
}

fn past_end() -> OtError {
    OtError::InvalidOperation("operation runs past the end of the text".to_string())
}

/// Combine two sequential operations into one.
///
/// `apply(apply(t, first), second) == apply(t, compose(first, second))`.
pub fn compose(first: &Operation, second: &Operation) -> Result<Operation, OtError> {
    if first.target_length() != second.base_length() {
        return Err(OtError::LengthMismatch {
            expected: first.target_length(),
            actual: second.base_length(),
        });
    }

    let mut result = OperationBuilder::new();
    let mut left = first.actions().iter().cloned();
    let mut right = second.actions().iter().cloned();
    let mut a = left.next();
    let mut b = right.next();

    loop {
        match (a.take(), b.take()) {
            (None, None) => break,

            // Deletes from the first and inserts from the second pass straight through.
            (Some(Action::Delete(n)), rest) => {
                result.delete(n);
                a = left.next();
                b = rest;
            }
            (rest, Some(Action::Insert(text))) => {
                result.insert(&text);
                a = rest;
                b = right.next();
            }

            (None, Some(_)) | (Some(_), None) => {
                return Err(OtError::InvalidOperation(
                    "compose ran past the end of an operation".to_string(),
                ));
            }

            (Some(Action::Retain(n1)), Some(Action::Retain(n2))) => {
                let n = n1.min(n2);
                result.retain(n);
                a = Action::Retain(n1).consume(n).or_else(|| left.next());
                b = Action::Retain(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Insert(text)), Some(Action::Delete(n2))) => {
                // Inserted then deleted: both cancel out.
                let n = text.chars().count().min(n2);
                a = Action::Insert(text).consume(n).or_else(|| left.next());
                b = Action::Delete(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Insert(text)), Some(Action::Retain(n2))) => {
                let n = text.chars().count().min(n2);
                result.insert(split_at_char(&text, n).0);
                a = Action::Insert(text).consume(n).or_else(|| left.next());
                b = Action::Retain(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Retain(n1)), Some(Action::Delete(n2))) => {
                let n = n1.min(n2);
                result.delete(n);
                a = Action::Retain(n1).consume(n).or_else(|| left.next());
                b = Action::Delete(n2).consume(n).or_else(|| right.next());
            }
        }
    }

    Ok(result.build())
}

/// Transform two concurrent operations built against the same base text.
///
/// Returns `(a', b')` such that
/// `apply(apply(t, a), b') == apply(apply(t, b), a')`.
pub fn transform(
    a: &Operation,
    b: &Operation,
    priority: Priority,
) -> Result<(Operation, Operation), OtError> {
    if a.base_length() != b.base_length() {
        return Err(OtError::LengthMismatch {
            expected: a.base_length(),
            actual: b.base_length(),
        });
    }

    let mut a_prime = OperationBuilder::new();
    let mut b_prime = OperationBuilder::new();
    let mut left = a.actions().iter().cloned();
    let mut right = b.actions().iter().cloned();
    let mut x = left.next();
    let mut y = right.next();

    loop {
        match (x.take(), y.take()) {
            (None, None) => break,

            (Some(Action::Insert(t1)), Some(Action::Insert(t2))) => match priority {
                Priority::Left => {
                    a_prime.insert(&t1);
                    b_prime.retain(t1.chars().count());
                    x = left.next();
                    y = Some(Action::Insert(t2));
                }
                Priority::Right => {
                    a_prime.retain(t2.chars().count());
                    b_prime.insert(&t2);
                    x = Some(Action::Insert(t1));
                    y = right.next();
                }
            },
            (Some(Action::Insert(text)), rest) => {
                a_prime.insert(&text);
                b_prime.retain(text.chars().count());
                x = left.next();
                y = rest;
            }
            (rest, Some(Action::Insert(text))) => {
                a_prime.retain(text.chars().count());
                b_prime.insert(&text);
                x = rest;
                y = right.next();
            }

            (None, Some(_)) | (Some(_), None) => {
                return Err(OtError::InvalidOperation(
                    "transform ran past the end of an operation".to_string(),
                ));
            }

            (Some(Action::Retain(n1)), Some(Action::Retain(n2))) => {
                let n = n1.min(n2);
                a_prime.retain(n);
                b_prime.retain(n);
                x = Action::Retain(n1).consume(n).or_else(|| left.next());
                y = Action::Retain(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Delete(n1)), Some(Action::Delete(n2))) => {
                // Both deleted the same span; nothing left to do for it.
                let n = n1.min(n2);
                x = Action::Delete(n1).consume(n).or_else(|| left.next());
                y = Action::Delete(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Delete(n1)), Some(Action::Retain(n2))) => {
                let n = n1.min(n2);
                a_prime.delete(n);
                x = Action::Delete(n1).consume(n).or_else(|| left.next());
                y = Action::Retain(n2).consume(n).or_else(|| right.next());
            }
            (Some(Action::Retain(n1)), Some(Action::Delete(n2))) => {
                let n = n1.min(n2);
                b_prime.delete(n);
                x = Action::Retain(n1).consume(n).or_else(|| left.next());
                y = Action::Delete(n2).consume(n).or_else(|| right.next());
            }
        }
    }

    Ok((a_prime.build(), b_prime.build()))
}

/// Build the operation that undoes `op`.
///
/// `original` is the text `op` was applied to.
pub fn invert(op: &Operation, original: &str) -> Result<Operation, OtError> {
    let len = original.chars().count();
    if len != op.base_length() {
        return Err(OtError::InvalidOperation(format!(
            "operation expects base length {}, text has {len}",
            op.base_length()
        )));
    }

    let mut chars = original.chars();
    let mut inverse = OperationBuilder::new();

    for action in op.actions() {
        match action {
            Action::Retain(n) => {
                inverse.retain(*n);
                for _ in 0..*n {
                    chars.next();
                }
            }
            Action::Insert(text) => {
                inverse.delete(text.chars().count());
            }
            Action::Delete(n) => {
                let removed: String = chars.by_ref().take(*n).collect();
                inverse.insert(&removed);
            }
        }
    }

    Ok(inverse.build())
}

/// Derive an operation turning `old` into `new`.
///
/// Uses the common prefix and common suffix of both texts and replaces the
/// middle; the result is deterministic but not character-minimal.
pub fn from_text_change(old: &str, new: &str) -> Operation {
    let old_chars: Vec<char> = old.chars().collect();
    let new_chars: Vec<char> = new.chars().collect();

    let prefix = old_chars
        .iter()
        .zip(&new_chars)
        .take_while(|(a, b)| a == b)
        .count();

    let max_suffix = old_chars.len().min(new_chars.len()) - prefix;
    let suffix = old_chars
        .iter()
        .rev()
        .zip(new_chars.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let deleted = old_chars.len() - prefix - suffix;
    let inserted: String = new_chars[prefix..new_chars.len() - suffix].iter().collect();

    Operation::builder()
        .retain(prefix)
        .delete(deleted)
        .insert(&inserted)
        .retain(suffix)
        .build()
}
