//! Per-document collaboration state.
//!
//! ```text
//!   server text @ server_version
//!          │
//!          ▼  pending_ops[0]  (in flight once transmitted)
//!          ▼  pending_ops[1..] (waiting for the head to be acknowledged)
//!          ▼
//!        text  (what the editing surface shows)
//! ```
//!
//! Only the head of `pending_ops` is ever on the wire. Before the head is
//! first transmitted, every pending operation is composed into one, so a burst
//! of keystrokes becomes a single message. Once transmitted the head keeps its
//! sequence number until acknowledged and is never merged again, which lets
//! the server recognize a resend after a dropped connection.

use std::collections::VecDeque;

use crate::engine::{apply, compose, transform, OtError, Priority};
use crate::operation::Operation;

/// Errors produced by [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A remote operation or acknowledgement skipped a version.
    #[error("out of order: expected version {expected}, received {received}")]
    OutOfOrder { expected: u64, received: u64 },
    /// An acknowledgement arrived with nothing pending.
    #[error("no pending operation to acknowledge")]
    NoPendingOperation,
    #[error(transparent)]
    Ot(#[from] OtError),
}

/// The head pending operation, ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundOperation {
    /// Sequence number identifying this operation for its whole lifetime.
    pub seq: u64,
    /// Server version the operation is based on.
    pub base_version: u64,
    pub operation: Operation,
}

/// Collaboration state for one open document.
#[derive(Debug, Clone)]
pub struct SessionState {
    document_id: String,
    /// Server text with every pending operation applied.
    text: String,
    server_version: u64,
    pending_ops: VecDeque<Operation>,
    /// Sequence number of the head once it has been transmitted.
    head_seq: Option<u64>,
    /// Whether the head is currently on the wire.
    awaiting_ack: bool,
    next_seq: u64,
}

impl SessionState {
    /// Create the state for a freshly opened document.
    pub fn new(document_id: impl Into<String>, text: impl Into<String>, server_version: u64) -> Self {
        Self {
            document_id: document_id.into(),
            text: text.into(),
            server_version,
            pending_ops: VecDeque::new(),
            head_seq: None,
            awaiting_ack: false,
            next_seq: 1,
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// Current text, including all pending local operations.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last version acknowledged by the server.
    pub fn server_version(&self) -> u64 {
        self.server_version
    }

    pub fn pending_ops(&self) -> impl ExactSizeIterator<Item = &Operation> {
        self.pending_ops.iter()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending_ops.is_empty()
    }

    /// Sequence number of the transmitted head, if any.
    pub fn head_seq(&self) -> Option<u64> {
        self.head_seq
    }

    pub fn is_awaiting_ack(&self) -> bool {
        self.awaiting_ack
    }

    /// Apply a local edit optimistically and remember it as pending.
    pub fn record_local_operation(&mut self, op: Operation) -> Result<(), SessionError> {
        self.text = apply(&self.text, &op)?;
        self.pending_ops.push_back(op);
        Ok(())
    }

    /// Integrate an operation another client made at `remote_version`.
    ///
    /// The remote operation is transformed through every pending operation
    /// and each pending operation is rebased onto it. Returns the transformed
    /// remote operation, which is what was applied to [`text`](Self::text).
    /// On error nothing is modified.
    pub fn receive_remote_operation(
        &mut self,
        remote: &Operation,
        remote_version: u64,
    ) -> Result<Operation, SessionError> {
        let expected = self.server_version + 1;
        if remote_version != expected {
            return Err(SessionError::OutOfOrder {
                expected,
                received: remote_version,
            });
        }

        let mut remote = remote.clone();
        let mut rebased = VecDeque::with_capacity(self.pending_ops.len());
        for pending in &self.pending_ops {
            // Local operations win insert ties, matching the server, which
            // orders the incoming operation first.
            let (pending_prime, remote_prime) = transform(pending, &remote, Priority::Left)?;
            rebased.push_back(pending_prime);
            remote = remote_prime;
        }

        let text = apply(&self.text, &remote)?;
        self.text = text;
        self.pending_ops = rebased;
        self.server_version = remote_version;
        Ok(remote)
    }

    /// The server applied the head pending operation at `acked_version`.
    ///
    /// Returns the acknowledged operation.
    pub fn acknowledge_local_operation(&mut self, acked_version: u64) -> Result<Operation, SessionError> {
        if self.pending_ops.is_empty() {
            return Err(SessionError::NoPendingOperation);
        }
        let expected = self.server_version + 1;
        if acked_version != expected {
            return Err(SessionError::OutOfOrder {
                expected,
                received: acked_version,
            });
        }

        let head = self
            .pending_ops
            .pop_front()
            .ok_or(SessionError::NoPendingOperation)?;
        self.server_version = acked_version;
        self.head_seq = None;
        self.awaiting_ack = false;
        Ok(head)
    }

    /// Hand out the head pending operation for transmission.
    ///
    /// Returns `None` when nothing is pending or the head is still awaiting
    /// its acknowledgement.
    pub fn take_outbound(&mut self) -> Result<Option<OutboundOperation>, SessionError> {
        if self.awaiting_ack {
            return Ok(None);
        }
        let Some(first) = self.pending_ops.front() else {
            return Ok(None);
        };

        let seq = match self.head_seq {
            Some(seq) => seq,
            None => {
                let mut composed = first.clone();
                for op in self.pending_ops.iter().skip(1) {
                    composed = compose(&composed, op)?;
                }
                let merged = self.pending_ops.len();
                self.pending_ops.clear();
                self.pending_ops.push_back(composed);

                let seq = self.next_seq;
                self.next_seq += 1;
                self.head_seq = Some(seq);
                log::debug!(
                    "doc {}: composed {merged} pending ops into seq {seq}",
                    self.document_id
                );
                seq
            }
        };

        let operation = self
            .pending_ops
            .front()
            .cloned()
            .ok_or(SessionError::NoPendingOperation)?;
        self.awaiting_ack = true;
        Ok(Some(OutboundOperation {
            seq,
            base_version: self.server_version,
            operation,
        }))
    }

    /// The connection dropped: the head must be transmitted again.
    ///
    /// Returns whether an operation was in flight.
    pub fn requeue_in_flight(&mut self) -> bool {
        std::mem::replace(&mut self.awaiting_ack, false)
    }

    /// Replace the state with a server snapshot.
    ///
    /// Returns how many pending operations were discarded.
    pub fn reset(&mut self, text: impl Into<String>, server_version: u64) -> usize {
        let discarded = self.pending_ops.len();
        self.text = text.into();
        self.server_version = server_version;
        self.pending_ops.clear();
        self.head_seq = None;
        self.awaiting_ack = false;
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::from_text_change;

    fn insert_at(len: usize, at: usize, text: &str) -> Operation {
        Operation::builder()
            .retain(at)
            .insert(text)
            .retain(len - at)
            .build()
    }

    #[test]
    fn test_record_local_applies_optimistically() {
        let mut session = SessionState::new("doc", "Hello", 0);
        session
            .record_local_operation(insert_at(5, 5, "!"))
            .unwrap();

        assert_eq!(session.text(), "Hello!");
        assert_eq!(session.pending_ops().len(), 1);
        assert_eq!(session.server_version(), 0);
    }

    #[test]
    fn test_record_local_rejects_mismatch() {
        let mut session = SessionState::new("doc", "Hello", 0);
        let err = session.record_local_operation(insert_at(3, 0, "x"));
        assert!(matches!(err, Err(SessionError::Ot(OtError::InvalidOperation(_)))));
        assert_eq!(session.text(), "Hello");
        assert!(!session.has_pending());
    }

    #[test]
    fn test_receive_remote_without_pending() {
        let mut session = SessionState::new("doc", "Hello", 3);
        let applied = session
            .receive_remote_operation(&insert_at(5, 0, ">"), 4)
            .unwrap();

        assert_eq!(applied, insert_at(5, 0, ">"));
        assert_eq!(session.text(), ">Hello");
        assert_eq!(session.server_version(), 4);
    }

    #[test]
    fn test_receive_remote_transforms_pending() {
        let mut session = SessionState::new("doc", "Hello World", 0);
        let local = insert_at(11, 6, "Beautiful ");
        session.record_local_operation(local).unwrap();

        let remote = Operation::builder().retain(6).delete(5).build();
        session.receive_remote_operation(&remote, 1).unwrap();

        assert_eq!(session.text(), "Hello Beautiful ");
        assert_eq!(session.server_version(), 1);
        // The pending op is now based on the server's "Hello ".
        let pending: Vec<_> = session.pending_ops().cloned().collect();
        assert_eq!(apply("Hello ", &pending[0]).unwrap(), "Hello Beautiful ");
    }

    #[test]
    fn test_out_of_order_leaves_state_unchanged() {
        let mut session = SessionState::new("doc", "abc", 5);
        session.record_local_operation(insert_at(3, 1, "x")).unwrap();
        let before: Vec<_> = session.pending_ops().cloned().collect();

        let err = session.receive_remote_operation(&insert_at(3, 0, "y"), 7);
        assert_eq!(
            err,
            Err(SessionError::OutOfOrder {
                expected: 6,
                received: 7
            })
        );

        let after: Vec<_> = session.pending_ops().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(session.text(), "axbc");
        assert_eq!(session.server_version(), 5);
    }

    #[test]
    fn test_remote_with_wrong_length_leaves_state_unchanged() {
        let mut session = SessionState::new("doc", "abc", 0);
        session.record_local_operation(insert_at(3, 3, "d")).unwrap();

        let bad = insert_at(10, 0, "z");
        assert!(matches!(
            session.receive_remote_operation(&bad, 1),
            Err(SessionError::Ot(_))
        ));
        assert_eq!(session.text(), "abcd");
        assert_eq!(session.server_version(), 0);
        assert_eq!(session.pending_ops().len(), 1);
    }

    #[test]
    fn test_acknowledge_pops_head() {
        let mut session = SessionState::new("doc", "", 0);
        session.record_local_operation(insert_at(0, 0, "a")).unwrap();
        let out = session.take_outbound().unwrap().unwrap();
        assert_eq!(out.base_version, 0);

        let acked = session.acknowledge_local_operation(1).unwrap();
        assert_eq!(acked, out.operation);
        assert_eq!(session.server_version(), 1);
        assert!(!session.has_pending());
        assert!(!session.is_awaiting_ack());
        assert_eq!(session.head_seq(), None);
    }

    #[test]
    fn test_acknowledge_errors() {
        let mut session = SessionState::new("doc", "", 0);
        assert_eq!(
            session.acknowledge_local_operation(1),
            Err(SessionError::NoPendingOperation)
        );

        session.record_local_operation(insert_at(0, 0, "a")).unwrap();
        assert!(matches!(
            session.acknowledge_local_operation(3),
            Err(SessionError::OutOfOrder { .. })
        ));
        assert_eq!(session.pending_ops().len(), 1);
    }

    #[test]
    fn test_take_outbound_composes_unsent_ops() {
        let mut session = SessionState::new("doc", "", 0);
        for (i, c) in ["a", "b", "c"].iter().enumerate() {
            session.record_local_operation(insert_at(i, i, c)).unwrap();
        }

        let out = session.take_outbound().unwrap().unwrap();
        assert_eq!(out.seq, 1);
        assert_eq!(apply("", &out.operation).unwrap(), "abc");
        assert_eq!(session.pending_ops().len(), 1);

        // Nothing else goes out until the head is acknowledged.
        session.record_local_operation(insert_at(3, 3, "d")).unwrap();
        assert_eq!(session.take_outbound().unwrap(), None);

        session.acknowledge_local_operation(1).unwrap();
        let next = session.take_outbound().unwrap().unwrap();
        assert_eq!(next.seq, 2);
        assert_eq!(next.base_version, 1);
        assert_eq!(apply("abc", &next.operation).unwrap(), "abcd");
    }

    #[test]
    fn test_requeue_resends_same_seq_without_merging() {
        let mut session = SessionState::new("doc", "", 0);
        session.record_local_operation(insert_at(0, 0, "a")).unwrap();
        let first = session.take_outbound().unwrap().unwrap();

        session.record_local_operation(insert_at(1, 1, "b")).unwrap();
        assert!(session.requeue_in_flight());
        assert!(!session.requeue_in_flight());

        let resent = session.take_outbound().unwrap().unwrap();
        assert_eq!(resent.seq, first.seq);
        assert_eq!(resent.operation, first.operation);
        assert_eq!(session.pending_ops().len(), 2);
    }

    #[test]
    fn test_requeued_head_is_rebased_by_remote_ops() {
        let mut session = SessionState::new("doc", "xy", 0);
        session.record_local_operation(insert_at(2, 2, "!")).unwrap();
        session.take_outbound().unwrap().unwrap();

        session
            .receive_remote_operation(&insert_at(2, 0, ">>"), 1)
            .unwrap();
        session.requeue_in_flight();

        let resent = session.take_outbound().unwrap().unwrap();
        assert_eq!(resent.base_version, 1);
        assert_eq!(apply(">>xy", &resent.operation).unwrap(), ">>xy!");
    }

    #[test]
    fn test_reset_discards_pending() {
        let mut session = SessionState::new("doc", "abc", 2);
        session.record_local_operation(insert_at(3, 0, "z")).unwrap();
        session.take_outbound().unwrap();

        let discarded = session.reset("server text", 9);
        assert_eq!(discarded, 1);
        assert_eq!(session.text(), "server text");
        assert_eq!(session.server_version(), 9);
        assert!(!session.has_pending());
        assert!(!session.is_awaiting_ack());
        assert_eq!(session.take_outbound().unwrap(), None);
    }

    /// Text always equals the server text with pending ops applied in order.
    #[test]
    fn test_text_tracks_server_plus_pending() {
        let mut server_text = String::from("The quick fox");
        let mut session = SessionState::new("doc", server_text.clone(), 0);

        let local = from_text_change(session.text(), "The quick brown fox");
        session.record_local_operation(local).unwrap();
        let local2 = from_text_change(session.text(), "The quick brown fox jumps");
        session.record_local_operation(local2).unwrap();

        let remote = from_text_change(&server_text, "A quick fox");
        server_text = apply(&server_text, &remote).unwrap();
        session.receive_remote_operation(&remote, 1).unwrap();

        let mut expected = server_text.clone();
        for op in session.pending_ops() {
            expected = apply(&expected, op).unwrap();
        }
        assert_eq!(session.text(), expected);
        assert_eq!(session.text(), "A quick brown fox jumps");
    }
}
