//! # scribe-ot — Operational transform core for Scribe
//!
//! Pure building blocks for real-time collaborative text editing. Nothing in
//! this crate performs I/O; the network and editor bindings live in
//! `scribe-collab`.
//!
//! ## Architecture
//!
//! ```text
//!  local edit                         remote text-change
//!      │                                     │
//!      ▼                                     ▼
//!  from_text_change()              SessionState::receive_remote_operation()
//!      │                                     │  transform() against pending
//!      ▼                                     ▼
//!  SessionState::record_local_operation()   apply()
//!      │                                     │
//!      ▼                                     ▼
//!  take_outbound() ── compose() ──►  wire     text shown by the editor
//! ```
//!
//! ## Modules
//!
//! - [`operation`] — canonical retain/insert/delete operations and builder
//! - [`engine`] — apply, compose, transform, invert, diff
//! - [`session`] — per-document version and pending-operation tracking

pub mod operation;
pub mod engine;
pub mod session;

pub use operation::{Action, Operation, OperationBuilder};
pub use engine::{apply, compose, from_text_change, invert, transform, OtError, Priority};
pub use session::{OutboundOperation, SessionError, SessionState};
