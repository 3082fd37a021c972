//! Two-party relays built on the hub's per-user delivery.
//!
//! - [`direct`] - persisted direct messages, typing indicators, read receipts
//! - [`call`] - call invitations
//!
//! An offline receiver is never an error: the event is simply not sent.

pub mod call;
pub mod direct;

pub use call::call_user;
pub use direct::{mark_read, send_message, stop_typing, typing, DirectOutcome};
