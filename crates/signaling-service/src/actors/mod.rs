//! Actor model for the signaling service.
//!
//! ```text
//! SignalingHubActor (singleton, owns presence and room state)
//! └── holds a handle to N ConnectionActors
//!     └── ConnectionActor (one per WebSocket, owns the write half)
//! ```
//!
//! - **Single writer**: registry and rooms are mutated only inside the hub loop
//! - **CancellationToken propagation**: connection actors get child tokens of the hub
//! - **Bounded mailboxes**: outbound events are `try_send`; a full mailbox drops the event
//!
//! # Modules
//!
//! - [`hub`] - `SignalingHubActor` and its handle
//! - [`connection`] - `ConnectionActor` per WebSocket
//! - [`messages`] - Message types for actor communication
//! - [`metrics`] - Mailbox monitoring and actor metrics
//! - [`mirror`] - Ordered online-flag writes to the user record

pub mod connection;
pub mod hub;
pub mod messages;
pub mod metrics;
pub mod mirror;

pub use connection::{ConnectionActor, ConnectionActorHandle};
pub use hub::{SignalingHubActor, SignalingHubHandle};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxMonitor};
pub use mirror::OnlineMirror;
