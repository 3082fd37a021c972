//! Realtime signaling core.
//!
//! Tracks who is connected, relays direct messages and call invitations
//! between two users, and brokers mesh peer-to-peer rooms (roster, SDP/ICE
//! relay by connection id, in-room chat with backlog replay).
//!
//! # Architecture
//!
//! ```text
//! WebSocket ──> Session ──> SignalingHubActor (registry + rooms)
//!                  │               │
//!                  │               └── ConnectionActor per socket ──> WebSocket
//!                  └── MessageStore / IdentityVerifier
//! ```
//!
//! - Credentials are verified before a connection is admitted
//! - Presence and room state have exactly one writer, the hub actor
//! - Outbound events go through bounded per-connection mailboxes
//! - Disconnect always runs room leave, registry removal and presence broadcast
//!
//! # Modules
//!
//! - [`actors`] - hub and connection actors
//! - [`registry`] / [`rooms`] - pure state owned by the hub
//! - [`relay`] - direct messages and call invitations
//! - [`session`] / [`transport`] - per-connection dispatch and WebSocket I/O
//! - [`routes`] - HTTP router and shared state
//! - [`identity`], [`directory`], [`store`] - collaborator seams

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod actors;
pub mod config;
pub mod directory;
pub mod errors;
pub mod identity;
pub mod observability;
pub mod presence;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod rooms;
pub mod routes;
pub mod session;
pub mod store;
pub mod transport;
