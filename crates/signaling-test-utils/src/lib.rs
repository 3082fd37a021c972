//! # Signaling Test Utilities
//!
//! Mocks and fixtures for testing the signaling service without a real
//! WebSocket or user service.
//!
//! ## Modules
//!
//! - `mock_identity` - token -> identity verifier that records online flags
//! - `mock_store` - message stores that record or fail every call
//! - `fixtures` - test users, signed credentials, seeded directories
//! - `harness` - [`TestHarness`] and [`TestConnection`], sessions over a
//!   channel instead of a socket
//!
//! ## Usage
//!
//! ```rust,ignore
//! use signaling_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let harness = TestHarness::new();
//!     let mut ann = harness.connect(fixtures::ann()).await;
//!
//!     ann.send(ClientEvent::JoinCall(JoinCallRequest::Code("r".into()))).await;
//!     assert!(matches!(ann.next_event().await, ServerEvent::OnlineUsers(_)));
//! }
//! ```

pub mod fixtures;
pub mod harness;
pub mod mock_identity;
pub mod mock_store;

pub use harness::{TestConnection, TestHarness};
pub use mock_identity::MockIdentityVerifier;
pub use mock_store::{FailingMessageStore, RecordingMessageStore};
