//! Client transports. WebSocket is the only one.

pub mod ws;
