//! WebSocket layer: connection handling, command routing, room delivery.
//!
//! The WebSocket endpoint at `/ws` carries the realtime session
//! commands (join, submit, restart, leave) and delivers room broadcasts.
//! Each connection is one participant identity for its whole lifetime.

pub mod connection;
pub mod handler;
pub mod messages;
