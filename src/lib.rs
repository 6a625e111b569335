//! # tablepick
//!
//! Session coordination service for small-group dining decisions.
//!
//! A group of 2–4 people joins a short-lived session by code, each
//! privately picks options from a shared candidate list, and only the
//! overlap — the options everyone picked — is revealed once all members
//! have committed. This crate is the coordination engine plus its HTTP
//! and WebSocket embedding; place search, identity, and UI live outside.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket)
//!     │
//!     ├── REST Handlers (api/)
//!     ├── WS Connection (ws/)
//!     │
//!     ├── SessionService (service/)
//!     ├── RoomBus (domain/)
//!     │
//!     └── SessionStore (store/): Redis, in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod ws;
