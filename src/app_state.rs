//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::domain::RoomBus;
use crate::service::{ExpiryCoordinator, SessionService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Session service for all business logic.
    pub session_service: Arc<SessionService>,
    /// Room bus for WebSocket subscriptions.
    pub room_bus: Arc<RoomBus>,
    /// Expiry listener handle (process-scoped singleton; `main` owns its
    /// `initialize`/`shutdown` lifecycle).
    pub expiry: Arc<ExpiryCoordinator>,
}
