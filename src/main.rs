//! tablepick server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tablepick::api;
use tablepick::app_state::AppState;
use tablepick::config::CoordinatorConfig;
use tablepick::domain::RoomBus;
use tablepick::service::{ExpiryCoordinator, SessionLocks, SessionService};
use tablepick::store::SessionStore;
use tablepick::store::redis::RedisStore;
use tablepick::ws::handler::ws_handler;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = CoordinatorConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting tablepick");

    // Connect the store
    let store: Arc<dyn SessionStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    // Build domain + service layer
    let room_bus = Arc::new(RoomBus::new(config.room_channel_capacity));
    let locks = Arc::new(SessionLocks::new());
    let expiry = Arc::new(ExpiryCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&room_bus),
        Arc::clone(&locks),
        config.session_ttl(),
    ));
    let session_service = Arc::new(SessionService::new(
        store,
        Arc::clone(&room_bus),
        locks,
        Arc::clone(&expiry),
        config.catalog_ttl(),
    ));

    // Start the singleton expiry listener (warns and continues if the
    // store cannot provide notifications).
    expiry.initialize().await;

    // Build application state
    let app_state = AppState {
        session_service,
        room_bus,
        expiry,
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
