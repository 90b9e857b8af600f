//! Relay WebSocket route configuration

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay_handler;
use crate::middleware::connection_limit_middleware;
use crate::state::AppState;
use std::sync::Arc;

/// Create the relay WebSocket router
///
/// # Endpoint
///
/// `GET /ws` - WebSocket upgrade; one relay session per connection
///
/// Upgrades are admitted by the connection limit middleware before the
/// handler runs. See [`crate::handlers::relay`] for the envelope protocol.
pub fn create_relay_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws", get(relay_handler))
        .layer(middleware::from_fn_with_state(
            state,
            connection_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}
