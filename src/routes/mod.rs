pub mod api;
pub mod relay;

use axum::{Router, routing::get};
use http::{Method, header::CONTENT_TYPE};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::handlers::api::health_check;
use crate::state::AppState;

/// Assemble the full application router.
///
/// Health and relay routes are always mounted. When a static directory is
/// configured, `/static` serves it and `/` serves its `index.html`; otherwise
/// `/` answers like `/health`.
pub fn create_app(state: Arc<AppState>) -> Router {
    let root = match state.config.static_dir.as_ref() {
        Some(dir) => {
            info!("Serving static files from {}", dir.display());
            Router::new()
                .nest_service("/static", ServeDir::new(dir))
                .route_service("/", ServeFile::new(dir.join("index.html")))
        }
        None => Router::new().route("/", get(health_check)),
    };

    let security_headers = tower::ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_CONTENT_TYPE_OPTIONS,
            http::HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            http::header::X_FRAME_OPTIONS,
            http::HeaderValue::from_static("DENY"),
        ));

    root.merge(api::create_api_router())
        .merge(relay::create_relay_router(state.clone()))
        .with_state(state.clone())
        .layer(cors_layer(state.config.cors_allowed_origins.as_deref()))
        .layer(security_headers)
}

fn cors_layer(origins: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    match origins {
        Some("*") => base.allow_origin(Any).allow_credentials(false),
        Some(origins) => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            base.allow_origin(origins).allow_credentials(true)
        }
        None => {
            // No allow_origin: browsers block cross-origin requests
            info!(
                "CORS not configured, defaulting to same-origin only. \
                 Set CORS_ALLOWED_ORIGINS to enable cross-origin access."
            );
            base.allow_credentials(false)
        }
    }
}
