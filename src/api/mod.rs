//! REST API module using Axum
//!
//! Provides HTTP endpoints for the patrol monitoring console:
//! - /api/v1 operator surface with a consistent response envelope
//! - /ws/alerts WebSocket for live alert push to dashboard viewers

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::push::{self, PushChannel};

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `SENTRY_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development (e.g., `http://localhost:5173` for a Vite dev server).
fn build_cors_layer() -> CorsLayer {
    match std::env::var("SENTRY_CORS_ORIGINS") {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
        }
        Err(_) => {
            // No cross-origin allowed — dashboard is same-origin
            CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
        }
    }
}

/// Create the complete application router: operator API plus alert socket.
pub fn create_app(state: ApiState, push: PushChannel) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .nest("/api/v1", routes::api_routes(state))
        .route("/ws/alerts", get(push::alerts_handler).with_state(push))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
