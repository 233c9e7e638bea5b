//! API route definitions
//!
//! Organizes endpoints for the monitoring console:
//! - /api/v1/status - console status flags
//! - /api/v1/session - active session snapshot
//! - /api/v1/connectivity - device connectivity table
//! - /api/v1/circuits - circuit generation, log access, and session control
//! - /api/v1/alarm/silence - alarm control

use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers::{self, ApiState};

/// Create all API routes for the console.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/status", get(handlers::get_status))
        .route("/session", get(handlers::get_session))
        .route("/connectivity", get(handlers::get_connectivity))
        // Circuit generation and log
        .route("/circuits", post(handlers::create_circuit))
        .route("/circuits", get(handlers::list_circuits))
        .route("/circuits/:id", get(handlers::get_circuit))
        .route("/circuits/:id", delete(handlers::delete_circuit))
        // Session control
        .route("/circuits/:id/select", post(handlers::select_circuit))
        .route("/circuits/deselect", post(handlers::deselect_circuit))
        .route("/circuits/save", post(handlers::save_circuit))
        .route("/alarm/silence", post(handlers::silence_alarm))
        // Registry reads
        .route("/cards", get(handlers::list_cards))
        .route("/sentries", get(handlers::list_sentries))
        .with_state(state)
}
