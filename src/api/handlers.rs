//! Operator-facing API handlers.
//!
//! Operator actions (select/deselect/save/silence) and rendering snapshots.
//! Validation outcomes of an operator's own action come back in the response
//! message; device-originated failures never surface here — they appear as
//! alarms or connectivity changes on the push channel.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::envelope::{self, ApiError};
use crate::coordinator::Coordinator;
use crate::schedule;
use crate::store::{RecordStore, StoreError};
use crate::types::Assignment;

/// Shared state for the operator surface.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    pub store: RecordStore,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(coordinator: Arc<Coordinator>, store: RecordStore) -> Self {
        Self {
            coordinator,
            store,
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Status & Snapshots
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub shift_active: bool,
    pub alarm_active: bool,
    pub completed: bool,
    pub broker_connected: bool,
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Response {
    let session = state.coordinator.session_snapshot().await;
    let connectivity = state.coordinator.connectivity_snapshot().await;

    envelope::ok(StatusResponse {
        uptime_secs: state.started_at.elapsed().as_secs(),
        shift_active: session.active,
        alarm_active: session.alarm_active,
        completed: session.completed,
        broker_connected: connectivity.get("console").copied().unwrap_or(false),
    })
}

/// GET /api/v1/session
pub async fn get_session(State(state): State<ApiState>) -> Response {
    envelope::ok(state.coordinator.session_snapshot().await)
}

/// GET /api/v1/connectivity
pub async fn get_connectivity(State(state): State<ApiState>) -> Response {
    envelope::ok(state.coordinator.connectivity_snapshot().await)
}

// ============================================================================
// Circuit Generation & Log
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct GenerateCircuitRequest {
    /// Full names of the sentries on shift
    pub sentries: Vec<String>,
    /// RFID ids of the cards issued to them, in the same order
    pub cards: Vec<String>,
    /// Shift date (ISO `YYYY-MM-DD`)
    pub date: NaiveDate,
    /// Shift start time (`HH:MM:SS`)
    pub start: NaiveTime,
    pub duration_hours: u32,
    pub duration_minutes: u32,
}

/// POST /api/v1/circuits — generate and persist a circuit
pub async fn create_circuit(
    State(state): State<ApiState>,
    Json(req): Json<GenerateCircuitRequest>,
) -> Response {
    if req.sentries.len() != req.cards.len() {
        return ApiError::bad_request("Number of selected sentries and cards must be equal.")
            .into_response();
    }
    if req.sentries.is_empty() {
        return ApiError::bad_request("At least one sentry must be assigned.").into_response();
    }

    let mut assignments = Vec::with_capacity(req.sentries.len());
    for (sentry, card_id) in req.sentries.iter().zip(&req.cards) {
        let card = match state.store.get_card(card_id) {
            Ok(Some(card)) => card,
            Ok(None) => {
                return ApiError::bad_request(format!("Card {card_id} is not registered."))
                    .into_response();
            }
            Err(e) => return ApiError::from(e).into_response(),
        };
        assignments.push(Assignment {
            sentry: sentry.clone(),
            card_alias: card.alias,
            card_id: card.rfid_id,
        });
    }

    let route = match schedule::generate(
        &crate::config::get().patrol,
        &assignments,
        req.date,
        req.start,
        req.duration_hours,
        req.duration_minutes,
    ) {
        Ok(route) => route,
        Err(e) => return ApiError::from(e).into_response(),
    };

    match state.store.create_circuit(
        route.start,
        route.end,
        assignments,
        route.circuit,
        route.paths,
    ) {
        Ok(stored) => envelope::ok(stored),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// GET /api/v1/circuits
pub async fn list_circuits(State(state): State<ApiState>) -> Response {
    envelope::ok(state.store.list_circuits())
}

/// GET /api/v1/circuits/:id
pub async fn get_circuit(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.store.get_circuit(id) {
        Ok(circuit) => envelope::ok(circuit),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// DELETE /api/v1/circuits/:id
pub async fn delete_circuit(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.store.delete_circuit(id) {
        Ok(()) => envelope::ok(serde_json::json!({"message": "Shift deleted."})),
        Err(e) => ApiError::from(e).into_response(),
    }
}

// ============================================================================
// Session Control
// ============================================================================

/// POST /api/v1/circuits/:id/select
pub async fn select_circuit(State(state): State<ApiState>, Path(id): Path<u64>) -> Response {
    match state.coordinator.select_circuit(id).await {
        Ok(()) => envelope::ok(serde_json::json!({"message": "Shift set!"})),
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST /api/v1/circuits/deselect
pub async fn deselect_circuit(State(state): State<ApiState>) -> Response {
    state.coordinator.deselect_circuit().await;
    envelope::ok(serde_json::json!({"message": "Shift deselected."}))
}

/// POST /api/v1/circuits/save
pub async fn save_circuit(State(state): State<ApiState>) -> Response {
    match state.coordinator.save_current_circuit().await {
        Ok(()) => envelope::ok(serde_json::json!({"message": "Current circuit saved."})),
        Err(StoreError::NotFound(_)) => {
            ApiError::not_found("No stored circuit to save to.").into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

/// POST /api/v1/alarm/silence
pub async fn silence_alarm(State(state): State<ApiState>) -> Response {
    state.coordinator.silence_alarm().await;
    envelope::ok(serde_json::json!({"message": "Alarm silenced."}))
}

// ============================================================================
// Registry Reads
// ============================================================================

/// GET /api/v1/cards
pub async fn list_cards(State(state): State<ApiState>) -> Response {
    envelope::ok(state.store.list_cards())
}

/// GET /api/v1/sentries
pub async fn list_sentries(State(state): State<ApiState>) -> Response {
    envelope::ok(state.store.list_sentries())
}
