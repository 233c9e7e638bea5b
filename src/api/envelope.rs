//! Response envelope and operator-visible error taxonomy.
//!
//! Every endpoint returns one JSON shape: `{ "data": ..., "meta": ... }` on
//! success, `{ "error": { "code", "message" }, "meta": ... }` on failure.
//! Store and schedule failures convert into [`ApiError`] here, so handlers
//! stay a thin translation layer over the coordinator and store.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::schedule::ScheduleError;
use crate::store::StoreError;

const API_VERSION: &str = "1";

#[derive(Debug, Serialize)]
struct Meta {
    timestamp: String,
    version: &'static str,
}

impl Meta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: API_VERSION,
        }
    }
}

/// Wrap a successful payload as `{ "data": ..., "meta": ... }`.
pub fn ok<T: Serialize>(data: T) -> Response {
    #[derive(Serialize)]
    struct Body<T> {
        data: T,
        meta: Meta,
    }
    (
        StatusCode::OK,
        axum::Json(Body {
            data,
            meta: Meta::now(),
        }),
    )
        .into_response()
}

/// A failure the operator gets to see. Everything an endpoint can fail with
/// collapses into one of three shapes; the message is dashboard copy, not a
/// debug dump.
#[derive(Debug)]
pub enum ApiError {
    /// The referenced record does not exist
    NotFound(String),
    /// The request itself is unacceptable
    BadRequest(String),
    /// The store or another internal component failed
    Internal(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn parts(&self) -> (StatusCode, &'static str, &str) {
        match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct Detail<'a> {
            code: &'static str,
            message: &'a str,
        }
        #[derive(Serialize)]
        struct Body<'a> {
            error: Detail<'a>,
            meta: Meta,
        }

        let (status, code, message) = self.parts();
        (
            status,
            axum::Json(Body {
                error: Detail { code, message },
                meta: Meta::now(),
            }),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound("circuit") => Self::not_found("Circuit not found."),
            StoreError::NotFound(what) => Self::not_found(format!("{what} not found.")),
            StoreError::Database(_) | StoreError::Serialization(_) => {
                warn!(error = %e, "Record store failure surfaced to operator");
                Self::internal("Record store unavailable.")
            }
        }
    }
}

impl From<ScheduleError> for ApiError {
    fn from(e: ScheduleError) -> Self {
        // Every generation failure is a bad set of inputs, phrased by the
        // schedule module itself.
        Self::bad_request(e.to_string())
    }
}
