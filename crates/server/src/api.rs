//! Ingestion and health endpoints.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{debug, warn};

use logpush_core::normalize_payload;

use crate::state::AppState;

/// `POST /push`: accept one event or an array of events.
///
/// Answers as soon as the events are handed to the engine; delivery results
/// are never reflected in the response.
pub async fn push(State(state): State<Arc<AppState>>, body: Bytes) -> StatusCode {
    let generation = state.current().await;

    match normalize_payload(&body, generation.config.time_zone) {
        Ok(events) => {
            debug!(events = events.len(), generation = %generation.id, "payload accepted");
            generation.ingest(events);
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "payload rejected");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub generation: String,
    pub rules: usize,
    pub config: serde_json::Value,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let generation = state.current().await;
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        generation: generation.id.to_string(),
        rules: generation.engine.registry().len(),
        config: generation.config.redacted_summary(),
    })
}
