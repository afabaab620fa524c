// src/server/health.rs
// GET /health (§6): liveness plus a couple of cheap counters, following the donor's convention
// of a near-trivial health route duplicated at the router root.

use super::AppState;
use crate::error::Result;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    conversation_count: usize,
}

pub async fn health(State(state): State<AppState>) -> Result<Response> {
    let project_id = state.store.default_project_id().await?;
    let conversation_count = state.store.list_conversations(&project_id).await?.len();

    Ok(Json(HealthResponse {
        status: "ok",
        uptime_secs: state.uptime_secs(),
        conversation_count,
    })
    .into_response())
}
