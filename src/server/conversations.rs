// src/server/conversations.rs
// GET /conversations/{id}, GET /conversations/{id}/export, POST /conversations/{id}/autosave.

use super::AppState;
use crate::error::{CoreError, Result};
use crate::transcript::{self, TranscriptFormat};
use crate::view_builder::rounds_from_messages;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Serialize)]
struct ConversationView {
    conversation: crate::store::Conversation,
    rounds: Vec<crate::view_builder::RoundView>,
}

pub async fn get_conversation(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let conversation = state.store.get_conversation(&id).await?;
    let messages = state.store.list_messages(&id).await?;
    let rounds = rounds_from_messages(&messages, &HashMap::new());
    Ok(Json(ConversationView { conversation, rounds }).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    format: Option<String>,
}

pub async fn export_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let format = query
        .format
        .as_deref()
        .and_then(TranscriptFormat::parse)
        .unwrap_or(TranscriptFormat::Markdown);

    let conversation = state.store.get_conversation(&id).await?;
    let messages = state.store.list_messages(&id).await?;
    let rendered = transcript::render(format, &conversation, &messages, &HashMap::new())?;

    let filename = format!("conversation-{id}.{}", format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        rendered,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct AutosaveRequest {
    enabled: bool,
    #[serde(default)]
    format: Option<String>,
}

#[derive(Debug, Serialize)]
struct AutosaveResponse {
    conversation_id: String,
    enabled: bool,
}

pub async fn set_autosave(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AutosaveRequest>,
) -> Result<Response> {
    state.store.get_conversation(&id).await?;

    let format = request
        .format
        .as_deref()
        .and_then(TranscriptFormat::parse)
        .unwrap_or(TranscriptFormat::Markdown);
    state.set_autosave(&id, request.enabled, format).await;

    if request.enabled {
        let conversation = state.store.get_conversation(&id).await?;
        let messages = state.store.list_messages(&id).await?;
        let rendered = transcript::render(format, &conversation, &messages, &HashMap::new())?;
        tokio::fs::create_dir_all(&state.config.transcripts_dir)
            .await
            .map_err(CoreError::from)?;
        let path = state.config.transcripts_dir.join(format!("conversation-{id}.{}", format.extension()));
        tokio::fs::write(&path, rendered).await.map_err(CoreError::from)?;
    }

    Ok(Json(AutosaveResponse { conversation_id: id, enabled: request.enabled }).into_response())
}
