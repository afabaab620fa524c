// src/server/preview.rs
// POST /preview-view (§6): the exact view a target would receive for a draft turn, built
// directly from ViewBuilder — no adapter is invoked and nothing is persisted.

use super::AppState;
use crate::error::Result;
use crate::orchestrator::{SystemPromptsInput, TextAttachmentInput};
use crate::provider::AdapterMessage;
use crate::view_builder::{self, Attachment as ViewAttachment, SystemPromptConfig, Target};
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(default)]
    conversation_id: Option<String>,
    provider: String,
    model_id: String,
    #[serde(default)]
    agent_id: Option<String>,
    user_message: String,
    #[serde(default)]
    system_prompts: Option<SystemPromptsInput>,
    #[serde(default)]
    text_attachments: Vec<TextAttachmentInput>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    system: String,
    messages: Vec<AdapterMessage>,
}

pub async fn preview_view(State(state): State<AppState>, Json(request): Json<PreviewRequest>) -> Result<Response> {
    let provider = request.provider.to_lowercase();
    let agent_id = request.agent_id.unwrap_or_else(|| format!("{provider}:{}:0", request.model_id));
    let target = Target { provider, model_id: request.model_id, agent_id };

    let prior_messages = match &request.conversation_id {
        Some(id) => state.store.list_messages(id).await.unwrap_or_default(),
        None => Vec::new(),
    };
    let display_names = HashMap::new();
    let rounds = view_builder::rounds_from_messages(&prior_messages, &display_names);

    let prompts = request.system_prompts.unwrap_or_default();
    let cfg = SystemPromptConfig {
        common_template: prompts
            .common_template
            .unwrap_or_else(|| "You are {{modelId}}, participating in a multi-agent conversation.".to_string()),
        per_agent: prompts.per_agent,
        per_model: prompts.per_model,
        provider_default: None,
    };

    let attachments: Vec<ViewAttachment> = request
        .text_attachments
        .into_iter()
        .map(|a| ViewAttachment { title: a.title, content: a.content })
        .collect();

    let view = view_builder::build_view(&target, &cfg, &rounds, &attachments, &request.user_message);
    Ok(Json(PreviewResponse { system: view.system, messages: view.messages }).into_response())
}
