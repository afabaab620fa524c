// src/server/search.rs
// POST /projects/{id}/search (§4.5, §6).

use super::AppState;
use crate::error::Result;
use crate::search::{search, SearchFilters};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct SearchFiltersInput {
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    exclude_conversations: bool,
    #[serde(default)]
    file_types: Vec<String>,
    #[serde(default)]
    paths: Vec<String>,
}

impl From<SearchFiltersInput> for SearchFilters {
    fn from(input: SearchFiltersInput) -> Self {
        SearchFilters {
            source_type: input.source_type,
            exclude_conversations: input.exclude_conversations,
            file_types: input.file_types,
            paths: input.paths,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
    #[serde(default)]
    filters: SearchFiltersInput,
}

pub async fn search_project(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<SearchRequest>,
) -> Result<Response> {
    let response = search(
        &state.store,
        &project_id,
        &request.query,
        request.limit.unwrap_or(20),
        request.offset.unwrap_or(0),
        request.filters.into(),
    )
    .await?;
    Ok(Json(response).into_response())
}
