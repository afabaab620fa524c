// src/server/files.rs
// POST/GET/DELETE /projects/{id}/files[/{file_id}] (§6, §4.2). Indexing is scheduled as a
// background task per §5's "Indexing concurrency" note rather than awaited inline.

use super::AppState;
use crate::error::{CoreError, Result};
use crate::filestore::FileStore;
use crate::store::NewFile;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Files larger than this are rejected outright (§6: "Size > 10 MiB ⇒ 413").
const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreateFileRequest {
    path: String,
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Debug, Serialize)]
struct CreateFileResponse {
    id: String,
    path: String,
    size_bytes: i64,
    content_hash: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

pub async fn create_file(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Json(request): Json<CreateFileRequest>,
) -> Result<Response> {
    let path = FileStore::validate_path(&request.path)?;
    let bytes = request.content.into_bytes();
    if bytes.len() > MAX_FILE_BYTES {
        return Err(CoreError::PayloadTooLarge(format!(
            "file is {} bytes, exceeding the {MAX_FILE_BYTES}-byte limit",
            bytes.len()
        )));
    }

    let mime_type = FileStore::detect_mime(&path);
    let put = state.files.put(bytes).await?;
    let metadata = request.metadata.unwrap_or_else(|| serde_json::json!({}));

    let file = state
        .store
        .upsert_file(
            &project_id,
            NewFile {
                path,
                content: put.inline_text,
                content_location: put.location,
                content_hash: put.hash,
                mime_type,
                size_bytes: put.size,
                metadata,
            },
        )
        .await?;

    let indexer = state.indexer.clone();
    let file_id = file.id.clone();
    tokio::spawn(async move {
        if let Err(e) = indexer.index_file(&file_id).await {
            tracing::warn!(error = %e, file_id, "background file indexing failed");
        }
    });

    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreateFileResponse {
            id: file.id,
            path: file.path,
            size_bytes: file.size_bytes,
            content_hash: file.content_hash,
            created_at: file.created_at,
        }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ListFilesQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    filter: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileSummary {
    id: String,
    path: String,
    size_bytes: i64,
    mime_type: String,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
struct ListFilesResponse {
    files: Vec<FileSummary>,
    total: usize,
}

pub async fn list_files(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Response> {
    let all = state.store.list_files(&project_id).await?;
    let filtered: Vec<_> = match &query.filter {
        Some(pattern) => {
            let matcher = glob_to_matcher(pattern);
            all.into_iter().filter(|f| matcher(&f.path)).collect()
        }
        None => all,
    };

    let total = filtered.len();
    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(50);
    let page = filtered
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(|f| FileSummary { id: f.id, path: f.path, size_bytes: f.size_bytes, mime_type: f.mime_type, updated_at: f.updated_at })
        .collect();

    Ok(Json(ListFilesResponse { files: page, total }).into_response())
}

/// `*` matches any run of characters; everything else is literal. A plain substring match is
/// used when there's no `*` at all, matching the donor's permissive filter conventions.
fn glob_to_matcher(pattern: &str) -> impl Fn(&str) -> bool + '_ {
    move |candidate: &str| {
        if !pattern.contains('*') {
            return candidate.contains(pattern);
        }
        let parts: Vec<&str> = pattern.split('*').collect();
        let mut rest = candidate;
        for (i, part) in parts.iter().enumerate() {
            if part.is_empty() {
                continue;
            }
            match rest.find(part) {
                Some(pos) if i == 0 && pos != 0 => return false,
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
        true
    }
}

#[derive(Debug, Serialize)]
struct FileDetail {
    id: String,
    path: String,
    content: String,
    mime_type: String,
    size_bytes: i64,
    metadata: Value,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

pub async fn get_file(
    State(state): State<AppState>,
    Path((_project_id, file_id)): Path<(String, String)>,
) -> Result<Response> {
    let file = state.store.get_file(&file_id).await?;
    let bytes = state.files.get(file.content.as_deref(), file.content_location.as_deref()).await?;
    let content = String::from_utf8_lossy(&bytes).into_owned();

    Ok(Json(FileDetail {
        id: file.id,
        path: file.path,
        content,
        mime_type: file.mime_type,
        size_bytes: file.size_bytes,
        metadata: file.metadata,
        created_at: file.created_at,
        updated_at: file.updated_at,
    })
    .into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path((_project_id, file_id)): Path<(String, String)>,
) -> Result<Response> {
    let file = state.store.delete_file(&file_id).await?;
    if let Some(location) = &file.content_location {
        state.files.delete(location).await?;
    }
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}
