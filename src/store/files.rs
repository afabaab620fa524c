// src/store/files.rs
// ProjectFile CRUD. Upsert by (project_id, path); deleting a file cascades into its
// content_chunks (and from there into retrieval_index) via the schema triggers.

use super::types::{new_id, now, row_datetime, ProjectFile};
use super::Store;
use crate::error::{CoreError, Result};
use rusqlite::{params, Row};
use serde_json::Value;

fn row_to_file(row: &Row) -> rusqlite::Result<ProjectFile> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(ProjectFile {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        path: row.get("path")?,
        content: row.get("content")?,
        content_location: row.get("content_location")?,
        content_hash: row.get("content_hash")?,
        mime_type: row.get("mime_type")?,
        size_bytes: row.get("size_bytes")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
        created_at: row_datetime(row, "created_at")?,
        updated_at: row_datetime(row, "updated_at")?,
    })
}

pub struct NewFile {
    pub path: String,
    pub content: Option<String>,
    pub content_location: Option<String>,
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: Value,
}

impl Store {
    /// Insert or replace the file at `(project_id, path)`. The caller (FileStore) has already
    /// decided between inline `content` and on-disk `content_location` per the size threshold.
    pub async fn upsert_file(&self, project_id: &str, file: NewFile) -> Result<ProjectFile> {
        if !self.project_exists(project_id).await? {
            return Err(CoreError::not_found(format!("project {project_id} not found")));
        }

        let project_id = project_id.to_string();
        let ts = now();
        let metadata_raw = serde_json::to_string(&file.metadata)?;

        let existing_id: Option<String> = {
            let project_id = project_id.clone();
            let path = file.path.clone();
            self.run(move |conn| {
                conn.query_row(
                    "SELECT id FROM project_files WHERE project_id = ?1 AND path = ?2",
                    params![project_id, path],
                    |r| r.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(e),
                })
            })
            .await?
        };

        let id = existing_id.clone().unwrap_or_else(new_id);
        let created_at = ts;

        let record = ProjectFile {
            id: id.clone(),
            project_id: project_id.clone(),
            path: file.path.clone(),
            content: file.content.clone(),
            content_location: file.content_location.clone(),
            content_hash: file.content_hash.clone(),
            mime_type: file.mime_type.clone(),
            size_bytes: file.size_bytes,
            metadata: file.metadata.clone(),
            created_at,
            updated_at: ts,
        };

        let r = record.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO project_files
                     (id, project_id, path, content, content_location, content_hash, mime_type,
                      size_bytes, metadata, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                 ON CONFLICT(project_id, path) DO UPDATE SET
                     content = excluded.content,
                     content_location = excluded.content_location,
                     content_hash = excluded.content_hash,
                     mime_type = excluded.mime_type,
                     size_bytes = excluded.size_bytes,
                     metadata = excluded.metadata,
                     updated_at = excluded.updated_at",
                params![
                    r.id, r.project_id, r.path, r.content, r.content_location, r.content_hash,
                    r.mime_type, r.size_bytes, metadata_raw, r.created_at.to_rfc3339(), r.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    pub async fn get_file(&self, id: &str) -> Result<ProjectFile> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, project_id, path, content, content_location, content_hash, mime_type,
                        size_bytes, metadata, created_at, updated_at
                 FROM project_files WHERE id = ?1",
                params![id],
                row_to_file,
            )
        })
        .await
        .map_err(|e| match e {
            CoreError::Db(rusqlite::Error::QueryReturnedNoRows) => CoreError::not_found("file not found"),
            other => other,
        })
    }

    pub async fn get_file_by_path(&self, project_id: &str, path: &str) -> Result<ProjectFile> {
        let project_id = project_id.to_string();
        let path = path.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, project_id, path, content, content_location, content_hash, mime_type,
                        size_bytes, metadata, created_at, updated_at
                 FROM project_files WHERE project_id = ?1 AND path = ?2",
                params![project_id, path],
                row_to_file,
            )
        })
        .await
        .map_err(|e| match e {
            CoreError::Db(rusqlite::Error::QueryReturnedNoRows) => CoreError::not_found("file not found"),
            other => other,
        })
    }

    pub async fn list_files(&self, project_id: &str) -> Result<Vec<ProjectFile>> {
        let project_id = project_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, path, content, content_location, content_hash, mime_type,
                        size_bytes, metadata, created_at, updated_at
                 FROM project_files WHERE project_id = ?1 ORDER BY path ASC",
            )?;
            let rows = stmt.query_map(params![project_id], row_to_file)?;
            rows.collect()
        })
        .await
    }

    /// Delete a file. Returns the deleted row so the caller can remove its on-disk blob, if any.
    pub async fn delete_file(&self, id: &str) -> Result<ProjectFile> {
        let file = self.get_file(id).await?;
        let delete_id = id.to_string();
        self.run(move |conn| conn.execute("DELETE FROM project_files WHERE id = ?1", params![delete_id]))
            .await?;
        Ok(file)
    }
}
