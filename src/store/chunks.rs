// src/store/chunks.rs
// ContentChunk CRUD, paired with retrieval_index writes. Used by the Indexer (§4.4); deleting a
// source's chunks also clears their retrieval_index rows via trg_chunk_delete_index, so a
// reindex only needs to delete-then-reinsert the chunks table.

use super::types::{new_id, now, row_datetime, ContentChunk, SourceType};
use super::Store;
use crate::error::Result;
use rusqlite::{params, Row};
use serde_json::Value;

pub struct NewChunk {
    pub chunk_index: i64,
    pub content: String,
    pub location: Value,
    pub token_count: i64,
}

fn row_to_chunk(row: &Row) -> rusqlite::Result<ContentChunk> {
    let location_raw: String = row.get("location")?;
    Ok(ContentChunk {
        id: row.get("id")?,
        source_type: row.get("source_type")?,
        source_id: row.get("source_id")?,
        project_id: row.get("project_id")?,
        chunk_index: row.get("chunk_index")?,
        content: row.get("content")?,
        location: serde_json::from_str(&location_raw).unwrap_or(Value::Null),
        token_count: row.get("token_count")?,
        created_at: row_datetime(row, "created_at")?,
    })
}

impl Store {
    /// Replace all chunks (and their index rows, via the cascade trigger) for one source with a
    /// freshly computed set. Runs in one transaction so a reader never observes a partial set.
    pub async fn replace_chunks(
        &self,
        source_type: SourceType,
        source_id: &str,
        project_id: &str,
        chunks: Vec<NewChunk>,
    ) -> Result<Vec<ContentChunk>> {
        let source_type = source_type.as_str().to_string();
        let source_id = source_id.to_string();
        let project_id = project_id.to_string();
        let ts = now();
        let ts_raw = ts.to_rfc3339();

        self.run_txn(move |tx| {
            tx.execute(
                "DELETE FROM content_chunks WHERE source_type = ?1 AND source_id = ?2",
                params![source_type, source_id],
            )?;

            let mut out = Vec::with_capacity(chunks.len());
            for chunk in &chunks {
                let id = new_id();
                let location_raw = serde_json::to_string(&chunk.location)
                    .unwrap_or_else(|_| "null".to_string());

                tx.execute(
                    "INSERT INTO content_chunks
                         (id, source_type, source_id, project_id, chunk_index, content, location, token_count, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        id, source_type, source_id, project_id, chunk.chunk_index, chunk.content,
                        location_raw, chunk.token_count, ts_raw,
                    ],
                )?;
                tx.execute(
                    "INSERT INTO retrieval_index (content, chunk_id, project_id, metadata)
                     VALUES (?1, ?2, ?3, '{}')",
                    params![chunk.content, id, project_id],
                )?;

                out.push(ContentChunk {
                    id,
                    source_type: source_type.clone(),
                    source_id: source_id.clone(),
                    project_id: project_id.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    location: chunk.location.clone(),
                    token_count: chunk.token_count,
                    created_at: ts,
                });
            }
            Ok(out)
        })
        .await
    }

    pub async fn chunks_for_source(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<Vec<ContentChunk>> {
        let source_type = source_type.as_str().to_string();
        let source_id = source_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, source_type, source_id, project_id, chunk_index, content, location, token_count, created_at
                 FROM content_chunks WHERE source_type = ?1 AND source_id = ?2 ORDER BY chunk_index ASC",
            )?;
            let rows = stmt.query_map(params![source_type, source_id], row_to_chunk)?;
            rows.collect()
        })
        .await
    }

    pub async fn delete_chunks_for_source(&self, source_type: SourceType, source_id: &str) -> Result<()> {
        let source_type = source_type.as_str().to_string();
        let source_id = source_id.to_string();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM content_chunks WHERE source_type = ?1 AND source_id = ?2",
                params![source_type, source_id],
            )
        })
        .await?;
        Ok(())
    }
}
