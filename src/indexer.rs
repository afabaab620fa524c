//! Turns a stored file or message into searchable chunks (§4.4).

use crate::chunker::{chunk_file, chunk_message};
use crate::error::Result;
use crate::filestore::FileStore;
use crate::store::{NewChunk, SourceType, Store};
use serde::Serialize;
use serde_json::json;

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum IndexOutcome {
    Indexed {
        source_id: String,
        chunks_written: usize,
        chunk_ids: Vec<String>,
    },
    Skipped {
        skipped: bool,
    },
}

impl IndexOutcome {
    fn skipped() -> Self {
        IndexOutcome::Skipped { skipped: true }
    }
}

pub struct Indexer {
    store: Store,
    files: FileStore,
}

impl Indexer {
    pub fn new(store: Store, files: FileStore) -> Self {
        Self { store, files }
    }

    pub async fn index_file(&self, file_id: &str) -> Result<IndexOutcome> {
        let existing = self
            .store
            .chunks_for_source(SourceType::File, file_id)
            .await?;
        if !existing.is_empty() {
            return Ok(IndexOutcome::skipped());
        }

        let file = self.store.get_file(file_id).await?;
        if !file.retrieval_eligible() {
            return Ok(IndexOutcome::skipped());
        }

        let content = match (&file.content, &file.content_location) {
            (Some(inline), _) => inline.clone(),
            (None, Some(location)) => {
                let bytes = self.files.get(None, Some(location)).await?;
                match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => return Ok(IndexOutcome::skipped()),
                }
            }
            (None, None) => return Ok(IndexOutcome::skipped()),
        };

        let chunks = chunk_file(&file.path, &content)
            .into_iter()
            .map(|c| NewChunk {
                chunk_index: c.chunk_index,
                content: c.content,
                location: c.location,
                token_count: c.token_count,
            })
            .collect::<Vec<_>>();

        let written = self
            .store
            .replace_chunks(SourceType::File, file_id, &file.project_id, chunks)
            .await?;

        let mut metadata = file.metadata.clone();
        if let Some(obj) = metadata.as_object_mut() {
            obj.insert(
                "last_indexed_at".to_string(),
                json!(crate::store::now().to_rfc3339()),
            );
        }
        self.store
            .upsert_file(
                &file.project_id,
                crate::store::NewFile {
                    path: file.path,
                    content: file.content,
                    content_location: file.content_location,
                    content_hash: file.content_hash,
                    mime_type: file.mime_type,
                    size_bytes: file.size_bytes,
                    metadata,
                },
            )
            .await?;

        Ok(IndexOutcome::Indexed {
            source_id: file_id.to_string(),
            chunks_written: written.len(),
            chunk_ids: written.into_iter().map(|c| c.id).collect(),
        })
    }

    pub async fn index_message(&self, message_id: &str) -> Result<IndexOutcome> {
        let existing = self
            .store
            .chunks_for_source(SourceType::ConversationMessage, message_id)
            .await?;
        if !existing.is_empty() {
            return Ok(IndexOutcome::skipped());
        }

        let message = self.store.get_message(message_id).await?;
        let conversation = self.store.get_conversation(&message.conversation_id).await?;

        let chunks = chunk_message(message.round_number, &message.speaker, &message.content)
            .into_iter()
            .map(|c| NewChunk {
                chunk_index: c.chunk_index,
                content: c.content,
                location: c.location,
                token_count: c.token_count,
            })
            .collect::<Vec<_>>();

        let written = self
            .store
            .replace_chunks(
                SourceType::ConversationMessage,
                message_id,
                &conversation.project_id,
                chunks,
            )
            .await?;

        Ok(IndexOutcome::Indexed {
            source_id: message_id.to_string(),
            chunks_written: written.len(),
            chunk_ids: written.into_iter().map(|c| c.id).collect(),
        })
    }

    /// Reindex every file in a project. Per-file failures are reported, not fatal to the batch.
    pub async fn reindex_project(&self, project_id: &str) -> Vec<(String, Result<IndexOutcome>)> {
        let files = match self.store.list_files(project_id).await {
            Ok(files) => files,
            Err(e) => return vec![(project_id.to_string(), Err(e))],
        };

        let mut results = Vec::with_capacity(files.len());
        for file in files {
            let outcome = self.index_file(&file.id).await;
            results.push((file.id, outcome));
        }
        results
    }
}
