// src/store/messages.rs
// ConversationMessage CRUD. The one operation that must be atomic (§4.1, §8 invariant 2) is
// appending the user message that opens a new round: it both inserts the row and bumps
// `conversations.round_count` in the same transaction, so a crash between the two can never be
// observed by a reader.

use super::types::{new_id, now, row_datetime, ConversationMessage};
use super::Store;
use crate::error::{CoreError, Result};
use rusqlite::{params, Row};
use serde_json::Value;

fn row_to_message(row: &Row) -> rusqlite::Result<ConversationMessage> {
    let metadata_raw: String = row.get("metadata")?;
    Ok(ConversationMessage {
        id: row.get("id")?,
        conversation_id: row.get("conversation_id")?,
        round_number: row.get("round_number")?,
        speaker: row.get("speaker")?,
        content: row.get("content")?,
        metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
        created_at: row_datetime(row, "created_at")?,
    })
}

impl Store {
    /// Open a new round: insert the user's message at `round_count + 1` and bump
    /// `conversations.round_count` to match, atomically.
    pub async fn start_round(&self, conversation_id: &str, content: String) -> Result<ConversationMessage> {
        let conversation_id = conversation_id.to_string();
        let id = new_id();
        let ts = now();
        let ts_raw = ts.to_rfc3339();

        self.run_txn(move |tx| {
            let round_number: i64 = tx.query_row(
                "SELECT round_count FROM conversations WHERE id = ?1",
                params![conversation_id],
                |r| r.get(0),
            )? + 1;

            tx.execute(
                "INSERT INTO conversation_messages
                     (id, conversation_id, round_number, speaker, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, 'user', ?4, '{}', ?5)",
                params![id, conversation_id, round_number, content, ts_raw],
            )?;
            tx.execute(
                "UPDATE conversations SET round_count = ?1, updated_at = ?2 WHERE id = ?3",
                params![round_number, ts_raw, conversation_id],
            )?;

            Ok(ConversationMessage {
                id: id.clone(),
                conversation_id: conversation_id.clone(),
                round_number,
                speaker: "user".to_string(),
                content: content.clone(),
                metadata: serde_json::json!({}),
                created_at: ts,
            })
        })
        .await
    }

    /// Append an agent's response within the conversation's current (most recent) round.
    pub async fn append_agent_message(
        &self,
        conversation_id: &str,
        agent_id: &str,
        content: String,
        metadata: Value,
    ) -> Result<ConversationMessage> {
        let conversation_id = conversation_id.to_string();
        let speaker = ConversationMessage::speaker_for_agent(agent_id);
        let id = new_id();
        let ts = now();
        let ts_raw = ts.to_rfc3339();
        let metadata_raw = serde_json::to_string(&metadata)?;

        self.run_txn(move |tx| {
            let round_number: i64 = tx.query_row(
                "SELECT round_count FROM conversations WHERE id = ?1",
                params![conversation_id],
                |r| r.get(0),
            )?;

            tx.execute(
                "INSERT INTO conversation_messages
                     (id, conversation_id, round_number, speaker, content, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, conversation_id, round_number, speaker, content, metadata_raw, ts_raw],
            )?;

            Ok(ConversationMessage {
                id: id.clone(),
                conversation_id: conversation_id.clone(),
                round_number,
                speaker: speaker.clone(),
                content: content.clone(),
                metadata: serde_json::from_str(&metadata_raw).unwrap_or(Value::Null),
                created_at: ts,
            })
        })
        .await
    }

    pub async fn list_messages(&self, conversation_id: &str) -> Result<Vec<ConversationMessage>> {
        let conversation_id = conversation_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, round_number, speaker, content, metadata, created_at
                 FROM conversation_messages
                 WHERE conversation_id = ?1
                 ORDER BY round_number ASC, created_at ASC",
            )?;
            let rows = stmt.query_map(params![conversation_id], row_to_message)?;
            rows.collect()
        })
        .await
    }

    pub async fn get_message(&self, id: &str) -> Result<ConversationMessage> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, conversation_id, round_number, speaker, content, metadata, created_at
                 FROM conversation_messages WHERE id = ?1",
                params![id],
                row_to_message,
            )
        })
        .await
        .map_err(|e| match e {
            CoreError::Db(rusqlite::Error::QueryReturnedNoRows) => CoreError::not_found("message not found"),
            other => other,
        })
    }
}
