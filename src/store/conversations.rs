// src/store/conversations.rs
// Conversation CRUD.

use super::types::{new_id, now, row_datetime, Conversation};
use super::Store;
use crate::error::{CoreError, Result};
use rusqlite::{params, Row};

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        round_count: row.get("round_count")?,
        created_at: row_datetime(row, "created_at")?,
        updated_at: row_datetime(row, "updated_at")?,
    })
}

impl Store {
    pub async fn create_conversation(&self, project_id: &str, title: String) -> Result<Conversation> {
        if !self.project_exists(project_id).await? {
            return Err(CoreError::not_found(format!("project {project_id} not found")));
        }

        let id = new_id();
        let ts = now();
        let conversation = Conversation {
            id: id.clone(),
            project_id: project_id.to_string(),
            title,
            summary: None,
            round_count: 0,
            created_at: ts,
            updated_at: ts,
        };

        let c = conversation.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO conversations (id, project_id, title, summary, round_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![c.id, c.project_id, c.title, c.summary, c.round_count, c.created_at.to_rfc3339(), c.updated_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await?;

        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, project_id, title, summary, round_count, created_at, updated_at
                 FROM conversations WHERE id = ?1",
                params![id],
                row_to_conversation,
            )
        })
        .await
        .map_err(|e| match e {
            CoreError::Db(rusqlite::Error::QueryReturnedNoRows) => {
                CoreError::not_found("conversation not found")
            }
            other => other,
        })
    }

    pub async fn list_conversations(&self, project_id: &str) -> Result<Vec<Conversation>> {
        let project_id = project_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, project_id, title, summary, round_count, created_at, updated_at
                 FROM conversations WHERE project_id = ?1 ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map(params![project_id], row_to_conversation)?;
            rows.collect()
        })
        .await
    }

    pub async fn update_conversation_summary(&self, id: &str, summary: String) -> Result<()> {
        let id = id.to_string();
        let ts = now();
        let n = self
            .run(move |conn| {
                conn.execute(
                    "UPDATE conversations SET summary = ?1, updated_at = ?2 WHERE id = ?3",
                    params![summary, ts.to_rfc3339(), id],
                )
            })
            .await?;
        if n == 0 {
            return Err(CoreError::not_found("conversation not found"));
        }
        Ok(())
    }

    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let n = self
            .run(move |conn| conn.execute("DELETE FROM conversations WHERE id = ?1", params![id]))
            .await?;
        if n == 0 {
            return Err(CoreError::not_found("conversation not found"));
        }
        Ok(())
    }
}
