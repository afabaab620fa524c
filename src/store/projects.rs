// src/store/projects.rs
// Project CRUD, adapted from the donor's backend/src/project/store.rs ProjectStore.

use super::types::{new_id, now, row_datetime, Project};
use super::Store;
use crate::error::{CoreError, Result};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

fn row_to_project(row: &Row) -> rusqlite::Result<Project> {
    let settings_raw: String = row.get("settings")?;
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        settings: serde_json::from_str(&settings_raw).unwrap_or(Value::Null),
        created_at: row_datetime(row, "created_at")?,
        updated_at: row_datetime(row, "updated_at")?,
    })
}

impl Store {
    pub async fn create_project(
        &self,
        name: String,
        description: Option<String>,
        settings: Option<Value>,
    ) -> Result<Project> {
        let id = new_id();
        let ts = now();
        let settings = settings.unwrap_or_else(|| serde_json::json!({}));
        let settings_raw = serde_json::to_string(&settings)?;

        let project = Project {
            id: id.clone(),
            name,
            description,
            settings,
            created_at: ts,
            updated_at: ts,
        };

        let p = project.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO projects (id, name, description, settings, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![p.id, p.name, p.description, settings_raw, p.created_at.to_rfc3339(), p.updated_at.to_rfc3339()],
            )?;
            Ok(())
        })
        .await?;

        Ok(project)
    }

    pub async fn get_project(&self, id: &str) -> Result<Project> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT id, name, description, settings, created_at, updated_at
                 FROM projects WHERE id = ?1",
                params![id],
                row_to_project,
            )
        })
        .await
        .map_err(|e| match e {
            CoreError::Db(rusqlite::Error::QueryReturnedNoRows) => {
                CoreError::not_found(format!("project {id} not found"))
            }
            other => other,
        })
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, description, settings, created_at, updated_at
                 FROM projects ORDER BY created_at ASC",
            )?;
            let rows = stmt.query_map([], row_to_project)?;
            rows.collect()
        })
        .await
    }

    pub async fn update_project(
        &self,
        id: &str,
        name: Option<String>,
        description: Option<Option<String>>,
        settings: Option<Value>,
    ) -> Result<Project> {
        let existing = self.get_project(id).await?;
        let id = id.to_string();
        let ts = now();

        let updated = Project {
            id: existing.id.clone(),
            name: name.unwrap_or(existing.name),
            description: description.unwrap_or(existing.description),
            settings: settings.unwrap_or(existing.settings),
            created_at: existing.created_at,
            updated_at: ts,
        };
        let settings_raw = serde_json::to_string(&updated.settings)?;

        let u = updated.clone();
        self.run(move |conn| {
            conn.execute(
                "UPDATE projects SET name = ?1, description = ?2, settings = ?3, updated_at = ?4
                 WHERE id = ?5",
                params![u.name, u.description, settings_raw, u.updated_at.to_rfc3339(), id],
            )?;
            Ok(())
        })
        .await?;

        Ok(updated)
    }

    /// Delete a project and everything under it via `ON DELETE CASCADE` (conversations, messages,
    /// files, chunks) and the chunk-delete triggers cascading into the retrieval index.
    pub async fn delete_project(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        let deleted: bool = self
            .run(move |conn| {
                let n = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
                Ok(n > 0)
            })
            .await?;
        if !deleted {
            return Err(CoreError::not_found("project not found"));
        }
        Ok(())
    }

    pub async fn project_exists(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row("SELECT 1 FROM projects WHERE id = ?1", params![id], |_| Ok(()))
                .optional()
                .map(|r| r.is_some())
        })
        .await
    }
}
