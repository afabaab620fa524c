// src/store/types.rs
// Entity types shared across the Store's CRUD modules and the rest of the crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub settings: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub summary: Option<String>,
    pub round_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `speaker` is either the literal `"user"` or `"agent:<agent_id>"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMessage {
    pub id: String,
    pub conversation_id: String,
    pub round_number: i64,
    pub speaker: String,
    pub content: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn is_user(&self) -> bool {
        self.speaker == "user"
    }

    /// Returns the `agent_id` embedded in an `agent:<agent_id>` speaker, if this is an agent row.
    pub fn agent_id(&self) -> Option<&str> {
        self.speaker.strip_prefix("agent:")
    }

    pub fn speaker_for_agent(agent_id: &str) -> String {
        format!("agent:{agent_id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectFile {
    pub id: String,
    pub project_id: String,
    pub path: String,
    pub content: Option<String>,
    pub content_location: Option<String>,
    pub content_hash: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProjectFile {
    /// §8 invariant 5: exactly one of `content` / `content_location` is populated.
    pub fn is_consistent(&self) -> bool {
        self.content.is_some() != self.content_location.is_some()
    }

    pub fn retrieval_eligible(&self) -> bool {
        self.metadata
            .get("retrieval_eligible")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    ConversationMessage,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::File => "file",
            SourceType::ConversationMessage => "conversation_message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(SourceType::File),
            "conversation_message" => Some(SourceType::ConversationMessage),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentChunk {
    pub id: String,
    pub source_type: String,
    pub source_id: String,
    pub project_id: String,
    pub chunk_index: i64,
    pub content: String,
    pub location: Value,
    pub token_count: i64,
    pub created_at: DateTime<Utc>,
}

/// Well-known `server_config` key recording the seeded default project's id.
pub const DEFAULT_PROJECT_KEY: &str = "default_project_id";

pub fn new_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Reads an RFC3339 `TEXT` column into a `DateTime<Utc>`. rusqlite's `chrono` feature (which
/// would let `DateTime<Utc>` bind/read directly) isn't enabled, so timestamps are stored as
/// `TEXT` the way the donor's own schema does and converted at this boundary instead.
pub fn row_datetime(row: &rusqlite::Row<'_>, name: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}
