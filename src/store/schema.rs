// src/store/schema.rs
// Schema and the named-migration runner.
//
// Grounded in the donor's `migration_helpers.rs` idempotence checks, generalized into the
// spec's stronger guarantee: migrations are recorded by name in a `migrations` table and the
// runner applies only not-yet-recorded ones, in lexicographic order, each in its own transaction.

use rusqlite::{Connection, params};

/// One migration: a stable name (sorts lexicographically = application order) and its DDL.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_core_schema",
        sql: CORE_SCHEMA,
    },
    Migration {
        name: "0002_retrieval_index",
        sql: RETRIEVAL_INDEX_SCHEMA,
    },
    Migration {
        name: "0003_cascade_triggers",
        sql: CASCADE_TRIGGERS,
    },
];

const CORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS server_config (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id          TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    settings    TEXT NOT NULL DEFAULT '{}',
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id          TEXT PRIMARY KEY,
    project_id  TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    title       TEXT NOT NULL,
    summary     TEXT,
    round_count INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_project ON conversations(project_id);

CREATE TABLE IF NOT EXISTS conversation_messages (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    round_number    INTEGER NOT NULL,
    speaker         TEXT NOT NULL,
    content         TEXT NOT NULL,
    metadata        TEXT NOT NULL DEFAULT '{}',
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON conversation_messages(conversation_id, round_number, created_at);

CREATE TABLE IF NOT EXISTS project_files (
    id               TEXT PRIMARY KEY,
    project_id       TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    path             TEXT NOT NULL,
    content          TEXT,
    content_location TEXT,
    content_hash     TEXT NOT NULL,
    mime_type        TEXT NOT NULL,
    size_bytes       INTEGER NOT NULL,
    metadata         TEXT NOT NULL DEFAULT '{}',
    created_at       TEXT NOT NULL,
    updated_at       TEXT NOT NULL,
    UNIQUE(project_id, path)
);
CREATE INDEX IF NOT EXISTS idx_files_project ON project_files(project_id);

CREATE TABLE IF NOT EXISTS content_chunks (
    id           TEXT PRIMARY KEY,
    source_type  TEXT NOT NULL,
    source_id    TEXT NOT NULL,
    project_id   TEXT NOT NULL,
    chunk_index  INTEGER NOT NULL,
    content      TEXT NOT NULL,
    location     TEXT NOT NULL,
    token_count  INTEGER NOT NULL,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON content_chunks(source_type, source_id);
CREATE INDEX IF NOT EXISTS idx_chunks_project ON content_chunks(project_id);
"#;

const RETRIEVAL_INDEX_SCHEMA: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS retrieval_index USING fts5(
    content,
    chunk_id UNINDEXED,
    project_id UNINDEXED,
    metadata UNINDEXED,
    tokenize = 'porter unicode61'
);
"#;

const CASCADE_TRIGGERS: &str = r#"
CREATE TRIGGER IF NOT EXISTS trg_file_delete_chunks
AFTER DELETE ON project_files
BEGIN
    DELETE FROM content_chunks WHERE source_type = 'file' AND source_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_message_delete_chunks
AFTER DELETE ON conversation_messages
BEGIN
    DELETE FROM content_chunks WHERE source_type = 'conversation_message' AND source_id = old.id;
END;

CREATE TRIGGER IF NOT EXISTS trg_chunk_delete_index
AFTER DELETE ON content_chunks
BEGIN
    DELETE FROM retrieval_index WHERE chunk_id = old.id;
END;
"#;

/// Apply every not-yet-recorded migration, in lexicographic `name` order, each in its own
/// transaction. Idempotent: re-running with an already-fully-applied schema is a no-op.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (name TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
    )?;

    let mut sorted: Vec<&Migration> = MIGRATIONS.iter().collect();
    sorted.sort_by_key(|m| m.name);

    for migration in sorted {
        let already_applied: bool = conn
            .query_row(
                "SELECT 1 FROM migrations WHERE name = ?1",
                params![migration.name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if already_applied {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO migrations (name, applied_at) VALUES (?1, ?2)",
            params![migration.name, chrono::Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        tracing::info!(migration = migration.name, "applied migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        run_migrations(&mut conn).unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count as usize, MIGRATIONS.len());
    }

    #[test]
    fn cascade_triggers_exist() {
        let mut conn = Connection::open_in_memory().unwrap();
        run_migrations(&mut conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 3);
    }
}
