// src/store/pool.rs
// Connection pool setup and lock-contention retry, adapted from the donor's
// deadpool-sqlite + rusqlite pattern (crates/mira-server/src/db/pool.rs).

use crate::error::{CoreError, Result};
use deadpool_sqlite::{Config as PoolConfig, Hook, HookError, Pool, Runtime};
use std::path::Path;
use std::time::Duration;

/// Delays between retries of a lock-contended write (100ms, 500ms, 2s).
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(500),
    Duration::from_millis(2_000),
];

/// Build a file-backed pool. Every connection deadpool creates — not just the first one — is
/// configured via `post_create`, the same approach as the donor's `make_file_post_create_hook`:
/// `busy_timeout`, `foreign_keys`, and `synchronous` are per-connection pragmas, so configuring a
/// single connection up front would leave every other pooled connection at SQLite's defaults.
pub fn build_pool(db_path: &Path, lock_timeout_ms: u64) -> Result<Pool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let cfg = PoolConfig::new(db_path.to_string_lossy().into_owned());
    cfg.builder(Runtime::Tokio1)
        .map_err(|e| CoreError::Pool(e.to_string()))?
        .post_create(file_post_create_hook(lock_timeout_ms))
        .build()
        .map_err(|e| CoreError::Pool(e.to_string()))
}

/// Build a pool over a shared-cache in-memory URI (`file:<label>?mode=memory&cache=shared`),
/// for tests. `journal_mode=WAL` doesn't apply to memory databases, so the pragma set omits it,
/// mirroring the donor's `make_memory_post_create_hook`.
pub fn build_memory_pool(uri: &str, lock_timeout_ms: u64) -> Result<Pool> {
    let cfg = PoolConfig::new(uri.to_string());
    cfg.builder(Runtime::Tokio1)
        .map_err(|e| CoreError::Pool(e.to_string()))?
        .post_create(memory_post_create_hook(lock_timeout_ms))
        .build()
        .map_err(|e| CoreError::Pool(e.to_string()))
}

fn file_post_create_hook(lock_timeout_ms: u64) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        Box::pin(async move {
            conn.interact(move |conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;
                     PRAGMA foreign_keys = ON;",
                )?;
                conn.busy_timeout(Duration::from_millis(lock_timeout_ms))
            })
            .await
            .map_err(|e| HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

fn memory_post_create_hook(lock_timeout_ms: u64) -> Hook {
    Hook::async_fn(move |conn, _metrics| {
        Box::pin(async move {
            conn.interact(move |conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn.busy_timeout(Duration::from_millis(lock_timeout_ms))
            })
            .await
            .map_err(|e| HookError::Message(format!("interact failed: {e}").into()))?
            .map_err(|e| HookError::Message(format!("connection setup failed: {e}").into()))
        })
    })
}

pub fn is_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ffi;
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            ffi::Error {
                code: ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked,
                ..
            },
            _,
        )
    )
}

pub fn conflict_err() -> CoreError {
    CoreError::conflict("lock wait timeout exceeded")
}
