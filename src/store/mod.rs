//! The Project Store: single-node transactional persistence for projects, conversations,
//! messages, files, and chunks, with cascade deletion and a lexical retrieval index.
//!
//! Modeled on the donor's `db::pool`/`db::schema` split (crates/mira-server/src/db), but with
//! rusqlite connections owned by a `deadpool-sqlite` pool instead of a single `Mutex<Connection>`,
//! so concurrent per-agent turn writes (§5) don't serialize on an in-process lock.

mod chunks;
mod conversations;
mod files;
mod messages;
mod pool;
mod projects;
mod schema;
pub mod types;

pub use chunks::NewChunk;
pub use files::NewFile;
pub use types::*;

use crate::error::{CoreError, Result};
use deadpool_sqlite::Pool;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Store {
    pool: Pool,
}

impl Store {
    /// Open (creating if needed) the database at `db_path`, run migrations, and seed the
    /// default project if this is a first boot.
    pub async fn open(db_path: &Path, lock_timeout_ms: u64) -> Result<Self> {
        let pool = pool::build_pool(db_path, lock_timeout_ms)?;
        let store = Self { pool };
        store.init_schema().await?;
        store.ensure_default_project().await?;
        Ok(store)
    }

    /// In-memory store for tests; each call gets an isolated database.
    pub async fn open_in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:roundtable_test_{n}?mode=memory&cache=shared");

        let pool = pool::build_memory_pool(&uri, 5_000)?;
        let store = Self { pool };
        store.init_schema().await?;
        store.ensure_default_project().await?;
        Ok(store)
    }

    /// Every pragma a connection needs (`journal_mode`, `synchronous`, `foreign_keys`,
    /// `busy_timeout`) is applied per-connection by the pool's `post_create` hook (see
    /// `pool::build_pool`), so this only has to run the schema migrations.
    async fn init_schema(&self) -> Result<()> {
        // Migrations need a `&mut Connection` (for `Connection::transaction`), so they run on
        // their own interact call rather than through `run`.
        let conn = self.pool.get().await.map_err(|e| CoreError::Pool(e.to_string()))?;
        conn.interact(|conn: &mut Connection| schema::run_migrations(conn))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?
            .map_err(CoreError::Db)
    }

    /// Run `f` against a pooled connection, retrying on SQLITE_BUSY/LOCKED per §4.1's
    /// lock-wait-timeout contract.
    pub(crate) async fn run<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&Connection) -> rusqlite::Result<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        for (attempt, delay) in pool::RETRY_DELAYS.iter().enumerate() {
            let conn = self
                .pool
                .get()
                .await
                .map_err(|e| CoreError::Pool(e.to_string()))?;
            let f2 = f.clone();
            let result = conn
                .interact(move |c| f2(c))
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            match result {
                Ok(v) => return Ok(v),
                Err(e) if pool::is_contention(&e) => {
                    let _ = attempt;
                    tokio::time::sleep(*delay).await;
                    continue;
                }
                Err(e) => return Err(CoreError::Db(e)),
            }
        }

        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let result = conn
            .interact(move |c| f(c))
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        result.map_err(|e| if pool::is_contention(&e) { pool::conflict_err() } else { CoreError::Db(e) })
    }

    /// Run `f` inside one SQLite transaction, retrying the whole transaction on contention.
    /// Used for multi-statement mutations that must be atomic (§4.1): e.g. inserting a round's
    /// user message while bumping `round_count`.
    pub(crate) async fn run_txn<F, R>(&self, f: F) -> Result<R>
    where
        F: Fn(&rusqlite::Transaction<'_>) -> rusqlite::Result<R> + Send + Sync + 'static,
        R: Send + 'static,
    {
        let f = Arc::new(f);
        for delay in pool::RETRY_DELAYS {
            let conn = self
                .pool
                .get()
                .await
                .map_err(|e| CoreError::Pool(e.to_string()))?;
            let f2 = f.clone();
            let result = conn
                .interact(move |c: &mut Connection| -> rusqlite::Result<R> {
                    let tx = c.transaction()?;
                    let v = f2(&tx)?;
                    tx.commit()?;
                    Ok(v)
                })
                .await
                .map_err(|e| CoreError::Internal(e.to_string()))?;
            match result {
                Ok(v) => return Ok(v),
                Err(e) if pool::is_contention(&e) => {
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(CoreError::Db(e)),
            }
        }

        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| CoreError::Pool(e.to_string()))?;
        let result = conn
            .interact(move |c: &mut Connection| -> rusqlite::Result<R> {
                let tx = c.transaction()?;
                let v = f(&tx)?;
                tx.commit()?;
                Ok(v)
            })
            .await
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        result.map_err(|e| if pool::is_contention(&e) { pool::conflict_err() } else { CoreError::Db(e) })
    }

    async fn ensure_default_project(&self) -> Result<()> {
        let existing: Option<String> = self
            .run(|conn| {
                conn.query_row(
                    "SELECT value FROM server_config WHERE key = ?1",
                    rusqlite::params![DEFAULT_PROJECT_KEY],
                    |row| row.get(0),
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(e),
                })
            })
            .await?;

        if existing.is_some() {
            return Ok(());
        }

        let project = self
            .create_project("Default Project".to_string(), None, None)
            .await?;

        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO server_config (key, value) VALUES (?1, ?2)",
                rusqlite::params![DEFAULT_PROJECT_KEY, project.id],
            )
        })
        .await?;

        Ok(())
    }

    pub async fn default_project_id(&self) -> Result<String> {
        self.run(|conn| {
            conn.query_row(
                "SELECT value FROM server_config WHERE key = ?1",
                rusqlite::params![DEFAULT_PROJECT_KEY],
                |row| row.get(0),
            )
        })
        .await
    }
}
