//! HttpServer (§2.1, §6): the axum router and shared application state. Router composition
//! follows the donor's `crates/mira-server/src/web/mod.rs` (a nested `/api` sub-router, CORS,
//! and `TraceLayer` wrapping the whole thing); streaming follows `mira-chat/src/server.rs`.

mod conversations;
mod files;
mod health;
mod preview;
mod search;
mod turn;

use crate::config::Config;
use crate::filestore::FileStore;
use crate::indexer::Indexer;
use crate::orchestrator::{AutosaveOptions, Orchestrator};
use crate::store::Store;
use crate::transcript::TranscriptFormat;
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy)]
struct AutosaveSetting {
    enabled: bool,
    format: TranscriptFormat,
}

/// Shared application state, following the donor's `AppState` shape: a plain `Clone` struct
/// holding `Arc`-wrapped shared resources, constructed once and handed to `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub orchestrator: Arc<Orchestrator>,
    pub files: FileStore,
    pub indexer: Arc<Indexer>,
    pub config: Arc<Config>,
    autosave: Arc<RwLock<HashMap<String, AutosaveSetting>>>,
    started_at: Instant,
}

impl AppState {
    pub fn new(store: Store, orchestrator: Orchestrator, files: FileStore, indexer: Indexer, config: Config) -> Self {
        Self {
            store,
            orchestrator: Arc::new(orchestrator),
            files,
            indexer: Arc::new(indexer),
            config: Arc::new(config),
            autosave: Arc::new(RwLock::new(HashMap::new())),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub async fn set_autosave(&self, conversation_id: &str, enabled: bool, format: TranscriptFormat) {
        let mut guard = self.autosave.write().await;
        if enabled {
            guard.insert(conversation_id.to_string(), AutosaveSetting { enabled, format });
        } else {
            guard.remove(conversation_id);
        }
    }

    /// `None` when auto-save isn't enabled for this conversation; otherwise the options the
    /// Orchestrator needs to write a transcript as part of the turn (§4.8 step 7).
    pub async fn autosave_options(&self, conversation_id: &str) -> Option<AutosaveOptions> {
        let guard = self.autosave.read().await;
        let setting = guard.get(conversation_id)?;
        if !setting.enabled {
            return None;
        }
        Some(AutosaveOptions {
            format: setting.format,
            transcripts_dir: self.config.transcripts_dir.clone(),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    let api_router = Router::new()
        .route("/turn", post(turn::handle_turn))
        .route(
            "/conversations/{id}",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/{id}/export",
            get(conversations::export_conversation),
        )
        .route(
            "/conversations/{id}/autosave",
            post(conversations::set_autosave),
        )
        .route(
            "/projects/{id}/files",
            get(files::list_files).post(files::create_file),
        )
        .route(
            "/projects/{id}/files/{file_id}",
            get(files::get_file).delete(files::delete_file),
        )
        .route("/projects/{id}/search", post(search::search_project))
        .route("/preview-view", post(preview::preview_view))
        .with_state(state.clone());

    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", api_router)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve, mirroring the donor's `mira-chat` `server::run` bootstrap.
pub async fn run(port: u16, state: AppState) -> anyhow::Result<()> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "roundtable listening");
    axum::serve(listener, app).await?;
    Ok(())
}
