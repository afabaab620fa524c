// src/main.rs
// Process entry point (§6.1): parse Cli, build Config, open the Store, wire up adapters and the
// Orchestrator, and bind the HttpServer — mirroring the donor's `mira-chat` `server::run` boot.

use clap::Parser;
use roundtable::config::Config;
use roundtable::filestore::FileStore;
use roundtable::indexer::Indexer;
use roundtable::orchestrator::Orchestrator;
use roundtable::provider::{AnthropicAdapter, GoogleAdapter, MockAdapter, OpenAiAdapter, ProviderAdapter, XaiAdapter};
use roundtable::server::{self, AppState};
use roundtable::store::Store;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "roundtable", about = "Multi-agent conversational orchestrator")]
struct Cli {
    /// Port the HTTP server binds.
    #[arg(long, env = "ROUNDTABLE_PORT", default_value_t = 8787)]
    port: u16,

    /// Optional `config.toml` path; missing file falls back to environment-only configuration.
    #[arg(long, env = "ROUNDTABLE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    let store = Store::open(&config.db_path, config.lock_timeout_ms).await?;
    let files = FileStore::new(config.blob_dir.clone());
    let indexer = Indexer::new(store.clone(), files.clone());
    let adapters = build_adapters(&config);
    let orchestrator = Orchestrator::new(store.clone(), config.clone(), adapters);

    let state = AppState::new(store, orchestrator, files, indexer, config);
    server::run(cli.port, state).await
}

/// The mock adapter is always registered (used by tests and local development, §4.6); the rest
/// are registered only when an API key resolved at startup (§9, "Environment-driven defaults").
fn build_adapters(config: &Config) -> HashMap<String, Arc<dyn ProviderAdapter>> {
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapters.insert("mock".to_string(), Arc::new(MockAdapter::new()));

    if let Some(key) = config.provider_defaults("openai").api_key {
        adapters.insert("openai".to_string(), Arc::new(OpenAiAdapter::new(key)));
    }
    if let Some(key) = config.provider_defaults("anthropic").api_key {
        adapters.insert("anthropic".to_string(), Arc::new(AnthropicAdapter::new(key)));
    }
    if let Some(key) = config.provider_defaults("google").api_key {
        adapters.insert("google".to_string(), Arc::new(GoogleAdapter::new(key)));
    }
    if let Some(key) = config.provider_defaults("xai").api_key {
        adapters.insert("xai".to_string(), Arc::new(XaiAdapter::new(key)));
    }

    adapters
}
