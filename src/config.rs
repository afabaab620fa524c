//! Startup configuration.
//!
//! Everything adapters and the Orchestrator need is resolved once, here, from the
//! environment (via `.env` + `std::env`) and an optional `config.toml`. Nothing downstream
//! reads `std::env` directly — see Design Notes, "Environment-driven defaults".

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

/// Per-provider defaults: model id, max tokens, reasoning effort, thinking budget.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProviderDefaults {
    pub default_model_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub reasoning_effort: Option<String>,
    pub thinking_budget_tokens: Option<u32>,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    provider: HashMap<String, ProviderDefaults>,
    #[serde(default)]
    db_path: Option<String>,
    #[serde(default)]
    blob_dir: Option<String>,
    #[serde(default)]
    transcripts_dir: Option<String>,
    #[serde(default)]
    request_timeout_secs: Option<u64>,
    #[serde(default)]
    lock_timeout_ms: Option<u64>,
}

/// Resolved startup configuration shared by the Store, the adapters, and the Orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub blob_dir: PathBuf,
    pub transcripts_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub lock_timeout_ms: u64,
    pub providers: HashMap<String, ProviderDefaults>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("roundtable.db"),
            blob_dir: PathBuf::from("roundtable-blobs"),
            transcripts_dir: PathBuf::from("roundtable-transcripts"),
            request_timeout_secs: 60,
            lock_timeout_ms: 5_000,
            providers: HashMap::new(),
        }
    }
}

impl Config {
    /// Build configuration from `.env`, process environment, and an optional `config.toml`
    /// at `config_path` (missing file is not an error — env alone is a valid configuration).
    pub fn load(config_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut cfg = Config::default();

        if let Some(path) = config_path {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let file_cfg: FileConfig = toml::from_str(&contents)?;
                if let Some(db_path) = file_cfg.db_path {
                    cfg.db_path = PathBuf::from(db_path);
                }
                if let Some(blob_dir) = file_cfg.blob_dir {
                    cfg.blob_dir = PathBuf::from(blob_dir);
                }
                if let Some(dir) = file_cfg.transcripts_dir {
                    cfg.transcripts_dir = PathBuf::from(dir);
                }
                if let Some(secs) = file_cfg.request_timeout_secs {
                    cfg.request_timeout_secs = secs;
                }
                if let Some(ms) = file_cfg.lock_timeout_ms {
                    cfg.lock_timeout_ms = ms;
                }
                cfg.providers = file_cfg.provider;
            }
        }

        for provider in ["openai", "anthropic", "google", "xai"] {
            let entry = cfg.providers.entry(provider.to_string()).or_default();
            if entry.api_key.is_none() {
                entry.api_key = std::env::var(env_key_for(provider)).ok();
            }
        }

        if let Ok(path) = std::env::var("ROUNDTABLE_DB_PATH") {
            cfg.db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("ROUNDTABLE_BLOB_DIR") {
            cfg.blob_dir = PathBuf::from(path);
        }

        Ok(cfg)
    }

    pub fn provider_defaults(&self, provider: &str) -> ProviderDefaults {
        self.providers.get(provider).cloned().unwrap_or_default()
    }
}

fn env_key_for(provider: &str) -> &'static str {
    match provider {
        "openai" => "OPENAI_API_KEY",
        "anthropic" => "ANTHROPIC_API_KEY",
        "google" => "GEMINI_API_KEY",
        "xai" => "XAI_API_KEY",
        _ => "",
    }
}
