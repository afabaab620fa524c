// src/provider/xai.rs
// XAI-like adapter: wire-compatible with the OpenAI-like chat-completions contract (§4.6 table),
// pointed at a different endpoint and error-tagged as "xai".

use super::{AdapterEvent, AdapterRequest, AdapterResponse, OpenAiAdapter, ProviderAdapter};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::mpsc::Sender;

const DEFAULT_URL: &str = "https://api.x.ai/v1/chat/completions";

pub struct XaiAdapter {
    inner: OpenAiAdapter,
}

impl XaiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            inner: OpenAiAdapter::with_url(api_key, DEFAULT_URL.to_string()),
        }
    }
}

#[async_trait]
impl ProviderAdapter for XaiAdapter {
    fn provider_name(&self) -> &'static str {
        "xai"
    }

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        self.inner.send(request).await.map_err(|e| retag(e))
    }

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String> {
        self.inner.stream(request, tx).await.map_err(|e| retag(e))
    }
}

fn retag(err: crate::error::CoreError) -> crate::error::CoreError {
    match err {
        crate::error::CoreError::Adapter { status, detail, .. } => {
            crate::error::CoreError::adapter("xai", status, detail)
        }
        other => other,
    }
}
