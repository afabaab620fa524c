// src/provider/mock.rs
// Deterministic adapter for tests and local development (§4.6 table): no network calls, a
// model-selector-keyed response, configurable latency, and an error-injecting variant used by
// the partial-failure seed scenario.

use super::{summarize_usage, AdapterEvent, AdapterRequest, AdapterResponse, ProviderAdapter};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

pub struct MockAdapter {
    latency: Duration,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self { latency: Duration::ZERO }
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }

    fn reply_for(&self, request: &AdapterRequest) -> Result<String> {
        const LOREM: &str = "Lorem ipsum dolor sit amet, consectetur adipiscing elit.";

        match request.model.as_str() {
            "mock-error" => Err(CoreError::adapter("mock", Some(500), "Simulated mock error")),
            "mock-lorem" => Ok(LOREM.to_string()),
            "mock-echo" => {
                // The last message carries the ViewBuilder's `User: <text>` framing (§4.7 step 3);
                // echo the human-authored text, not the wire framing around it.
                let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
                let content = last.strip_prefix("User: ").unwrap_or(last);
                Ok(format!("Echo: {content}"))
            }
            _ => Ok(format!(
                "mock response from {} to: {}",
                request.model,
                request.messages.last().map(|m| m.content.as_str()).unwrap_or("")
            )),
        }
    }
}

#[async_trait]
impl ProviderAdapter for MockAdapter {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let text = self.reply_for(&request)?;
        let usage = summarize_usage(Some(10), Some(text.len() as u64 / 4), None, None, None);
        Ok(AdapterResponse {
            text,
            usage: Some(usage),
            provider_state: None,
            meta: None,
        })
    }

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let text = self.reply_for(&request)?;
        for word in text.split_inclusive(' ') {
            let _ = tx.send(AdapterEvent::TextDelta(word.to_string())).await;
        }
        let _ = tx.send(AdapterEvent::Done).await;
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AdapterMessage;
    use crate::provider::Role;

    fn req(model: &str, content: &str) -> AdapterRequest {
        AdapterRequest {
            model: model.to_string(),
            system: None,
            messages: vec![AdapterMessage { role: Role::User, content: content.to_string() }],
            options: Default::default(),
            provider_state: None,
        }
    }

    #[tokio::test]
    async fn echo_model_returns_prefixed_input() {
        let adapter = MockAdapter::new();
        let response = adapter.send(req("mock-echo", "hi")).await.unwrap();
        assert_eq!(response.text, "Echo: hi");
    }

    #[tokio::test]
    async fn error_model_fails() {
        let adapter = MockAdapter::new();
        assert!(adapter.send(req("mock-error", "x")).await.is_err());
    }
}
