// src/provider/anthropic.rs
// Anthropic-like adapter, grounded on src/advisory/provider.rs's OpusProvider and
// parse_anthropic_sse, generalized to the canonical ProviderAdapter contract.

use super::{
    render_tool_invocation, summarize_usage, AdapterEvent, AdapterRequest, AdapterResponse,
    ProviderAdapter, Role,
};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc::Sender;

const DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicAdapter {
    client: Client,
    api_key: String,
    api_url: String,
}

impl AnthropicAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: DEFAULT_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_url(api_key: String, api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
        }
    }

    fn build_body(&self, request: &AdapterRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "assistant" } else { "user" };
                serde_json::json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "messages": messages,
        });
        if let Some(system) = &request.system {
            body["system"] = serde_json::json!(system);
        }
        if let Some(thinking) = &request.options.thinking {
            body["thinking"] = serde_json::json!({ "type": thinking.kind, "budget_tokens": thinking.budget_tokens });
        }
        if !request.options.tools.is_empty() {
            body["tools"] = serde_json::json!(request.options.tools);
        }
        if let Some(extra) = &request.options.extra_body {
            if let (Value::Object(base), Value::Object(overrides)) = (&mut body, extra) {
                for (k, v) in overrides {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        body
    }

    fn build_request(&self, request: &AdapterRequest, stream: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&self.build_body(request, stream));

        // Tool types add "beta" capability headers, per the provider's own side effect.
        if request.options.tools.iter().any(|t| t.get("type").and_then(Value::as_str) == Some("web_search")) {
            builder = builder.header("anthropic-beta", "web-search-2025-03-05");
        }
        if let Some(Value::Object(headers)) = &request.options.extra_headers {
            for (k, v) in headers {
                if let Some(v) = v.as_str() {
                    builder = builder.header(k.as_str(), v);
                }
            }
        }
        builder
    }
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<ContentBlock>>,
    error: Option<ApiError>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    text: Option<String>,
    name: Option<String>,
    input: Option<Value>,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    thinking: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

fn extract_text(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        match block.block_type.as_str() {
            "text" => {
                if let Some(text) = &block.text {
                    out.push_str(text);
                }
            }
            "tool_use" => {
                let name = block.name.as_deref().unwrap_or("tool");
                let args = block.input.clone().unwrap_or(Value::Null);
                out.push_str(&render_tool_invocation(name, &args));
            }
            _ => {}
        }
    }
    out
}

/// The `thinking` block (with its signature) is the provider-state payload carried forward.
fn provider_state_from(blocks: &[ContentBlock]) -> Option<Value> {
    blocks.iter().find(|b| b.block_type == "thinking").map(|b| {
        serde_json::json!({ "thinking": b.thinking, "signature": b.signature })
    })
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn provider_name(&self) -> &'static str {
        "anthropic"
    }

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        let response = self.build_request(&request, false).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("anthropic", Some(status.as_u16()), truncate(&body)));
        }

        let parsed: AnthropicResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(CoreError::adapter("anthropic", None, error.message));
        }

        let blocks = parsed.content.unwrap_or_default();
        let text = extract_text(&blocks);
        let provider_state = provider_state_from(&blocks);

        Ok(AdapterResponse {
            text,
            usage: parsed
                .usage
                .as_ref()
                .map(|u| summarize_usage(Some(u.input_tokens), Some(u.output_tokens), None, None, None)),
            provider_state,
            meta: None,
        })
    }

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String> {
        let response = self.build_request(&request, true).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("anthropic", Some(status.as_u16()), truncate(&body)));
        }
        parse_anthropic_sse(response, tx).await
    }
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    delta: Option<StreamDelta>,
    content_block: Option<StreamContentBlock>,
}
#[derive(Deserialize)]
struct StreamDelta {
    text: Option<String>,
}
#[derive(Deserialize)]
struct StreamContentBlock {
    #[serde(rename = "type")]
    block_type: Option<String>,
}

async fn parse_anthropic_sse(response: reqwest::Response, tx: Sender<AdapterEvent>) -> Result<String> {
    let mut full_text = String::new();
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut in_text_block = false;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer = buffer[line_end + 1..].to_string();
            if line.is_empty() {
                continue;
            }
            let Some(json_str) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(event) = serde_json::from_str::<StreamEvent>(json_str) else {
                continue;
            };
            match event.event_type.as_str() {
                "content_block_start" => {
                    in_text_block = event
                        .content_block
                        .and_then(|b| b.block_type)
                        .as_deref()
                        == Some("text");
                }
                "content_block_delta" if in_text_block => {
                    if let Some(text) = event.delta.and_then(|d| d.text) {
                        full_text.push_str(&text);
                        let _ = tx.send(AdapterEvent::TextDelta(text)).await;
                    }
                }
                "content_block_stop" => in_text_block = false,
                _ => {}
            }
        }
    }

    let _ = tx.send(AdapterEvent::Done).await;
    Ok(full_text)
}

fn truncate(s: &str) -> String {
    if s.len() > 500 {
        format!("{}…", &s[..500])
    } else {
        s.to_string()
    }
}
