// src/provider/openai.rs
// OpenAI-like adapter, grounded on src/advisory/provider.rs's GptProvider and parse_openai_sse.

use super::{
    render_tool_invocation, summarize_usage, AdapterEvent, AdapterRequest, AdapterResponse,
    CanonicalUsage, ProviderAdapter, Role,
};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::Sender;

const DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiAdapter {
    client: Client,
    api_key: String,
    api_url: String,
}

impl OpenAiAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url: DEFAULT_URL.to_string(),
        }
    }

    pub fn with_url(api_key: String, api_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            api_url,
        }
    }

    fn build_body(&self, request: &AdapterRequest, stream: bool) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(serde_json::json!({ "role": "system", "content": system }));
        }
        for m in &request.messages {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
                Role::System => "system",
            };
            messages.push(serde_json::json!({ "role": role, "content": m.content }));
        }

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": messages,
        });
        if let Some(max_tokens) = request.options.max_tokens {
            body["max_completion_tokens"] = serde_json::json!(max_tokens);
        }
        if let Some(reasoning) = &request.options.reasoning {
            body["reasoning_effort"] = reasoning.clone();
        }
        if !request.options.tools.is_empty() {
            body["tools"] = serde_json::json!(request.options.tools);
        }
        if let Some(extra) = &request.options.extra_body {
            merge_json(&mut body, extra);
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
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.build_body(request, stream));
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

fn merge_json(base: &mut Value, overrides: &Value) {
    if let (Value::Object(base), Value::Object(overrides)) = (base, overrides) {
        for (k, v) in overrides {
            base.insert(k.clone(), v.clone());
        }
    }
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Option<Vec<Choice>>,
    error: Option<ApiError>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Deserialize)]
struct ToolFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

fn extract_text(message: &Message) -> String {
    let mut out = message.content.clone().unwrap_or_default();
    for call in &message.tool_calls {
        let args: Value = serde_json::from_str(&call.function.arguments).unwrap_or(Value::Null);
        out.push_str(&render_tool_invocation(&call.function.name, &args));
    }
    out
}

fn usage_from(u: &Usage) -> CanonicalUsage {
    summarize_usage(
        Some(u.prompt_tokens),
        Some(u.completion_tokens),
        Some(u.total_tokens),
        None,
        None,
    )
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn provider_name(&self) -> &'static str {
        "openai"
    }

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        let response = self.build_request(&request, false).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("openai", Some(status.as_u16()), truncate(&body)));
        }

        let parsed: OpenAiResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(CoreError::adapter("openai", None, error.message));
        }

        let text = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .map(|c| extract_text(&c.message))
            .unwrap_or_default();

        Ok(AdapterResponse {
            text,
            usage: parsed.usage.as_ref().map(usage_from),
            provider_state: None,
            meta: None,
        })
    }

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String> {
        let response = self.build_request(&request, true).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("openai", Some(status.as_u16()), truncate(&body)));
        }

        parse_openai_sse(response, tx).await
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Option<Vec<StreamChoice>>,
}
#[derive(Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}
#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

async fn parse_openai_sse(response: reqwest::Response, tx: Sender<AdapterEvent>) -> Result<String> {
    let mut full_text = String::new();
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result?;
        buffer.push_str(&String::from_utf8_lossy(&chunk));

        while let Some(line_end) = buffer.find('\n') {
            let line = buffer[..line_end].trim().to_string();
            buffer = buffer[line_end + 1..].to_string();

            if line.is_empty() || line == "data: [DONE]" {
                continue;
            }
            let Some(json_str) = line.strip_prefix("data: ") else {
                continue;
            };
            if let Ok(chunk) = serde_json::from_str::<StreamChunk>(json_str) {
                for choice in chunk.choices.into_iter().flatten() {
                    if let Some(content) = choice.delta.and_then(|d| d.content) {
                        full_text.push_str(&content);
                        let _ = tx.send(AdapterEvent::TextDelta(content)).await;
                    }
                }
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
