// src/provider/google.rs
// Google-like adapter, grounded on src/advisory/provider.rs's GeminiProvider / parse_gemini_sse.

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

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GoogleAdapter {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GoogleAdapter {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_base_url(api_key: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url,
        }
    }

    fn build_body(&self, request: &AdapterRequest) -> Value {
        let contents: Vec<Value> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| {
                let role = if m.role == Role::Assistant { "model" } else { "user" };
                serde_json::json!({ "role": role, "parts": [{ "text": m.content }] })
            })
            .collect();

        let mut body = serde_json::json!({ "contents": contents });
        if let Some(system) = &request.system {
            body["systemInstruction"] = serde_json::json!({ "parts": [{ "text": system }] });
        }
        if let Some(thinking) = &request.options.thinking {
            body["generationConfig"] = serde_json::json!({
                "thinkingConfig": { "thinkingBudget": thinking.budget_tokens }
            });
        }
        if let Some(max_tokens) = request.options.max_tokens {
            body.as_object_mut()
                .unwrap()
                .entry("generationConfig")
                .or_insert_with(|| serde_json::json!({}))["maxOutputTokens"] = serde_json::json!(max_tokens);
        }
        if !request.options.tools.is_empty() {
            let mut extra = request.options.extra_body.clone().unwrap_or_else(|| serde_json::json!({}));
            extra["tools"] = serde_json::json!(request.options.tools);
            if let (Value::Object(base), Value::Object(overrides)) = (&mut body, &extra) {
                for (k, v) in overrides {
                    base.insert(k.clone(), v.clone());
                }
            }
        } else if let Some(extra) = &request.options.extra_body {
            if let (Value::Object(base), Value::Object(overrides)) = (&mut body, extra) {
                for (k, v) in overrides {
                    base.insert(k.clone(), v.clone());
                }
            }
        }
        body
    }

    fn url(&self, model: &str, streaming: bool) -> String {
        let method = if streaming { "streamGenerateContent" } else { "generateContent" };
        let suffix = if streaming { "&alt=sse" } else { "" };
        format!("{}/{}:{}?key={}{}", self.base_url, model, method, self.api_key, suffix)
    }
}

#[derive(Deserialize)]
struct GoogleResponse {
    candidates: Option<Vec<Candidate>>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<Usage>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    text: Option<String>,
    #[serde(rename = "functionCall")]
    function_call: Option<FunctionCall>,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    args: Value,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(rename = "promptTokenCount")]
    prompt_token_count: Option<u64>,
    #[serde(rename = "candidatesTokenCount")]
    candidates_token_count: Option<u64>,
    #[serde(rename = "thoughtsTokenCount")]
    thoughts_token_count: Option<u64>,
}

fn extract_text(parts: &[Part]) -> String {
    let mut out = String::new();
    for part in parts {
        if let Some(text) = &part.text {
            out.push_str(text);
        }
        if let Some(call) = &part.function_call {
            out.push_str(&render_tool_invocation(&call.name, &call.args));
        }
    }
    out
}

#[async_trait]
impl ProviderAdapter for GoogleAdapter {
    fn provider_name(&self) -> &'static str {
        "google"
    }

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse> {
        let url = self.url(&request.model, false);
        let response = self.client.post(&url).json(&self.build_body(&request)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("google", Some(status.as_u16()), truncate(&body)));
        }

        let parsed: GoogleResponse = response.json().await?;
        if let Some(error) = parsed.error {
            return Err(CoreError::adapter("google", None, error.message));
        }

        let text = parsed
            .candidates
            .and_then(|c| c.into_iter().next())
            .map(|c| extract_text(&c.content.parts))
            .unwrap_or_default();

        Ok(AdapterResponse {
            text,
            usage: parsed.usage_metadata.as_ref().map(|u| {
                summarize_usage(
                    u.prompt_token_count,
                    u.candidates_token_count,
                    None,
                    u.thoughts_token_count,
                    None,
                )
            }),
            provider_state: None,
            meta: None,
        })
    }

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String> {
        let url = self.url(&request.model, true);
        let response = self.client.post(&url).json(&self.build_body(&request)).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::adapter("google", Some(status.as_u16()), truncate(&body)));
        }
        parse_google_sse(response, tx).await
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    candidates: Option<Vec<StreamCandidate>>,
}
#[derive(Deserialize)]
struct StreamCandidate {
    content: Option<StreamContent>,
}
#[derive(Deserialize)]
struct StreamContent {
    parts: Option<Vec<StreamPart>>,
}
#[derive(Deserialize)]
struct StreamPart {
    text: Option<String>,
}

async fn parse_google_sse(response: reqwest::Response, tx: Sender<AdapterEvent>) -> Result<String> {
    let mut full_text = String::new();
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

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
            if let Ok(chunk) = serde_json::from_str::<StreamChunk>(json_str) {
                for candidate in chunk.candidates.into_iter().flatten() {
                    for part in candidate.content.and_then(|c| c.parts).into_iter().flatten() {
                        if let Some(text) = part.text {
                            full_text.push_str(&text);
                            let _ = tx.send(AdapterEvent::TextDelta(text)).await;
                        }
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
