//! ProviderAdapter (§4.6): one adapter per provider family behind a single canonical contract,
//! adapted from the donor's `advisory::provider` module (one struct per model) to the spec's
//! provider-family contract (one struct per wire protocol, parameterised by model id).

mod anthropic;
mod google;
mod mock;
mod openai;
mod xai;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use mock::MockAdapter;
pub use openai::OpenAiAdapter;
pub use xai::XaiAdapter;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdapterOptions {
    #[serde(default, rename = "maxTokens")]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub reasoning: Option<Value>,
    #[serde(default)]
    pub thinking: Option<ThinkingOptions>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(default, rename = "extraBody")]
    pub extra_body: Option<Value>,
    #[serde(default, rename = "extraHeaders")]
    pub extra_headers: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingOptions {
    #[serde(rename = "type")]
    pub kind: String,
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CanonicalUsage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    pub used: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u64>,
    pub limit_basis: String,
}

/// Compute the canonical usage summary from a provider's raw (input, output, total) token counts
/// using the fixed precedence table from §4.8: `used` prefers `output` over `total` when a known
/// token limit is available; `limit_basis` records which field the limit was keyed from.
pub fn summarize_usage(
    input: Option<u64>,
    output: Option<u64>,
    total: Option<u64>,
    thinking: Option<u64>,
    limit: Option<u64>,
) -> CanonicalUsage {
    let used = match (limit, output, total) {
        (Some(_), Some(out), _) => out,
        (Some(_), None, Some(tot)) => tot,
        (None, Some(out), _) => out,
        (None, None, Some(tot)) => tot,
        _ => input.unwrap_or(0),
    };
    let limit_basis = if limit.is_some() && output.is_some() {
        "output"
    } else if limit.is_some() && total.is_some() {
        "total"
    } else {
        "none"
    };
    let remaining = limit.map(|l| l.saturating_sub(used));

    CanonicalUsage {
        limit,
        input,
        output,
        thinking,
        total,
        used,
        remaining,
        limit_basis: limit_basis.to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterRequest {
    pub model: String,
    #[serde(default)]
    pub system: Option<String>,
    pub messages: Vec<AdapterMessage>,
    #[serde(default)]
    pub options: AdapterOptions,
    #[serde(default, rename = "providerState")]
    pub provider_state: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResponse {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CanonicalUsage>,
    #[serde(skip_serializing_if = "Option::is_none", rename = "providerState")]
    pub provider_state: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub enum AdapterEvent {
    TextDelta(String),
    Usage(CanonicalUsage),
    Done,
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn send(&self, request: AdapterRequest) -> Result<AdapterResponse>;

    async fn stream(&self, request: AdapterRequest, tx: Sender<AdapterEvent>) -> Result<String>;
}

/// `\n\n[Tool: <name>]\n<args-pretty-json>\n` — the uniform tool-invocation rendering used when
/// an adapter's extraction concatenates text-bearing and tool-invocation blocks in order.
pub fn render_tool_invocation(name: &str, args: &Value) -> String {
    let pretty = serde_json::to_string_pretty(args).unwrap_or_else(|_| args.to_string());
    format!("\n\n[Tool: {name}]\n{pretty}\n")
}
