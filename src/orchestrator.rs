//! Orchestrator (§4.8): resolves/creates the conversation, normalises targets, fans out to every
//! adapter concurrently, persists results, and (optionally) streams progress events, in the
//! donor's channel-fed SSE style (`mira-server/src/web/chat/stream.rs`).

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::provider::{AdapterMessage, AdapterRequest, AdapterResponse, CanonicalUsage, ProviderAdapter};
use crate::store::{Conversation, ConversationMessage, Store};
use crate::transcript::{self, TranscriptFormat};
use crate::view_builder::{self, Attachment as ViewAttachment, SystemPromptConfig, Target};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;

/// Auto-save settings for a turn (§4.8 step 7): on success, a transcript is written to
/// `transcripts_dir` as a best-effort side effect before the `done` event is emitted.
#[derive(Debug, Clone)]
pub struct AutosaveOptions {
    pub format: TranscriptFormat,
    pub transcripts_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetModelInput {
    pub provider: String,
    pub model_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub options: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub user_message: String,
    pub target_models: Vec<TargetModelInput>,
    #[serde(default)]
    pub system_prompts: Option<SystemPromptsInput>,
    #[serde(default)]
    pub text_attachments: Vec<TextAttachmentInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemPromptsInput {
    #[serde(default)]
    pub common_template: Option<String>,
    #[serde(default)]
    pub per_agent: HashMap<String, String>,
    #[serde(default)]
    pub per_model: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextAttachmentInput {
    #[serde(default)]
    pub title: Option<String>,
    pub content: String,
}

/// A normalised target, resolved from `TargetModelInput` per §4.8 step 2.
#[derive(Debug, Clone)]
pub struct NormalizedTarget {
    pub provider: String,
    pub model_id: String,
    pub display_name: String,
    pub agent_id: String,
    pub options: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentResult {
    pub agent_id: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<CanonicalUsage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Init { conversation_id: String },
    Result { result: AgentResult, completed: usize, total: usize },
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub conversation_id: String,
    pub results: Vec<AgentResult>,
}

pub struct Orchestrator {
    store: Store,
    config: Config,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl Orchestrator {
    pub fn new(store: Store, config: Config, adapters: HashMap<String, Arc<dyn ProviderAdapter>>) -> Self {
        Self { store, config, adapters }
    }

    fn default_model_for(&self, provider: &str) -> String {
        self.config
            .provider_defaults(provider)
            .default_model_id
            .unwrap_or_else(|| format!("{provider}-default"))
    }

    /// Normalise one `target_models[i]` entry per §4.8 step 2.
    fn normalize_target(&self, index: usize, input: &TargetModelInput) -> NormalizedTarget {
        let provider = input.provider.to_lowercase();
        let model_id = match input.model_id.as_str() {
            "" | "smart" | "best" | "default" => self.default_model_for(&provider),
            other => other.to_string(),
        };
        let agent_id = input
            .agent_id
            .clone()
            .unwrap_or_else(|| format!("{provider}:{model_id}:{index}"));
        let display_name = input.name.clone().unwrap_or_else(|| model_id.clone());

        let defaults = self.config.provider_defaults(&provider);
        let mut options = input.options.clone().unwrap_or_else(|| serde_json::json!({}));
        if let Value::Object(obj) = &mut options {
            if !obj.contains_key("maxTokens") {
                if let Some(max_tokens) = defaults.max_tokens {
                    obj.insert("maxTokens".to_string(), serde_json::json!(max_tokens));
                }
            }
            if !obj.contains_key("reasoning") {
                if let Some(effort) = &defaults.reasoning_effort {
                    obj.insert("reasoning".to_string(), serde_json::json!(effort));
                }
            }
        }

        NormalizedTarget { provider, model_id, display_name, agent_id, options }
    }

    async fn resolve_conversation(&self, conversation_id: Option<&str>) -> Result<Conversation> {
        if let Some(id) = conversation_id {
            if let Ok(conversation) = self.store.get_conversation(id).await {
                return Ok(conversation);
            }
        }
        let project_id = self.store.default_project_id().await?;
        self.store.create_conversation(&project_id, "New Conversation".to_string()).await
    }

    /// Build the per-agent view from the conversation snapshot *before* the current round's
    /// agent writes, so peers never see each other's current-round replies.
    async fn build_view(
        &self,
        target: &NormalizedTarget,
        prior_messages: &[ConversationMessage],
        display_names: &HashMap<String, String>,
        prompts: &SystemPromptsInput,
        capability_note: &Option<String>,
        attachments: &[TextAttachmentInput],
        user_message: &str,
    ) -> (String, Vec<AdapterMessage>) {
        let view_target = Target {
            provider: target.provider.clone(),
            model_id: target.model_id.clone(),
            agent_id: target.agent_id.clone(),
        };

        let mut common_template = prompts
            .common_template
            .clone()
            .unwrap_or_else(|| "You are {{modelId}}, participating in a multi-agent conversation.".to_string());
        if let Some(note) = capability_note {
            common_template.push_str("\n\n");
            common_template.push_str(note);
        }

        let cfg = SystemPromptConfig {
            common_template,
            per_agent: prompts.per_agent.clone(),
            per_model: prompts.per_model.clone(),
            provider_default: None,
        };

        let rounds = view_builder::rounds_from_messages(prior_messages, display_names);
        let view_attachments: Vec<ViewAttachment> = attachments
            .iter()
            .map(|a| ViewAttachment { title: a.title.clone(), content: a.content.clone() })
            .collect();

        let view = view_builder::build_view(&view_target, &cfg, &rounds, &view_attachments, user_message);
        (view.system, view.messages)
    }

    /// Build the once-per-turn capability note (§4.8 step 4): present only when at least one
    /// target enables a provider-search tool.
    fn capability_note(&self, targets: &[NormalizedTarget]) -> Option<String> {
        let search_capable: Vec<&str> = targets
            .iter()
            .filter(|t| {
                t.options
                    .get("tools")
                    .and_then(Value::as_array)
                    .is_some_and(|tools| {
                        tools.iter().any(|tool| tool.get("type").and_then(Value::as_str) == Some("web_search"))
                    })
            })
            .map(|t| t.agent_id.as_str())
            .collect();

        if search_capable.is_empty() {
            return None;
        }
        Some(format!(
            "The following agents can search the web: {}.",
            search_capable.join(", ")
        ))
    }

    pub async fn run_turn(
        &self,
        request: TurnRequest,
        events: Option<Sender<TurnEvent>>,
    ) -> Result<TurnResponse> {
        self.run_turn_with_autosave(request, events, None).await
    }

    pub async fn run_turn_with_autosave(
        &self,
        request: TurnRequest,
        events: Option<Sender<TurnEvent>>,
        autosave: Option<AutosaveOptions>,
    ) -> Result<TurnResponse> {
        let conversation = self.resolve_conversation(request.conversation_id.as_deref()).await?;
        if let Some(tx) = &events {
            let _ = tx.send(TurnEvent::Init { conversation_id: conversation.id.clone() }).await;
        }

        let targets: Vec<NormalizedTarget> = request
            .target_models
            .iter()
            .enumerate()
            .map(|(i, t)| self.normalize_target(i, t))
            .collect();
        let display_names: HashMap<String, String> =
            targets.iter().map(|t| (t.agent_id.clone(), t.display_name.clone())).collect();
        let capability_note = self.capability_note(&targets);
        let prompts = request.system_prompts.clone().unwrap_or_default();

        let prior_messages = self.store.list_messages(&conversation.id).await?;
        let provider_states = provider_states_by_agent(&prior_messages);
        self.store.start_round(&conversation.id, request.user_message.clone()).await?;

        let total = targets.len();
        let mut tasks = tokio::task::JoinSet::new();

        for (index, target) in targets.into_iter().enumerate() {
            let adapter = self.adapters.get(&target.provider).cloned();
            let (system, messages) = self
                .build_view(
                    &target,
                    &prior_messages,
                    &display_names,
                    &prompts,
                    &capability_note,
                    &request.text_attachments,
                    &request.user_message,
                )
                .await;
            let provider_state = provider_states.get(&target.agent_id).cloned();

            let store = self.store.clone();
            let conversation_id = conversation.id.clone();

            tasks.spawn(async move {
                let result = dispatch_one(adapter, &target, system, messages, provider_state).await;
                if let Ok(response) = &result {
                    let metadata = serde_json::json!({
                        "model_id": target.model_id,
                        "provider_state": response.provider_state,
                    });
                    let _ = store
                        .append_agent_message(&conversation_id, &target.agent_id, response.text.clone(), metadata)
                        .await;
                }

                let agent_result = match result {
                    Ok(response) => AgentResult {
                        agent_id: target.agent_id.clone(),
                        provider: target.provider.clone(),
                        text: Some(response.text),
                        usage: response.usage,
                        error: None,
                    },
                    Err(e) => AgentResult {
                        agent_id: target.agent_id.clone(),
                        provider: target.provider.clone(),
                        text: None,
                        usage: None,
                        error: Some(e.to_string()),
                    },
                };
                (index, agent_result)
            });
        }

        // Results are emitted to `events` in true completion order (§4.8 step 6), but the
        // final `results` vector is reordered back to the caller's `target_models` order.
        let mut by_index: Vec<Option<AgentResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let (index, agent_result) = joined.map_err(|e| CoreError::Internal(e.to_string()))?;
            completed += 1;
            if let Some(tx) = &events {
                let _ = tx
                    .send(TurnEvent::Result { result: agent_result.clone(), completed, total })
                    .await;
            }
            by_index[index] = Some(agent_result);
        }

        if let Some(options) = autosave {
            self.write_transcript(&conversation.id, &display_names, options).await;
        }

        if let Some(tx) = &events {
            let _ = tx.send(TurnEvent::Done).await;
        }

        let results: Vec<AgentResult> = by_index.into_iter().flatten().collect();
        Ok(TurnResponse { conversation_id: conversation.id, results })
    }

    /// Best-effort transcript write (§4.8 step 7, §7): failures are logged, never surfaced.
    async fn write_transcript(&self, conversation_id: &str, display_names: &HashMap<String, String>, options: AutosaveOptions) {
        let result = async {
            let conversation = self.store.get_conversation(conversation_id).await?;
            let messages = self.store.list_messages(conversation_id).await?;
            let rendered = transcript::render(options.format, &conversation, &messages, display_names)?;
            tokio::fs::create_dir_all(&options.transcripts_dir).await?;
            let path = options
                .transcripts_dir
                .join(format!("conversation-{conversation_id}.{}", options.format.extension()));
            tokio::fs::write(&path, rendered).await?;
            Ok::<_, CoreError>(())
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(error = %e, conversation_id, "auto-save transcript write failed");
        }
    }
}

async fn dispatch_one(
    adapter: Option<Arc<dyn ProviderAdapter>>,
    target: &NormalizedTarget,
    system: String,
    messages: Vec<AdapterMessage>,
    provider_state: Option<Value>,
) -> Result<AdapterResponse> {
    let adapter = adapter.ok_or_else(|| CoreError::validation(format!("unknown provider '{}'", target.provider)))?;

    let options = serde_json::from_value(target.options.clone()).unwrap_or_default();
    let request = AdapterRequest {
        model: target.model_id.clone(),
        system: Some(system),
        messages,
        options,
        provider_state,
    };
    adapter.send(request).await
}

/// Carry over `providerState[stateKey]` across turns (§4.8 step 5): the last message from each
/// agent, keyed by the `agent_id` embedded in its speaker, contributes its stored provider state.
fn provider_states_by_agent(messages: &[ConversationMessage]) -> HashMap<String, Value> {
    let mut out = HashMap::new();
    for message in messages {
        let Some(agent_id) = message.agent_id() else { continue };
        if let Some(state) = message.metadata.get("provider_state") {
            if !state.is_null() {
                out.insert(agent_id.to_string(), state.clone());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn orchestrator_with(providers: &[(&str, &str)]) -> Orchestrator {
        let mut config = Config::default();
        for (provider, model) in providers {
            config.providers.insert(
                provider.to_string(),
                crate::config::ProviderDefaults {
                    default_model_id: Some(model.to_string()),
                    max_tokens: Some(4096),
                    reasoning_effort: None,
                    thinking_budget_tokens: None,
                    api_key: None,
                },
            );
        }
        let store = Store::open_in_memory().await.unwrap();
        Orchestrator::new(store, config, HashMap::new())
    }

    #[tokio::test]
    async fn normalize_target_resolves_default_model_and_derives_agent_id() {
        let orch = orchestrator_with(&[("openai", "gpt-5")]).await;
        let input = TargetModelInput {
            provider: "OpenAI".to_string(),
            model_id: "default".to_string(),
            name: None,
            agent_id: None,
            options: None,
        };
        let target = orch.normalize_target(0, &input);
        assert_eq!(target.provider, "openai");
        assert_eq!(target.model_id, "gpt-5");
        assert_eq!(target.agent_id, "openai:gpt-5:0");
        assert_eq!(target.display_name, "gpt-5");
        assert_eq!(target.options["maxTokens"], 4096);
    }

    #[tokio::test]
    async fn normalize_target_keeps_explicit_model_and_agent_id() {
        let orch = orchestrator_with(&[]).await;
        let input = TargetModelInput {
            provider: "anthropic".to_string(),
            model_id: "claude-opus".to_string(),
            name: Some("Claude".to_string()),
            agent_id: Some("claude-1".to_string()),
            options: None,
        };
        let target = orch.normalize_target(2, &input);
        assert_eq!(target.model_id, "claude-opus");
        assert_eq!(target.agent_id, "claude-1");
        assert_eq!(target.display_name, "Claude");
    }

    #[tokio::test]
    async fn capability_note_mentions_only_search_capable_agents() {
        let orch = orchestrator_with(&[]).await;
        let plain = NormalizedTarget {
            provider: "openai".to_string(),
            model_id: "gpt-5".to_string(),
            display_name: "gpt-5".to_string(),
            agent_id: "a".to_string(),
            options: serde_json::json!({}),
        };
        let searcher = NormalizedTarget {
            provider: "anthropic".to_string(),
            model_id: "claude".to_string(),
            display_name: "claude".to_string(),
            agent_id: "b".to_string(),
            options: serde_json::json!({ "tools": [{ "type": "web_search" }] }),
        };
        let note = orch.capability_note(&[plain, searcher]).unwrap();
        assert!(note.contains('b'));
        assert!(!note.contains("agent a"));
    }

    #[tokio::test]
    async fn run_turn_with_mock_adapter_persists_and_reports_results() {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert("mock".to_string(), Arc::new(crate::provider::MockAdapter::new()));

        let mut config = Config::default();
        config.providers.insert(
            "mock".to_string(),
            crate::config::ProviderDefaults {
                default_model_id: Some("mock-echo".to_string()),
                max_tokens: None,
                reasoning_effort: None,
                thinking_budget_tokens: None,
                api_key: None,
            },
        );
        let store = Store::open_in_memory().await.unwrap();
        let orch = Orchestrator::new(store.clone(), config, adapters);

        let request = TurnRequest {
            conversation_id: None,
            user_message: "hi".to_string(),
            target_models: vec![TargetModelInput {
                provider: "mock".to_string(),
                model_id: "mock-echo".to_string(),
                name: None,
                agent_id: None,
                options: None,
            }],
            system_prompts: None,
            text_attachments: vec![],
        };

        let response = orch.run_turn(request, None).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].text.as_deref(), Some("Echo: hi"));

        let messages = store.list_messages(&response.conversation_id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_user());
        assert_eq!(messages[1].agent_id(), Some("mock:mock-echo:0"));
    }

    #[tokio::test]
    async fn run_turn_reports_partial_failure_without_failing_the_turn() {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        adapters.insert("mock".to_string(), Arc::new(crate::provider::MockAdapter::new()));

        let store = Store::open_in_memory().await.unwrap();
        let orch = Orchestrator::new(store, Config::default(), adapters);

        let request = TurnRequest {
            conversation_id: None,
            user_message: "hi".to_string(),
            target_models: vec![
                TargetModelInput {
                    provider: "mock".to_string(),
                    model_id: "mock-error".to_string(),
                    name: None,
                    agent_id: Some("broken".to_string()),
                    options: None,
                },
                TargetModelInput {
                    provider: "mock".to_string(),
                    model_id: "mock-lorem".to_string(),
                    name: None,
                    agent_id: Some("ok".to_string()),
                    options: None,
                },
            ],
            system_prompts: None,
            text_attachments: vec![],
        };

        let response = orch.run_turn(request, None).await.unwrap();
        assert_eq!(response.results.len(), 2);
        let broken = response.results.iter().find(|r| r.agent_id == "broken").unwrap();
        let ok = response.results.iter().find(|r| r.agent_id == "ok").unwrap();
        assert!(broken.error.is_some());
        assert!(ok.text.is_some());
    }
}
