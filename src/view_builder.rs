//! ViewBuilder (§4.7): constructs the per-agent projection of a conversation handed to its
//! adapter for the current turn.

use crate::provider::{AdapterMessage, Role};
use crate::store::ConversationMessage;
use std::collections::HashMap;

/// `(provider, model_id, agent_id)` of the agent this view is being built for.
#[derive(Debug, Clone)]
pub struct Target {
    pub provider: String,
    pub model_id: String,
    pub agent_id: String,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub title: Option<String>,
    pub content: String,
}

/// A single prior round's messages, already split into the user message and the agent replies
/// that followed it, keyed by the replying agent's `speaker` ("agent:<agent_id>").
#[derive(Debug, Clone)]
pub struct RoundView {
    pub round_number: i64,
    pub user_content: String,
    /// agent_id -> (display name or model id, reply content)
    pub replies: Vec<PeerReply>,
}

#[derive(Debug, Clone)]
pub struct PeerReply {
    pub agent_id: String,
    pub model_id: String,
    pub display_name: String,
    pub content: String,
}

pub struct SystemPromptConfig {
    pub common_template: String,
    pub per_agent: HashMap<String, String>,
    pub per_model: HashMap<String, String>,
    pub provider_default: Option<String>,
}

/// Self or peer, judged the way both the ViewBuilder and the persistence layer must (§9): agent
/// id match first, model id fallback.
pub fn is_self(target: &Target, candidate_agent_id: &str, candidate_model_id: &str) -> bool {
    if !target.agent_id.is_empty() && candidate_agent_id == target.agent_id {
        return true;
    }
    candidate_model_id == target.model_id
}

/// Build the system primer: common template (with `{{modelId}}` substituted) plus an
/// agent/model/provider-level override, separated by a blank line. An explicit empty string
/// override suppresses the provider default entirely.
pub fn build_system_primer(target: &Target, config: &SystemPromptConfig) -> String {
    let common = config.common_template.replace("{{modelId}}", &target.model_id);

    let override_text = config
        .per_agent
        .get(&target.agent_id)
        .or_else(|| config.per_model.get(&target.model_id))
        .cloned()
        .or_else(|| config.provider_default.clone());

    match override_text {
        Some(text) if text.is_empty() => common,
        Some(text) => format!("{common}\n\n{text}"),
        None => common,
    }
}

/// Project prior rounds into alternating user/assistant blocks for `target`, applying the
/// self-suppression rule: `target`'s own prior reply is rendered as an assistant message, never
/// as a `[tag]:` peer line in the user block.
pub fn project_history(target: &Target, rounds: &[RoundView]) -> Vec<AdapterMessage> {
    let mut out = Vec::with_capacity(rounds.len() * 2);

    for round in rounds {
        let mut user_block = format!("User: {}", round.user_content);
        let mut own_reply: Option<&PeerReply> = None;

        for reply in &round.replies {
            if is_self(target, &reply.agent_id, &reply.model_id) {
                own_reply = Some(reply);
                continue;
            }
            user_block.push('\n');
            user_block.push_str(&format!("[{}]: {}", reply.display_name, reply.content));
        }

        out.push(AdapterMessage { role: Role::User, content: user_block });
        if let Some(reply) = own_reply {
            out.push(AdapterMessage {
                role: Role::Assistant,
                content: reply.content.clone(),
            });
        }
    }

    out
}

/// Final view sent to the adapter for a turn: system primer, projected history, attachments, and
/// the literal current user message.
pub struct View {
    pub system: String,
    pub messages: Vec<AdapterMessage>,
}

pub fn build_view(
    target: &Target,
    config: &SystemPromptConfig,
    rounds: &[RoundView],
    attachments: &[Attachment],
    current_user_message: &str,
) -> View {
    let system = build_system_primer(target, config);
    let mut messages = project_history(target, rounds);

    for attachment in attachments {
        let content = match &attachment.title {
            Some(title) => format!("Attachment: {title}\n{}", attachment.content),
            None => format!("Attachment:\n{}", attachment.content),
        };
        messages.push(AdapterMessage { role: Role::User, content });
    }

    messages.push(AdapterMessage {
        role: Role::User,
        content: format!("User: {current_user_message}"),
    });

    View { system, messages }
}

/// Build the round views the ViewBuilder needs from the store's flat message list, grouping by
/// `round_number` and splitting the user message from its agent replies.
pub fn rounds_from_messages(messages: &[ConversationMessage], display_names: &HashMap<String, String>) -> Vec<RoundView> {
    let mut by_round: Vec<RoundView> = Vec::new();

    for message in messages {
        if message.is_user() {
            by_round.push(RoundView {
                round_number: message.round_number,
                user_content: message.content.clone(),
                replies: Vec::new(),
            });
            continue;
        }

        let Some(agent_id) = message.agent_id() else { continue };
        let Some(round) = by_round.iter_mut().find(|r| r.round_number == message.round_number) else {
            continue;
        };
        let model_id = message
            .metadata
            .get("model_id")
            .and_then(|v| v.as_str())
            .unwrap_or(agent_id)
            .to_string();
        let display_name = display_names.get(agent_id).cloned().unwrap_or_else(|| model_id.clone());

        round.replies.push(PeerReply {
            agent_id: agent_id.to_string(),
            model_id,
            display_name,
            content: message.content.clone(),
        });
    }

    by_round
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(agent_id: &str, model_id: &str) -> Target {
        Target {
            provider: "mock".to_string(),
            model_id: model_id.to_string(),
            agent_id: agent_id.to_string(),
        }
    }

    fn config() -> SystemPromptConfig {
        SystemPromptConfig {
            common_template: "You are {{modelId}}.".to_string(),
            per_agent: HashMap::new(),
            per_model: HashMap::new(),
            provider_default: None,
        }
    }

    #[test]
    fn self_suppression_omits_own_tag_and_renders_as_assistant() {
        let rounds = vec![RoundView {
            round_number: 1,
            user_content: "hi".to_string(),
            replies: vec![
                PeerReply {
                    agent_id: "A".to_string(),
                    model_id: "X".to_string(),
                    display_name: "X".to_string(),
                    content: "reply from A".to_string(),
                },
                PeerReply {
                    agent_id: "B".to_string(),
                    model_id: "Y".to_string(),
                    display_name: "Y".to_string(),
                    content: "reply from B".to_string(),
                },
            ],
        }];

        let history = project_history(&target("A", "X"), &rounds);
        assert_eq!(history.len(), 2);
        assert!(!history[0].content.contains("[X]:"));
        assert!(history[0].content.contains("[Y]:"));
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "reply from A");
    }

    #[test]
    fn empty_override_suppresses_provider_default() {
        let mut cfg = config();
        cfg.provider_default = Some("default system prompt".to_string());
        cfg.per_agent.insert("A".to_string(), String::new());

        let primer = build_system_primer(&target("A", "X"), &cfg);
        assert_eq!(primer, "You are X.");
    }

    #[test]
    fn determinism_same_inputs_same_view() {
        let cfg = config();
        let rounds = vec![];
        let view1 = build_view(&target("A", "X"), &cfg, &rounds, &[], "hi");
        let view2 = build_view(&target("A", "X"), &cfg, &rounds, &[], "hi");
        assert_eq!(view1.system, view2.system);
        assert_eq!(view1.messages.len(), view2.messages.len());
        assert_eq!(view1.messages.last().unwrap().content, "User: hi");
    }
}
