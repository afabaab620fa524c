//! Transcript export (§6): renders a persisted conversation as Markdown or JSON, for the
//! `GET /conversations/{id}/export` route and as the best-effort auto-save side effect of a turn.

use crate::store::{Conversation, ConversationMessage};
use crate::view_builder::{rounds_from_messages, RoundView};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptFormat {
    Markdown,
    Json,
}

impl TranscriptFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "md" | "markdown" => Some(Self::Markdown),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Markdown => "text/markdown",
            Self::Json => "application/json",
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRound<'a> {
    round_number: i64,
    user_message: &'a str,
    replies: Vec<JsonReply<'a>>,
}

#[derive(Debug, Serialize)]
struct JsonReply<'a> {
    agent_id: &'a str,
    display_name: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct JsonTranscript<'a> {
    conversation_id: &'a str,
    started_at: String,
    rounds: Vec<JsonRound<'a>>,
}

/// Render `conversation`'s messages as Markdown per §6's format: a heading, start timestamp,
/// then one `## Round N` section per round with a `### User` block and one `### <name>` block
/// per agent reply, all fenced as code.
pub fn render_markdown(
    conversation: &Conversation,
    messages: &[ConversationMessage],
    display_names: &HashMap<String, String>,
) -> String {
    let rounds = rounds_from_messages(messages, display_names);
    let mut out = String::new();

    out.push_str(&format!("# Conversation {}\n", conversation.id));
    out.push_str(&format!("Started: {}\n\n", conversation.created_at.to_rfc3339()));

    for round in &rounds {
        render_markdown_round(&mut out, round, messages);
    }

    out
}

fn render_markdown_round(out: &mut String, round: &RoundView, messages: &[ConversationMessage]) {
    out.push_str(&format!("## Round {}\n", round.round_number));

    let round_time = messages
        .iter()
        .find(|m| m.round_number == round.round_number && m.is_user())
        .map(|m| m.created_at.to_rfc3339())
        .unwrap_or_default();
    out.push_str(&format!("_Time: {round_time}_\n\n"));

    out.push_str("### User\n```\n");
    out.push_str(&round.user_content);
    out.push_str("\n```\n\n");

    for reply in &round.replies {
        out.push_str(&format!("### {}\n```\n", reply.display_name));
        out.push_str(&reply.content);
        out.push_str("\n```\n\n");
    }
}

/// Render `conversation`'s messages as JSON (§6 names Markdown and JSON as the two supported
/// export formats; JSON mirrors the same round/reply structure without the fenced formatting).
pub fn render_json(
    conversation: &Conversation,
    messages: &[ConversationMessage],
    display_names: &HashMap<String, String>,
) -> serde_json::Result<String> {
    let rounds = rounds_from_messages(messages, display_names);
    let json_rounds = rounds
        .iter()
        .map(|round| JsonRound {
            round_number: round.round_number,
            user_message: &round.user_content,
            replies: round
                .replies
                .iter()
                .map(|r| JsonReply {
                    agent_id: &r.agent_id,
                    display_name: &r.display_name,
                    content: &r.content,
                })
                .collect(),
        })
        .collect();

    let transcript = JsonTranscript {
        conversation_id: &conversation.id,
        started_at: conversation.created_at.to_rfc3339(),
        rounds: json_rounds,
    };
    serde_json::to_string_pretty(&transcript)
}

pub fn render(
    format: TranscriptFormat,
    conversation: &Conversation,
    messages: &[ConversationMessage],
    display_names: &HashMap<String, String>,
) -> crate::error::Result<String> {
    match format {
        TranscriptFormat::Markdown => Ok(render_markdown(conversation, messages, display_names)),
        TranscriptFormat::Json => Ok(render_json(conversation, messages, display_names)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::types::{new_id, now};
    use serde_json::json;

    fn conversation() -> Conversation {
        Conversation {
            id: "conv-1".to_string(),
            project_id: "proj-1".to_string(),
            title: "Test".to_string(),
            summary: None,
            round_count: 1,
            created_at: now(),
            updated_at: now(),
        }
    }

    fn user_message(round: i64, content: &str) -> ConversationMessage {
        ConversationMessage {
            id: new_id(),
            conversation_id: "conv-1".to_string(),
            round_number: round,
            speaker: "user".to_string(),
            content: content.to_string(),
            metadata: json!({}),
            created_at: now(),
        }
    }

    fn agent_message(round: i64, agent_id: &str, content: &str) -> ConversationMessage {
        ConversationMessage {
            id: new_id(),
            conversation_id: "conv-1".to_string(),
            round_number: round,
            speaker: format!("agent:{agent_id}"),
            content: content.to_string(),
            metadata: json!({ "model_id": agent_id }),
            created_at: now(),
        }
    }

    #[test]
    fn markdown_includes_round_and_agent_sections() {
        let conversation = conversation();
        let messages = vec![user_message(1, "hello"), agent_message(1, "gpt-5", "hi there")];
        let names = HashMap::from([("gpt-5".to_string(), "GPT-5".to_string())]);

        let md = render_markdown(&conversation, &messages, &names);
        assert!(md.starts_with("# Conversation conv-1\n"));
        assert!(md.contains("## Round 1\n"));
        assert!(md.contains("### User\n```\nhello\n```\n"));
        assert!(md.contains("### GPT-5\n```\nhi there\n```\n"));
    }

    #[test]
    fn json_round_trips_round_structure() {
        let conversation = conversation();
        let messages = vec![user_message(1, "hello"), agent_message(1, "gpt-5", "hi there")];
        let names = HashMap::new();

        let raw = render_json(&conversation, &messages, &names).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["conversation_id"], "conv-1");
        assert_eq!(parsed["rounds"][0]["user_message"], "hello");
        assert_eq!(parsed["rounds"][0]["replies"][0]["content"], "hi there");
    }
}
