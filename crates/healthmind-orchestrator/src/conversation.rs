//! Reconstructing the LLM-visible conversation from persisted chat history.
//!
//! A persisted assistant turn's `metadata` (see `healthmind_store::chat`)
//! records only `{name, arguments, result}` per tool call — never the wire
//! call id, and never a separate `tool`-role row. This module expands that
//! back into the `assistant-with-tool-calls` + `tool`-result turns the
//! model actually produced, synthesizing fresh call ids since the
//! originals are not retained.

use healthmind_gateway::{Message, ToolCallRequest};
use healthmind_store::ChatMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// One tool call recorded in an assistant message's `metadata` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub arguments: Value,
    pub result: Value,
}

/// Encode accumulated tool-call records for storage in `ChatMessage.metadata`.
/// `None` when the turn made no tool calls, matching the nullable column.
pub fn encode_tool_calls(records: &[ToolCallRecord]) -> Option<String> {
    if records.is_empty() {
        None
    } else {
        serde_json::to_string(records).ok()
    }
}

/// Build the full LLM-visible message list: a synthesized system prompt
/// followed by the session's stored turns, with tool turns reconstituted.
pub fn build_messages(system_prompt: &str, stored: &[ChatMessage]) -> Vec<Message> {
    let mut messages = vec![Message::system(system_prompt)];

    for (turn, msg) in stored.iter().enumerate() {
        match msg.role.as_str() {
            "user" => messages.push(Message::user(msg.content.clone())),
            "assistant" => push_assistant_turn(&mut messages, turn, msg),
            other => warn!(role = other, "skipping unrecognized role during conversation assembly"),
        }
    }

    messages
}

fn push_assistant_turn(messages: &mut Vec<Message>, turn: usize, msg: &ChatMessage) {
    let Some(raw) = &msg.metadata else {
        messages.push(Message::assistant(msg.content.clone()));
        return;
    };

    let records: Vec<ToolCallRecord> = match serde_json::from_str(raw) {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "assistant message metadata was not a valid tool-call list, dropping it");
            messages.push(Message::assistant(msg.content.clone()));
            return;
        }
    };

    let requests = records
        .iter()
        .enumerate()
        .map(|(i, r)| ToolCallRequest {
            id: format!("call_{turn}_{i}"),
            name: r.name.clone(),
            arguments: r.arguments.clone(),
        })
        .collect();
    messages.push(Message::assistant_tool_calls(msg.content.clone(), requests));

    for (i, record) in records.iter().enumerate() {
        messages.push(Message::tool_result(format!("call_{turn}_{i}"), record.result.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthmind_gateway::Role;

    fn message(id: i64, role: &str, content: &str, metadata: Option<&str>) -> ChatMessage {
        ChatMessage {
            id,
            session_id: "s1".into(),
            role: role.into(),
            content: content.into(),
            metadata: metadata.map(str::to_string),
            created_at: id,
        }
    }

    #[test]
    fn system_prompt_leads_every_conversation() {
        let messages = build_messages("be helpful", &[]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::System);
    }

    #[test]
    fn plain_turns_roundtrip_without_tool_calls() {
        let stored = vec![message(1, "user", "hi", None), message(2, "assistant", "hello", None)];
        let messages = build_messages("sys", &stored);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(messages[2].tool_calls.is_empty());
    }

    #[test]
    fn assistant_metadata_expands_into_tool_call_and_result_turns() {
        let metadata = serde_json::to_string(&vec![ToolCallRecord {
            name: "get_recent_labs".into(),
            arguments: serde_json::json!({"days": 30}),
            result: serde_json::json!({"results": []}),
        }])
        .unwrap();
        let stored = vec![
            message(1, "user", "what are my recent labs?", None),
            message(2, "assistant", "you have no recent labs", Some(&metadata)),
        ];

        let messages = build_messages("sys", &stored);
        // system, user, assistant-with-tool-calls, tool-result
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].tool_calls.len(), 1);
        assert_eq!(messages[2].tool_calls[0].name, "get_recent_labs");
        assert_eq!(messages[3].role, Role::Tool);
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_1_0"));
    }

    #[test]
    fn unrecognized_role_is_skipped_not_fatal() {
        let stored = vec![message(1, "system", "ignored", None), message(2, "user", "hi", None)];
        let messages = build_messages("sys", &stored);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::User);
    }
}
