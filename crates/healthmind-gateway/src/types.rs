//! Wire-agnostic conversation types shared by every gateway operation.
//!
//! These mirror the shape of `openintent-agent::llm::types` (`Role`,
//! `Message`, `ToolCall`, `LlmResponse`) but speak the OpenAI-compatible
//! function-calling wire format instead of Anthropic's content-block model.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// A single participant role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by the model, already bound to an invocation id.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// One turn in a conversation.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    /// An assistant turn that emitted one or more tool calls.
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self { role: Role::Assistant, content: Some(content.into()), tool_calls, tool_call_id: None }
    }

    /// A `tool`-role turn carrying the JSON result of one call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// A tool the model may call, described for the wire's `tools` array.
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Non-streaming and streaming chat completion options.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), temperature: None, max_tokens: None }
    }
}

/// Options for the tool-enabled chat loop. `max_tool_iterations` bounds how
/// many send/execute-tools round trips `chat_with_tools` will perform before
/// giving up with [`crate::GatewayError::ToolLoopExhausted`].
#[derive(Debug, Clone)]
pub struct ToolChatOptions {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_tool_iterations: u32,
}

impl ToolChatOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self { model: model.into(), temperature: None, max_tokens: None, max_tool_iterations: 8 }
    }
}

/// One event in the lazy sequence `chat_with_tools`/`chat_stream` produce.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GatewayEvent {
    Content { delta: String },
    ToolCall { name: String, arguments: Value },
    ToolResult { name: String, result: Value },
    Done,
    Error { reason: String },
}

/// The result of probing the inference server.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub reachable: bool,
    pub installed_models: Vec<String>,
    pub configured_chat_model: String,
    pub configured_extraction_model: String,
}

/// A tool dispatcher bound to a specific caller, invoked synchronously (one
/// call at a time, awaited to completion) by `chat_with_tools`.
pub type ToolExecutor =
    Arc<dyn Fn(String, Value) -> Pin<Box<dyn Future<Output = Value> + Send>> + Send + Sync>;
