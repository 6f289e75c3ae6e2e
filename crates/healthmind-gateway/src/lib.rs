//! Adapter to the locally hosted, OpenAI-compatible inference server used
//! for chat completion, document extraction, and tool-calling.

mod client;
mod error;
mod streaming;
mod types;

pub use client::LlmGateway;
pub use error::{GatewayError, GatewayResult};
pub use types::{
    ChatOptions, GatewayEvent, HealthStatus, Message, Role, ToolCallRequest, ToolChatOptions,
    ToolExecutor, ToolSpec,
};
