//! The single adapter every component uses to talk to the locally hosted
//! inference server.
//!
//! Grounded on `openintent-agent::llm::client::LlmClient`'s reqwest-wrapper
//! shape (config struct, `chat`/`stream_chat`/`stream_chat_with_callback`
//! method triad, byte-stream consumption loop) but targeting the
//! OpenAI-compatible wire format via [`crate::streaming::StreamAccumulator`]
//! instead of Anthropic's content-block model.

use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};

use crate::error::{GatewayError, GatewayResult};
use crate::streaming::{ParsedToolCall, StreamAccumulator};
use crate::types::{
    ChatOptions, GatewayEvent, HealthStatus, Message, Role, ToolCallRequest, ToolChatOptions,
    ToolExecutor, ToolSpec,
};

/// One item produced while draining a single streamed turn: either a
/// content fragment as it arrives, or the turn's final accumulated text and
/// tool calls once the server signals `[DONE]` (or the byte stream ends).
enum TurnEvent {
    Content(String),
    Done { text: String, tool_calls: Vec<ParsedToolCall> },
}

/// A stateless adapter to a locally hosted, OpenAI-compatible chat
/// completion server. Cheap to clone — the underlying `reqwest::Client`
/// pools connections internally.
#[derive(Clone)]
pub struct LlmGateway {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl LlmGateway {
    /// Build a gateway pointed at `base_url` with a per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("healthmind/0.1")
            .build()
            .map_err(|e| GatewayError::ConnectionFailed(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into(), timeout })
    }

    /// Probe the inference server's model-listing endpoint. Never raises —
    /// an unreachable server is reported as `reachable: false`, not an error.
    #[instrument(skip(self))]
    pub async fn health_check(&self, chat_model: &str, extraction_model: &str) -> HealthStatus {
        let url = format!("{}/v1/models", self.base_url.trim_end_matches('/'));
        let configured_chat_model = chat_model.to_string();
        let configured_extraction_model = extraction_model.to_string();

        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;

        let installed_models = match response {
            Ok(resp) if resp.status().is_success() => resp
                .json::<ModelsResponse>()
                .await
                .map(|r| r.data.into_iter().map(|m| m.id).collect())
                .unwrap_or_default(),
            Ok(resp) => {
                warn!(status = %resp.status(), "inference server model listing returned non-success");
                return HealthStatus {
                    reachable: false,
                    installed_models: Vec::new(),
                    configured_chat_model,
                    configured_extraction_model,
                };
            }
            Err(e) => {
                debug!(error = %e, "inference server unreachable");
                return HealthStatus {
                    reachable: false,
                    installed_models: Vec::new(),
                    configured_chat_model,
                    configured_extraction_model,
                };
            }
        };

        HealthStatus {
            reachable: true,
            installed_models,
            configured_chat_model,
            configured_extraction_model,
        }
    }

    /// Non-streaming completion. Used by the document extractor, which
    /// needs the whole reply before it can parse it as JSON.
    #[instrument(skip(self, messages))]
    pub async fn chat(&self, messages: &[Message], options: &ChatOptions) -> GatewayResult<String> {
        let body = build_body(messages, &[], &options.model, options.temperature, options.max_tokens, false);
        let response = self.send(&body).await?;
        let value: Value = response.json().await.map_err(|e| GatewayError::Http {
            status: 0,
            body: format!("failed to decode response body: {e}"),
        })?;

        value["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Http {
                status: 0,
                body: "response carried no message content".into(),
            })
    }

    /// Streaming completion with no tools — each yielded event is either a
    /// `Content` fragment, emitted as soon as its chunk arrives off the
    /// wire, or the terminal `Done`/`Error`.
    pub fn chat_stream(
        &self,
        messages: Vec<Message>,
        options: ChatOptions,
    ) -> impl Stream<Item = GatewayEvent> + Send + 'static {
        let gateway = self.clone();
        stream! {
            let body = build_body(&messages, &[], &options.model, options.temperature, options.max_tokens, true);
            let mut turn = Box::pin(gateway.stream_turn(body));
            while let Some(item) = turn.next().await {
                match item {
                    Ok(TurnEvent::Content(delta)) => yield GatewayEvent::Content { delta },
                    Ok(TurnEvent::Done { .. }) => {
                        yield GatewayEvent::Done;
                        return;
                    }
                    Err(e) => {
                        yield GatewayEvent::Error { reason: e.to_string() };
                        return;
                    }
                }
            }
        }
    }

    /// The core primitive for grounded chat: repeatedly streams a turn,
    /// executes any tool calls the model emits through `tool_executor`, and
    /// loops until the model produces a tool-call-free turn or the
    /// iteration cap is hit. Content deltas are forwarded as each chunk
    /// arrives off the wire, not buffered until the turn completes.
    pub fn chat_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        tool_executor: ToolExecutor,
        options: ToolChatOptions,
    ) -> impl Stream<Item = GatewayEvent> + Send + 'static {
        let gateway = self.clone();
        stream! {
            let mut messages = messages;
            let mut iteration = 0u32;

            loop {
                iteration += 1;
                if iteration > options.max_tool_iterations {
                    yield GatewayEvent::Error { reason: GatewayError::ToolLoopExhausted(options.max_tool_iterations).to_string() };
                    return;
                }

                let body = build_body(
                    &messages,
                    &tools,
                    &options.model,
                    options.temperature,
                    options.max_tokens,
                    true,
                );

                let mut turn = Box::pin(gateway.stream_turn(body));
                let mut text = String::new();
                let mut tool_calls: Vec<ParsedToolCall> = Vec::new();
                let mut turn_failed = false;
                while let Some(item) = turn.next().await {
                    match item {
                        Ok(TurnEvent::Content(delta)) => yield GatewayEvent::Content { delta },
                        Ok(TurnEvent::Done { text: t, tool_calls: tc }) => {
                            text = t;
                            tool_calls = tc;
                        }
                        Err(e) => {
                            yield GatewayEvent::Error { reason: e.to_string() };
                            turn_failed = true;
                            break;
                        }
                    }
                }
                if turn_failed {
                    return;
                }

                if tool_calls.is_empty() {
                    yield GatewayEvent::Done;
                    return;
                }

                let mut recorded = Vec::with_capacity(tool_calls.len());
                for call in tool_calls {
                    let arguments: Value = match serde_json::from_str(&call.raw_arguments) {
                        Ok(v) => v,
                        Err(e) => json!({ "error": "invalid_arguments", "detail": e.to_string() }),
                    };

                    yield GatewayEvent::ToolCall { name: call.name.clone(), arguments: arguments.clone() };
                    let result = tool_executor(call.name.clone(), arguments.clone()).await;
                    yield GatewayEvent::ToolResult { name: call.name.clone(), result: result.clone() };

                    recorded.push((call.id, call.name, arguments, result));
                }

                let tool_call_requests = recorded
                    .iter()
                    .map(|(id, name, args, _)| ToolCallRequest {
                        id: id.clone(),
                        name: name.clone(),
                        arguments: args.clone(),
                    })
                    .collect();
                messages.push(Message::assistant_tool_calls(text, tool_call_requests));
                for (id, _name, _args, result) in recorded {
                    messages.push(Message::tool_result(id, result.to_string()));
                }
            }
        }
    }

    // -- internals -----------------------------------------------------

    async fn send(&self, body: &Value) -> GatewayResult<reqwest::Response> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http { status, body });
        }

        Ok(response)
    }

    /// Drive one streamed turn, yielding each content fragment as its chunk
    /// arrives off the wire and finishing with the turn's accumulated text
    /// and tool calls. This is the only place that reads the byte stream —
    /// `chat_stream` and `chat_with_tools` both drive it from inside their
    /// own `stream!` blocks so a caller's content deltas are never buffered
    /// behind a whole turn.
    fn stream_turn(&self, body: Value) -> impl Stream<Item = GatewayResult<TurnEvent>> + Send + 'static {
        let gateway = self.clone();
        stream! {
            let response = match gateway.send(&body).await {
                Ok(r) => r,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut acc = StreamAccumulator::new();

            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(e) => {
                        let err = if e.is_timeout() { GatewayError::Timeout } else { GatewayError::ConnectionFailed(e.to_string()) };
                        yield Err(err);
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].to_string();
                    buffer.drain(..=newline);
                    match acc.feed_line(&line) {
                        Ok(Some(delta)) => yield Ok(TurnEvent::Content(delta)),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    if acc.is_done() {
                        let (text, tool_calls) = acc.into_parts();
                        yield Ok(TurnEvent::Done { text, tool_calls });
                        return;
                    }
                }
            }

            let (text, tool_calls) = acc.into_parts();
            yield Ok(TurnEvent::Done { text, tool_calls });
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct ModelEntry {
    id: String,
}

fn build_body(
    messages: &[Message],
    tools: &[ToolSpec],
    model: &str,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    stream: bool,
) -> Value {
    let mut body = json!({
        "model": model,
        "messages": messages.iter().map(message_to_wire).collect::<Vec<_>>(),
        "stream": stream,
    });
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    if let Some(m) = max_tokens {
        body["max_tokens"] = json!(m);
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools.iter().map(tool_to_wire).collect());
    }
    body
}

fn message_to_wire(message: &Message) -> Value {
    match message.role {
        Role::System => json!({ "role": "system", "content": message.content.clone().unwrap_or_default() }),
        Role::User => json!({ "role": "user", "content": message.content.clone().unwrap_or_default() }),
        Role::Assistant => {
            let mut wire = json!({
                "role": "assistant",
                "content": message.content.clone().unwrap_or_default(),
            });
            if !message.tool_calls.is_empty() {
                let calls: Vec<Value> = message
                    .tool_calls
                    .iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": serde_json::to_string(&call.arguments).unwrap_or_default(),
                            },
                        })
                    })
                    .collect();
                wire["tool_calls"] = Value::Array(calls);
            }
            wire
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": message.tool_call_id.clone().unwrap_or_default(),
            "content": message.content.clone().unwrap_or_default(),
        }),
    }
}

fn tool_to_wire(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        },
    })
}
