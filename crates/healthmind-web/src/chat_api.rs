//! Chat surface: session CRUD and the SSE message-send endpoint.
//!
//! Grounded on `openintent-web::api`'s handler shape (`State<Arc<AppState>>`
//! extractors, `Json<...>` bodies, `IntoResponse` tuples) and
//! `openintent-web::ws::handle_chat_message`'s turn-loop — rebuilt here as
//! an SSE stream per §4.6 instead of a WebSocket push loop.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use healthmind_gateway::GatewayEvent;
use healthmind_store::{ChatMessage, ChatSession};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSessionBody {
    pub user_id: String,
    pub title: Option<String>,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: String,
}

#[derive(Serialize)]
pub struct SessionWithMessages {
    #[serde(flatten)]
    pub session: ChatSession,
    pub messages: Vec<MessageView>,
}

/// A message as the client sees it: `metadata` is decoded from its stored
/// JSON-string form into a real JSON value (or omitted if there was none).
#[derive(Serialize)]
pub struct MessageView {
    pub id: i64,
    pub role: String,
    pub content: String,
    pub metadata: Option<Value>,
    pub created_at: i64,
}

impl From<ChatMessage> for MessageView {
    fn from(msg: ChatMessage) -> Self {
        let metadata = msg.metadata.as_deref().and_then(|raw| serde_json::from_str(raw).ok());
        Self { id: msg.id, role: msg.role, content: msg.content, metadata, created_at: msg.created_at }
    }
}

/// `POST /chat/sessions`
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(axum::http::StatusCode, Json<ChatSession>), ApiError> {
    let session = state.orchestrator.create_session(&body.user_id, body.title.as_deref()).await?;
    Ok((axum::http::StatusCode::CREATED, Json(session)))
}

/// `GET /chat/sessions?user_id=...`
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<ChatSession>>, ApiError> {
    let sessions = state.orchestrator.list_sessions(&query.user_id).await?;
    Ok(Json(sessions))
}

/// `GET /chat/sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionWithMessages>, ApiError> {
    let (session, messages) = state.orchestrator.get_session_with_messages(&id).await?;
    Ok(Json(SessionWithMessages { session, messages: messages.into_iter().map(Into::into).collect() }))
}

/// `DELETE /chat/sessions/{id}` — cascades to messages.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, ApiError> {
    state.orchestrator.delete_session(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SendMessageBody {
    pub content: String,
}

/// `POST /chat/sessions/{id}/messages` — the only streaming endpoint.
/// Resolves to a conflict/not-found error immediately if the session can't
/// be started; once streaming begins every gateway event is re-encoded as
/// one SSE `data:` frame per §4.6, in the orchestrator's yield order.
pub async fn send_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SendMessageBody>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state.orchestrator.send_message(&id, &body.content).await?;
    let frames = events.map(|event| Ok(Event::default().data(encode_frame(&event).to_string())));
    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}

/// One SSE frame per the wire contract in §4.6. `tool_result`'s `result`
/// field is the tool's JSON result re-stringified, not a nested object —
/// the transport never interprets tool payloads, only forwards them.
fn encode_frame(event: &GatewayEvent) -> Value {
    match event {
        GatewayEvent::Content { delta } => json!({ "type": "content", "content": delta }),
        GatewayEvent::ToolCall { name, arguments } => {
            json!({ "type": "tool_call", "name": name, "arguments": arguments })
        }
        GatewayEvent::ToolResult { name, result } => {
            json!({ "type": "tool_result", "name": name, "result": result.to_string() })
        }
        GatewayEvent::Done => json!({ "type": "done" }),
        GatewayEvent::Error { reason } => json!({ "type": "error", "error": reason }),
    }
}
