//! Session lifecycle and the grounded-chat message loop.
//!
//! `send_message` is the heart of the system: it persists the user turn,
//! hydrates the conversation, drives `healthmind_gateway::chat_with_tools`,
//! and persists the assistant turn only once a `Done` event is actually
//! observed. A client that disconnects mid-stream simply drops the
//! returned stream — `async-stream`'s generator semantics mean the loop
//! body never reaches its `Done` arm, so nothing gets persisted and the
//! active-stream lock releases via [`StreamGuard`]'s `Drop` impl.

use std::sync::Arc;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde_json::Value;
use tracing::{error, instrument};

use healthmind_gateway::{GatewayEvent, LlmGateway, Message, ToolChatOptions, ToolExecutor, ToolSpec};
use healthmind_store::{ActiveStreamStore, ChatMessage, ChatSession, HealthStore};
use healthmind_tools::HealthToolCatalog;

use crate::config::ChatConfig;
use crate::conversation::{ToolCallRecord, build_messages, encode_tool_calls};
use crate::error::OrchestratorResult;

/// The maximum length, in characters, of an auto-generated session title.
const AUTO_TITLE_MAX_LEN: usize = 60;

/// Orchestrates chat sessions: CRUD over [`healthmind_store::ChatSessionStore`]
/// plus the tool-calling send loop bound to a gateway and tool catalog.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: HealthStore,
    gateway: LlmGateway,
    tools: Arc<HealthToolCatalog>,
    config: ChatConfig,
}

impl ChatOrchestrator {
    pub fn new(store: HealthStore, gateway: LlmGateway, tools: Arc<HealthToolCatalog>, config: ChatConfig) -> Self {
        Self { store, gateway, tools, config }
    }

    #[instrument(skip(self))]
    pub async fn create_session(&self, owner: &str, title: Option<&str>) -> OrchestratorResult<ChatSession> {
        Ok(self.store.chat.create(owner, title).await?)
    }

    #[instrument(skip(self))]
    pub async fn list_sessions(&self, owner: &str) -> OrchestratorResult<Vec<ChatSession>> {
        Ok(self.store.chat.list_for_owner(owner).await?)
    }

    #[instrument(skip(self))]
    pub async fn get_session_with_messages(&self, id: &str) -> OrchestratorResult<(ChatSession, Vec<ChatMessage>)> {
        let session = self.store.chat.get(id).await?;
        let messages = self.store.chat.get_messages(id).await?;
        Ok((session, messages))
    }

    #[instrument(skip(self))]
    pub async fn delete_session(&self, id: &str) -> OrchestratorResult<()> {
        Ok(self.store.chat.delete(id).await?)
    }

    /// Send a user message and return the lazy event stream. Resolves
    /// eagerly (before any stream item is produced) once the session is
    /// confirmed to exist and the per-session write lock is acquired, so a
    /// conflict or not-found surfaces as a plain `Err`, not a stream event.
    #[instrument(skip(self, content))]
    pub async fn send_message(
        &self,
        session_id: &str,
        content: &str,
    ) -> OrchestratorResult<impl Stream<Item = GatewayEvent> + Send + 'static> {
        let session = self.store.chat.get(session_id).await?;
        self.store.active_streams.acquire(session_id).await?;
        // Bind the guard immediately: every fallible call below must release
        // the lock on an early `?` return, not just once the stream starts.
        let guard = StreamGuard::new(self.store.active_streams.clone(), session_id.to_string());

        let stored = self.prepare_turn(session_id, content, session.title.is_none()).await?;
        let messages = build_messages(&self.config.system_prompt, &stored);

        let tool_specs: Vec<ToolSpec> = self
            .tools
            .definitions()
            .iter()
            .map(|d| ToolSpec { name: d.name.clone(), description: d.description.clone(), parameters: d.parameters.clone() })
            .collect();
        let tool_executor = self.tool_executor(&session.owner);

        let mut options = ToolChatOptions::new(self.config.chat_model.clone());
        options.temperature = self.config.temperature;
        options.max_tokens = self.config.max_tokens;
        options.max_tool_iterations = self.config.max_tool_iterations;

        let gateway = self.gateway.clone();
        let chat_store = self.store.chat.clone();
        let session_id = session_id.to_string();

        Ok(stream! {
            // Moved in from `send_message` rather than constructed here: the
            // lock must already be held (and released on failure) across the
            // fallible setup above, not just for the lifetime of this stream.
            let _guard = guard;

            let mut content_buf = String::new();
            let mut tool_records: Vec<ToolCallRecord> = Vec::new();

            let mut inner = Box::pin(gateway.chat_with_tools(messages, tool_specs, tool_executor, options));

            while let Some(event) = inner.next().await {
                match &event {
                    GatewayEvent::Content { delta } => content_buf.push_str(delta),
                    GatewayEvent::ToolCall { name, arguments } => {
                        tool_records.push(ToolCallRecord { name: name.clone(), arguments: arguments.clone(), result: Value::Null });
                    }
                    GatewayEvent::ToolResult { name, result } => {
                        if let Some(record) = tool_records.iter_mut().rev().find(|r| r.name == *name && r.result.is_null()) {
                            record.result = result.clone();
                        }
                    }
                    GatewayEvent::Done => {
                        let metadata = encode_tool_calls(&tool_records);
                        if let Err(e) = chat_store.append_message(&session_id, "assistant", &content_buf, metadata.as_deref()).await {
                            error!(session_id = %session_id, error = %e, "failed to persist assistant turn");
                        }
                    }
                    GatewayEvent::Error { .. } => {}
                }
                yield event;
            }
        })
    }

    /// Persist the user turn, set the session title on the first message,
    /// and return the hydrated conversation. Factored out of `send_message`
    /// so its `?` early returns happen while the caller's `guard` local is
    /// still in scope, releasing the active-stream lock on any failure here.
    async fn prepare_turn(&self, session_id: &str, content: &str, needs_title: bool) -> OrchestratorResult<Vec<ChatMessage>> {
        self.store.chat.append_message(session_id, "user", content, None).await?;
        if needs_title {
            let title = auto_title(content);
            self.store.chat.set_title_if_unset(session_id, &title).await?;
        }
        Ok(self.store.chat.get_messages(session_id).await?)
    }

    fn tool_executor(&self, owner: &str) -> ToolExecutor {
        let tools = self.tools.clone();
        let store = self.store.clone();
        let owner = owner.to_string();
        Arc::new(move |name, args| {
            let tools = tools.clone();
            let store = store.clone();
            let owner = owner.clone();
            Box::pin(async move { tools.dispatch(&name, args, &owner, &store).await })
        })
    }
}

fn auto_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or(content).trim();
    if first_line.chars().count() <= AUTO_TITLE_MAX_LEN {
        first_line.to_string()
    } else {
        let truncated: String = first_line.chars().take(AUTO_TITLE_MAX_LEN).collect();
        format!("{truncated}\u{2026}")
    }
}

/// Releases the `active_streams` row for a session when dropped, whether
/// the stream ran to completion or was cancelled. `release` is async, so
/// the drop spawns it rather than blocking the dropping task.
struct StreamGuard {
    store: ActiveStreamStore,
    session_id: String,
}

impl StreamGuard {
    fn new(store: ActiveStreamStore, session_id: String) -> Self {
        Self { store, session_id }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let store = self.store.clone();
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            if let Err(e) = store.release(&session_id).await {
                tracing::warn!(session_id = %session_id, error = %e, "failed to release active stream lock");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthmind_store::{Database, NewMedicalDocument, StoreError};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn orchestrator(gateway_uri: &str) -> ChatOrchestrator {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let store = HealthStore::new(db);
        let gateway = LlmGateway::new(gateway_uri, Duration::from_secs(5)).unwrap();
        let tools = Arc::new(HealthToolCatalog::new());
        ChatOrchestrator::new(store, gateway, tools, ChatConfig::new("llama3"))
    }

    #[tokio::test]
    async fn create_and_get_session_roundtrip() {
        let orchestrator = orchestrator("http://127.0.0.1:1").await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();
        let (fetched, messages) = orchestrator.get_session_with_messages(&session.id).await.unwrap();
        assert_eq!(fetched.owner, "user-1");
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn send_message_persists_user_and_assistant_turns_and_sets_title() {
        let server = MockServer::start().await;
        let reply = "data: {\"choices\":[{\"delta\":{\"content\":\"you are doing well\"}}]}\n\
                      data: [DONE]\n";
        Mock::given(method("POST")).and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(reply, "text/event-stream"))
            .mount(&server)
            .await;

        let orchestrator = orchestrator(&server.uri()).await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();

        let events: Vec<GatewayEvent> = orchestrator
            .send_message(&session.id, "how am I doing?")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(events.last(), Some(GatewayEvent::Done)));

        let (fetched, messages) = orchestrator.get_session_with_messages(&session.id).await.unwrap();
        assert_eq!(fetched.title.as_deref(), Some("how am I doing?"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content, "you are doing well");
        assert!(messages[1].metadata.is_none());

        assert!(!orchestrator.store.active_streams.is_active(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn send_message_records_tool_calls_in_assistant_metadata() {
        let server = MockServer::start().await;
        let first_turn = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"get_recent_labs\",\"arguments\":\"{}\"}}]}}]}\n\
                           data: [DONE]\n";
        let second_turn = "data: {\"choices\":[{\"delta\":{\"content\":\"you have no recent labs on file\"}}]}\n\
                            data: [DONE]\n";
        Mock::given(method("POST")).and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(first_turn, "text/event-stream"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST")).and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(second_turn, "text/event-stream"))
            .mount(&server)
            .await;

        let orchestrator = orchestrator(&server.uri()).await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();

        let _events: Vec<GatewayEvent> = orchestrator
            .send_message(&session.id, "what labs do I have?")
            .await
            .unwrap()
            .collect()
            .await;

        let (_session, messages) = orchestrator.get_session_with_messages(&session.id).await.unwrap();
        let metadata = messages[1].metadata.as_deref().expect("assistant turn should record the tool call");
        let records: Vec<ToolCallRecord> = serde_json::from_str(metadata).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "get_recent_labs");
        assert!(records[0].result.is_array(), "get_recent_labs returns a bare array of lab results");
    }

    #[tokio::test]
    async fn a_second_send_message_is_rejected_while_a_stream_is_active() {
        let orchestrator = orchestrator("http://127.0.0.1:1").await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();
        orchestrator.store.active_streams.acquire(&session.id).await.unwrap();

        let err = orchestrator.send_message(&session.id, "hi").await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn gateway_error_persists_no_assistant_message() {
        // no inference server listening: connection fails immediately.
        let orchestrator = orchestrator("http://127.0.0.1:1").await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();

        let events: Vec<GatewayEvent> = orchestrator
            .send_message(&session.id, "hello")
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(events.last(), Some(GatewayEvent::Error { .. })));

        let (_session, messages) = orchestrator.get_session_with_messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1, "only the user turn should survive a gateway error");
        assert_eq!(messages[0].role, "user");

        assert!(!orchestrator.store.active_streams.is_active(&session.id).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_a_session_cascades_to_its_messages() {
        let orchestrator = orchestrator("http://127.0.0.1:1").await;
        let session = orchestrator.create_session("user-1", None).await.unwrap();
        orchestrator.store.chat.append_message(&session.id, "user", "hi", None).await.unwrap();

        orchestrator.delete_session(&session.id).await.unwrap();

        assert!(orchestrator.get_session_with_messages(&session.id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn deleting_a_document_does_not_orphan_its_lab_results() {
        let orchestrator = orchestrator("http://127.0.0.1:1").await;
        let doc = orchestrator
            .store
            .documents
            .create(NewMedicalDocument {
                owner: "user-1".into(),
                title: "bloodwork".into(),
                document_type: "lab_report".into(),
                file_path: "/tmp/doesnotmatter".into(),
                file_type: "application/pdf".into(),
                document_date: None,
            })
            .await
            .unwrap();
        orchestrator
            .store
            .labs
            .insert_or_skip(healthmind_store::NewLabResult {
                owner: "user-1".into(),
                document_id: Some(doc.id.clone()),
                test_name: "HbA1c".into(),
                test_code: None,
                value: 5.8,
                unit: "%".into(),
                reference_min: None,
                reference_max: None,
                status: None,
                recorded_at: 0,
            })
            .await
            .unwrap();

        orchestrator.store.documents.delete(&doc.id).await.unwrap();
        let labs = orchestrator.store.labs.list_for_owner("user-1", Default::default()).await.unwrap();
        assert_eq!(labs.len(), 1, "lab rows outlive their document");

        let doc_err = orchestrator.store.documents.get(&doc.id).await.unwrap_err();
        assert!(matches!(doc_err, StoreError::NotFound { .. }));
    }
}
