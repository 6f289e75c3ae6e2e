//! HTTP server setup: route table and startup.
//!
//! Grounded on `openintent-web::server::WebServer` — same `Router`/`CorsLayer`/
//! `TcpListener::bind` + `axum::serve` shape, generalized from one chat
//! surface to the four surfaces (chat, documents, labs/symptoms, AI status)
//! this assistant exposes.

use axum::Router;
use axum::http::Method;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;
use crate::{ai_api, chat_api, documents_api, labs_api, symptoms_api};

/// The Healthmind web server: owns the bound listener configuration and the
/// shared state handed to every route.
pub struct WebServer {
    bind_addr: String,
    state: AppState,
}

impl WebServer {
    pub fn new(bind_addr: impl Into<String>, state: AppState) -> Self {
        Self { bind_addr: bind_addr.into(), state }
    }

    /// Build the Axum router without binding a listener — used by `start`
    /// and by integration tests driving the router directly.
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods([Method::GET, Method::POST, Method::DELETE]).allow_headers(Any);

        Router::new()
            .route("/chat/sessions", post(chat_api::create_session).get(chat_api::list_sessions))
            .route("/chat/sessions/{id}", get(chat_api::get_session).delete(chat_api::delete_session))
            .route("/chat/sessions/{id}/messages", post(chat_api::send_message))
            .route("/documents/upload", post(documents_api::upload))
            .route("/documents", get(documents_api::list))
            .route("/documents/{id}", get(documents_api::get).delete(documents_api::delete))
            .route("/labs", get(labs_api::list))
            .route("/labs/trends/{test_name}", get(labs_api::trend))
            .route("/labs/test-names", get(labs_api::test_names))
            .route("/symptoms", post(symptoms_api::create).get(symptoms_api::list))
            .route("/symptoms/types", get(symptoms_api::types))
            .route("/ai/status", get(ai_api::status))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the server and block until it is shut down.
    pub async fn start(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let router = self.router();
        tracing::info!(addr = %self.bind_addr, "starting web server");
        let listener = tokio::net::TcpListener::bind(&self.bind_addr).await?;
        axum::serve(listener, router).await?;
        Ok(())
    }
}
