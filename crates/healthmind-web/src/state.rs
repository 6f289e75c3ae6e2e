//! Shared application state handed to every Axum handler.
//!
//! Grounded on `openintent-web::state::AppState`'s shape (an `Arc`-wrapped
//! bag of handles cloned into each request), generalized from "one LLM
//! client and a `Vec` of adapters" to the health assistant's four
//! components: the store, the gateway, the orchestrator, and the
//! ingestion worker pool.

use std::path::PathBuf;
use std::sync::Arc;

use healthmind_gateway::LlmGateway;
use healthmind_ingest::IngestionWorkerPool;
use healthmind_orchestrator::ChatOrchestrator;
use healthmind_store::HealthStore;
use healthmind_tools::HealthToolCatalog;

/// Process-wide state, built once at startup and cloned (cheaply — every
/// field is an `Arc` or an already-`Clone` repository bundle) into each
/// request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: HealthStore,
    pub gateway: Arc<LlmGateway>,
    pub tools: Arc<HealthToolCatalog>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub ingestion: Arc<IngestionWorkerPool>,
    pub upload_dir: PathBuf,
    pub chat_model: String,
    pub extraction_model: String,
}
