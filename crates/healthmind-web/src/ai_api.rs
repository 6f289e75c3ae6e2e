//! AI status surface.

use axum::Json;
use axum::extract::State;

use healthmind_gateway::HealthStatus;

use crate::state::AppState;

/// `GET /ai/status` — never errors; an unreachable inference server is
/// reported as `reachable: false`, not a transport error.
pub async fn status(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.gateway.health_check(&state.chat_model, &state.extraction_model).await)
}
