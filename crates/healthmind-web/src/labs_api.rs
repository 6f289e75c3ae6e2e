//! Lab result surface: raw listing, per-test trend, and distinct test names.
//!
//! The trend endpoint deliberately delegates to the tool catalog instead of
//! re-deriving the trend shape — §6 requires it to match `get_lab_trend`'s
//! response exactly, and the catalog is the one place that shape is defined.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};

use healthmind_store::{LabFilter, LabResult};

use crate::chat_api::OwnerQuery;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListLabsQuery {
    pub user_id: String,
    pub days: Option<i64>,
    pub test_name: Option<String>,
}

/// `GET /labs?user_id=...&days=...&test_name=...`
pub async fn list(State(state): State<AppState>, Query(query): Query<ListLabsQuery>) -> Result<Json<Vec<LabResult>>, ApiError> {
    let days = query.days.unwrap_or(90).max(0);
    let since = (days > 0).then(|| chrono::Utc::now().timestamp() - days * 86_400);
    let filter = LabFilter { test_name: query.test_name, since, until: None, limit: Some(100) };
    Ok(Json(state.store.labs.list_for_owner(&query.user_id, filter).await?))
}

#[derive(Deserialize)]
pub struct TrendQuery {
    pub user_id: String,
    pub months: Option<i64>,
}

/// `GET /labs/trends/{test_name}?user_id=...&months=...`
pub async fn trend(
    State(state): State<AppState>,
    Path(test_name): Path<String>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<Value>, ApiError> {
    let args = json!({ "test_name": test_name, "months": query.months });
    let result = state.tools.dispatch("get_lab_trend", args, &query.user_id, &state.store).await;
    Ok(Json(result))
}

/// `GET /labs/test-names?user_id=...`
pub async fn test_names(State(state): State<AppState>, Query(query): Query<OwnerQuery>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.labs.distinct_test_names(&query.user_id).await?))
}
