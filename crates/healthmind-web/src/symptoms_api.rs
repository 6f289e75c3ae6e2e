//! Symptom surface: logging entries and listing them back.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use healthmind_store::{NewSymptomEntry, SymptomEntry, SymptomFilter};

use crate::chat_api::OwnerQuery;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateSymptomBody {
    pub user_id: String,
    pub symptom_type: String,
    pub severity: i64,
    pub notes: Option<String>,
    /// ISO-8601 timestamp; defaults to now.
    pub recorded_at: Option<String>,
    pub duration_minutes: Option<i64>,
    pub triggers: Option<Vec<String>>,
}

/// `POST /symptoms`
pub async fn create(State(state): State<AppState>, Json(body): Json<CreateSymptomBody>) -> Result<(StatusCode, Json<SymptomEntry>), ApiError> {
    let recorded_at = match body.recorded_at {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map_err(|_| ApiError::invalid_argument(format!("`recorded_at` must be RFC3339, got {raw:?}")))?
            .timestamp(),
        None => Utc::now().timestamp(),
    };
    if !(0..=10).contains(&body.severity) {
        return Err(ApiError::invalid_argument(format!("`severity` must be between 0 and 10, got {}", body.severity)));
    }
    let triggers = body.triggers.map(|t| serde_json::to_string(&t)).transpose()?;

    let entry = state
        .store
        .symptoms
        .create(NewSymptomEntry {
            owner: body.user_id,
            symptom_type: body.symptom_type,
            severity: body.severity,
            notes: body.notes,
            recorded_at,
            duration_minutes: body.duration_minutes,
            triggers,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Deserialize)]
pub struct ListSymptomsQuery {
    pub user_id: String,
    pub days: Option<i64>,
    pub symptom_type: Option<String>,
}

/// `GET /symptoms?user_id=...&days=...&symptom_type=...`
pub async fn list(State(state): State<AppState>, Query(query): Query<ListSymptomsQuery>) -> Result<Json<Vec<SymptomEntry>>, ApiError> {
    let days = query.days.unwrap_or(30).max(0);
    let since = (days > 0).then(|| Utc::now().timestamp() - days * 86_400);
    let filter = SymptomFilter { symptom_type: query.symptom_type, since, until: None };
    Ok(Json(state.store.symptoms.list_for_owner(&query.user_id, filter).await?))
}

/// `GET /symptoms/types?user_id=...`
pub async fn types(State(state): State<AppState>, Query(query): Query<OwnerQuery>) -> Result<Json<Vec<String>>, ApiError> {
    Ok(Json(state.store.symptoms.distinct_types(&query.user_id).await?))
}
