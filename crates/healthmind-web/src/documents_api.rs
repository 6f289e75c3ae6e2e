//! Document surface: multipart upload (which enqueues the ingestion job),
//! listing, detail, and delete.

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use chrono::{NaiveDate, TimeZone, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use healthmind_store::{MedicalDocument, NewMedicalDocument};

use crate::chat_api::OwnerQuery;
use crate::error::ApiError;
use crate::state::AppState;

const VALID_DOCUMENT_TYPES: &[&str] = &["lab_report", "prescription", "imaging", "other"];

/// `POST /documents/upload` (multipart: `file`, `user_id`, `title`,
/// `document_type`, optional `document_date`).
///
/// Stores the file under `upload_dir`, creates the `MedicalDocument` row in
/// `status=uploading`, enqueues the ingestion job, and wakes the worker
/// pool — mirroring the endpoint's synchronous half of §4.4's state
/// machine; everything past `uploading` happens off the request path.
pub async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Result<(StatusCode, Json<MedicalDocument>), ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut file_name = String::from("upload");
    let mut content_type = String::from("application/octet-stream");
    let mut user_id: Option<String> = None;
    let mut title: Option<String> = None;
    let mut document_type: Option<String> = None;
    let mut document_date: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::invalid_argument(e.to_string()))? {
        match field.name().unwrap_or_default() {
            "file" => {
                file_name = field.file_name().unwrap_or("upload").to_string();
                content_type = field.content_type().unwrap_or("application/octet-stream").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::invalid_argument(e.to_string()))?;
                file_bytes = Some(bytes.to_vec());
            }
            "user_id" => user_id = Some(text_field(field).await?),
            "title" => title = Some(text_field(field).await?),
            "document_type" => document_type = Some(text_field(field).await?),
            "document_date" => document_date = Some(text_field(field).await?),
            _ => {}
        }
    }

    let file_bytes = file_bytes.ok_or_else(|| ApiError::invalid_argument("missing `file` field"))?;
    let user_id = user_id.ok_or_else(|| ApiError::invalid_argument("missing `user_id` field"))?;
    let title = title.ok_or_else(|| ApiError::invalid_argument("missing `title` field"))?;
    let document_type = document_type.unwrap_or_else(|| "other".to_string());
    if !VALID_DOCUMENT_TYPES.contains(&document_type.as_str()) {
        return Err(ApiError::invalid_argument(format!("invalid document_type: {document_type}")));
    }
    let document_date = document_date.map(|s| parse_iso_date(&s)).transpose()?;

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("failed to prepare upload directory: {e}"))
    })?;
    let stored_name = format!("{}-{}", Uuid::now_v7(), sanitize_file_name(&file_name));
    let file_path = state.upload_dir.join(&stored_name);
    tokio::fs::write(&file_path, &file_bytes).await.map_err(|e| {
        ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", format!("failed to store uploaded file: {e}"))
    })?;

    let document = state
        .store
        .documents
        .create(NewMedicalDocument {
            owner: user_id,
            title,
            document_type,
            file_path: file_path.to_string_lossy().to_string(),
            file_type: content_type,
            document_date,
        })
        .await?;

    state.store.ingestion_jobs.enqueue(&document.id).await?;
    state.ingestion.notify();
    info!(document_id = %document.id, "document uploaded, ingestion job enqueued");

    Ok((StatusCode::CREATED, Json(document)))
}

async fn text_field(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(|e| ApiError::invalid_argument(e.to_string()))
}

fn sanitize_file_name(name: &str) -> String {
    name.chars().map(|c| if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' { c } else { '_' }).collect()
}

fn parse_iso_date(s: &str) -> Result<i64, ApiError> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::invalid_argument(format!("`document_date` must be an ISO day (YYYY-MM-DD), got {s:?}")))?;
    Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always valid")).timestamp())
}

/// `GET /documents?user_id=...`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<OwnerQuery>,
) -> Result<Json<Vec<MedicalDocument>>, ApiError> {
    Ok(Json(state.store.documents.list_for_owner(&query.user_id).await?))
}

/// `GET /documents/{id}`
pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<MedicalDocument>, ApiError> {
    Ok(Json(state.store.documents.get(&id).await?))
}

/// `DELETE /documents/{id}` — does not delete derived lab rows.
pub async fn delete(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode, ApiError> {
    if let Err(e) = state.store.documents.delete(&id).await {
        warn!(document_id = %id, error = %e, "failed to delete document");
        return Err(e.into());
    }
    Ok(StatusCode::NO_CONTENT)
}
