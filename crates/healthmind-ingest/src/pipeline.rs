//! Drives one document through all four ingestion stages.
//!
//! Idempotent on redelivery: a document not sitting in `uploading` or
//! `parsing` is assumed already handled by a prior delivery of the same job
//! and the run exits without touching it, satisfying the at-least-once
//! queue semantics the worker pool relies on.

use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument, warn};

use healthmind_gateway::LlmGateway;
use healthmind_store::{DocumentStatus, HealthStore};

use crate::error::{IngestError, IngestResult};
use crate::extraction::extract_labs;
use crate::ocr::OcrClient;
use crate::validate::validate_records;

/// Per-stage timeout for extraction (Stage 2), per the resource model.
pub const EXTRACTION_TIMEOUT: Duration = Duration::from_secs(180);

/// Hard ceiling for the whole job, after which it is abandoned as failed.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(600);

/// Run the full pipeline for `document_id`, transitioning its status as it
/// goes and writing diagnostics on failure.
#[instrument(skip(store, gateway, ocr))]
pub async fn run_job(
    store: &HealthStore,
    gateway: &LlmGateway,
    ocr: &OcrClient,
    extraction_model: &str,
    document_id: &str,
) -> IngestResult<()> {
    match tokio::time::timeout(JOB_TIMEOUT, run_job_inner(store, gateway, ocr, extraction_model, document_id)).await {
        Ok(result) => result,
        Err(_) => {
            let err = IngestError::Timeout { stage: "job" };
            fail_document(store, document_id, &err).await;
            Err(err)
        }
    }
}

async fn run_job_inner(
    store: &HealthStore,
    gateway: &LlmGateway,
    ocr: &OcrClient,
    extraction_model: &str,
    document_id: &str,
) -> IngestResult<()> {
    let document = store.documents.get(document_id).await?;
    if !matches!(document.status, DocumentStatus::Uploading | DocumentStatus::Parsing) {
        info!(document_id, status = ?document.status, "document already past ingestion, skipping");
        return Ok(());
    }

    let bytes = match tokio::fs::read(&document.file_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = IngestError::OcrUnreachable(format!("failed to read stored file: {e}"));
            fail_document(store, document_id, &err).await;
            return Err(err);
        }
    };

    store.documents.transition(document_id, DocumentStatus::Parsing).await?;

    let raw_text = match ocr.convert(bytes, &document.title, &document.file_type).await {
        Ok(text) => text,
        Err(e) => {
            fail_document(store, document_id, &e).await;
            return Err(e);
        }
    };
    store.documents.mark_parsed(document_id, &raw_text).await?;

    store.documents.transition(document_id, DocumentStatus::Extracting).await?;

    let extracted = match tokio::time::timeout(EXTRACTION_TIMEOUT, extract_labs(gateway, extraction_model, &raw_text)).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            fail_document(store, document_id, &e).await;
            return Err(e);
        }
        Err(_) => {
            let err = IngestError::Timeout { stage: "extracting" };
            fail_document(store, document_id, &err).await;
            return Err(err);
        }
    };

    let outcome = validate_records(extracted);
    let mut inserted = 0usize;
    let mut skipped = 0usize;
    for record in outcome.records {
        let result = store
            .labs
            .insert_or_skip(healthmind_store::NewLabResult {
                owner: document.owner.clone(),
                document_id: Some(document_id.to_string()),
                test_name: record.test_name,
                test_code: record.test_code,
                value: record.value,
                unit: record.unit,
                reference_min: record.reference_min,
                reference_max: record.reference_max,
                status: record.status,
                recorded_at: record.recorded_at,
            })
            .await?;
        if result.is_some() {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    if outcome.dropped > 0 {
        warn!(document_id, dropped = outcome.dropped, "validation dropped malformed extracted records");
    }

    let parsed_data = json!({
        "labs_inserted": inserted,
        "labs_skipped": skipped,
        "dropped": outcome.dropped,
    })
    .to_string();
    store.documents.mark_completed(document_id, &parsed_data).await?;

    info!(document_id, inserted, skipped, dropped = outcome.dropped, "ingestion completed");
    Ok(())
}

async fn fail_document(store: &HealthStore, document_id: &str, err: &IngestError) {
    if let Err(e) = store.documents.mark_failed(document_id, err.stage(), &err.to_string()).await {
        warn!(document_id, error = %e, "failed to record ingestion failure diagnostics");
    }
}
