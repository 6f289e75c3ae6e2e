//! Error types for the healthmind-ingest crate.

use thiserror::Error;

/// Alias for `Result<T, IngestError>`.
pub type IngestResult<T> = Result<T, IngestError>;

/// Errors raised by the document ingestion pipeline's stages.
///
/// Every variant here is terminal for the job it occurs in: the pipeline
/// catches it at the `run_job` boundary and writes `{error, stage}`
/// diagnostics to `MedicalDocument.parsed_data` via `DocumentStore::mark_failed`.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The OCR sidecar could not be reached (connection refused, DNS
    /// failure, etc.), even after the stage's one retry.
    #[error("OCR service unreachable: {0}")]
    OcrUnreachable(String),

    /// The OCR sidecar responded with a non-success HTTP status. Never
    /// retried -- a 4xx means the input was rejected, not that the service
    /// is flaky.
    #[error("OCR service returned HTTP {status}")]
    OcrHttpStatus { status: u16 },

    /// The extraction model's reply could not be parsed as JSON after the
    /// stage's one reinforcement retry.
    #[error("extraction reply was not valid JSON after retry")]
    ExtractionParseFailed,

    /// The extraction reply parsed as JSON but was not shaped as the
    /// expected lab-record list.
    #[error("extraction reply was not a lab record list: {0}")]
    ValidationFailed(String),

    /// A stage exceeded its configured timeout.
    #[error("stage `{stage}` timed out")]
    Timeout { stage: &'static str },

    #[error(transparent)]
    Store(#[from] healthmind_store::StoreError),

    #[error(transparent)]
    Gateway(#[from] healthmind_gateway::GatewayError),
}

impl IngestError {
    /// The pipeline stage this error occurred in, for diagnostics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::OcrUnreachable(_) | Self::OcrHttpStatus { .. } => "parsing",
            Self::ExtractionParseFailed | Self::ValidationFailed(_) | Self::Gateway(_) => "extracting",
            Self::Timeout { stage } => stage,
            Self::Store(_) => "persistence",
        }
    }
}
