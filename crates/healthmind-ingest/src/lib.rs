//! Document ingestion pipeline: OCR, lab-value extraction, validation, and
//! persistence, run either inline or via a background worker pool draining
//! the durable job queue.

mod error;
mod extraction;
mod ocr;
mod pipeline;
mod validate;
mod worker;

pub use error::{IngestError, IngestResult};
pub use ocr::{OcrClient, OCR_TIMEOUT};
pub use pipeline::{run_job, EXTRACTION_TIMEOUT, JOB_TIMEOUT};
pub use worker::{IngestionWorkerPool, DEFAULT_WORKER_COUNT};
