//! Error types for the healthmind-orchestrator crate.

use healthmind_store::StoreError;
use thiserror::Error;

/// Alias for `Result<T, OrchestratorError>`.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors raised by session CRUD and the message-send entry point.
///
/// `send_message` returns this eagerly, before the SSE stream is built, so
/// a transport layer can turn a conflict into an HTTP 409 and a not-found
/// into a 404 without inspecting stream contents.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// True when a second stream is already active for the session, or any
    /// other store-level uniqueness conflict surfaced through us.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::Conflict(_)))
    }

    /// True when the underlying entity (session, etc.) does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound { .. }))
    }
}
