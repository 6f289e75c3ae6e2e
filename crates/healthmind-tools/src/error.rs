//! Internal tool-dispatch error.
//!
//! Never crosses `HealthToolCatalog::dispatch`'s boundary — it is always
//! collapsed into the `{"error": ...}` JSON shapes the catalog's contract
//! promises, since a failing tool must feed the model a result, not abort
//! the conversation.

use healthmind_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
