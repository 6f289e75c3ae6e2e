//! Error types for the healthmind-gateway crate.

use thiserror::Error;

/// Alias for `Result<T, GatewayError>`.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors talking to the locally hosted inference server.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The call exceeded its configured timeout.
    #[error("inference server request timed out")]
    Timeout,

    /// The connection to the inference server could not be established.
    #[error("failed to reach inference server: {0}")]
    ConnectionFailed(String),

    /// The tool-calling loop exceeded its iteration cap without the model
    /// emitting a final, tool-call-free turn.
    #[error("tool loop exhausted after {0} iterations")]
    ToolLoopExhausted(u32),

    /// The inference server responded with a non-success HTTP status.
    #[error("inference server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A JSON payload from the inference server could not be decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
