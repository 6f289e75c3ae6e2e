//! Declarative tool description.
//!
//! Grounded on `openintent-adapters::traits::ToolDefinition { name,
//! description, parameters }`, stripped of the `Adapter` trait's connection
//! lifecycle — health tools are pure synchronous-over-async lookups against
//! the store, never a live outbound connection.

use serde::Serialize;
use serde_json::Value;

/// One callable tool, as advertised to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}
