//! Stage 2: LLM-driven extraction of structured lab records from raw OCR text.
//!
//! Uses the gateway's non-streaming `chat` (the extractor needs the whole
//! reply before it can parse it as JSON, unlike the chat orchestrator's
//! streaming path). A single retry with a reinforcement message is attempted
//! on parse failure, per the pipeline's Stage 2 contract.

use serde::Deserialize;
use serde_json::Value;
use tracing::{instrument, warn};

use healthmind_gateway::{ChatOptions, LlmGateway, Message};

use crate::error::{IngestError, IngestResult};

const SYSTEM_PROMPT: &str = r#"You extract structured lab test results from medical document text.
Respond with ONLY a JSON array of objects, no prose, no markdown code fences. Each object has the
fields: test_name (string), test_code (string or null, LOINC-like code if known), value (number),
unit (string), reference_min (number or null), reference_max (number or null), status (string or
null, one of normal/high/low/critical), recorded_at (ISO 8601 date string). If no lab values are
present in the text, respond with an empty array []."#;

const REINFORCEMENT_PROMPT: &str =
    "Your previous reply was not valid JSON. Respond again with ONLY a JSON array, \
     no markdown fences and no explanatory text.";

/// One lab record as extracted by the model, before validation. Fields are
/// left loosely typed (`Option`/`Value`) since the model's output is
/// untrusted until Stage 3 validates it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLabRecord {
    pub test_name: Option<String>,
    pub test_code: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub status: Option<String>,
    pub recorded_at: Option<String>,
}

/// Run Stage 2 against `raw_text`, returning the (unvalidated) extracted
/// records.
#[instrument(skip(gateway, raw_text))]
pub async fn extract_labs(gateway: &LlmGateway, model: &str, raw_text: &str) -> IngestResult<Vec<RawLabRecord>> {
    let system = Message::system(SYSTEM_PROMPT);
    let user = Message::user(raw_text);
    let options = ChatOptions::new(model);

    let reply = gateway.chat(&[system.clone(), user.clone()], &options).await?;
    if let Ok(records) = parse_reply(&reply) {
        return Ok(records);
    }

    warn!("extraction reply failed to parse as JSON, retrying with reinforcement");
    let retry_messages =
        [system, user, Message::assistant(reply), Message::user(REINFORCEMENT_PROMPT)];
    let reply = gateway.chat(&retry_messages, &options).await?;
    parse_reply(&reply).map_err(|_| IngestError::ExtractionParseFailed)
}

/// Parse a model reply as a JSON array of records, tolerating a surrounding
/// markdown code fence or a `{"labs": [...]}` wrapper object.
fn parse_reply(reply: &str) -> Result<Vec<RawLabRecord>, serde_json::Error> {
    let trimmed = strip_code_fence(reply.trim());
    if let Ok(records) = serde_json::from_str::<Vec<RawLabRecord>>(trimmed) {
        return Ok(records);
    }

    #[derive(Deserialize)]
    struct Wrapped {
        labs: Vec<RawLabRecord>,
    }
    let wrapped: Wrapped = serde_json::from_str(trimmed)?;
    Ok(wrapped.labs)
}

fn strip_code_fence(text: &str) -> &str {
    let text = text.strip_prefix("```json").or_else(|| text.strip_prefix("```")).unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}
