//! Tunables for the chat orchestrator: which model backs chat turns, the
//! tool-loop iteration cap, and the system prompt installed in every
//! conversation.

/// Configuration for [`crate::session::ChatOrchestrator`].
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub chat_model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Bounds how many send/execute-tools round trips a single message can
    /// take before the gateway gives up with `tool_loop_exhausted`.
    pub max_tool_iterations: u32,
    pub system_prompt: String,
}

impl ChatConfig {
    pub fn new(chat_model: impl Into<String>) -> Self {
        Self {
            chat_model: chat_model.into(),
            temperature: None,
            max_tokens: None,
            max_tool_iterations: 8,
            system_prompt: default_system_prompt(),
        }
    }
}

/// The assistant's persona and guardrails, installed as the first message
/// of every conversation. Wording is not load-bearing; the constraints are:
/// prefer tools over speculation, no diagnoses, cite what backs a claim.
pub fn default_system_prompt() -> String {
    "You are a personal health data assistant. You have access to tools \
     that read the user's own lab results, symptom logs, and wearable data \
     — prefer calling a tool over guessing whenever a claim depends on \
     their data. Never provide a medical diagnosis or prescribe treatment; \
     suggest the user discuss findings with a clinician instead. When you \
     state a fact drawn from a tool result, make clear which result it \
     came from."
        .to_string()
}
