//! REST/SSE transport surface: exposes chat, document, lab, symptom, and AI
//! status endpoints over the components assembled by `healthmind-cli`.

mod ai_api;
mod chat_api;
mod documents_api;
mod error;
mod labs_api;
mod server;
mod state;
mod symptoms_api;

pub use error::ApiError;
pub use server::WebServer;
pub use state::AppState;
