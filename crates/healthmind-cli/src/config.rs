//! Process-wide configuration, loaded once at startup from the environment.
//!
//! Grounded on `openintent-cli::helpers::resolve_llm_config`'s envy-style
//! `std::env::var` reads with hardcoded fallbacks — no config file layer,
//! no secrets manager, just environment variables read once at boot.

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_INFERENCE_HOST: &str = "http://localhost:8000";
const DEFAULT_CHAT_MODEL: &str = "llama3";
const DEFAULT_EXTRACTION_MODEL: &str = "llama3";
const DEFAULT_INFERENCE_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_OCR_SERVICE_URL: &str = "http://localhost:8100";
const DEFAULT_STORE_PATH: &str = "data/healthmind.db";
const DEFAULT_UPLOAD_DIR: &str = "data/uploads";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

/// Everything the assistant's components need to boot, read once in
/// [`Config::from_env`] and handed around as owned values from then on.
#[derive(Debug, Clone)]
pub struct Config {
    pub inference_host: String,
    pub chat_model: String,
    pub extraction_model: String,
    pub inference_timeout: Duration,
    pub ocr_service_url: String,
    pub store_path: PathBuf,
    /// Reserved for a future externally-hosted job queue; the ingestion
    /// pipeline's queue is the `document_ingestion_job` table today, so
    /// this is read (for operators migrating from an external broker) but
    /// not otherwise consulted.
    pub queue_url: Option<String>,
    pub upload_dir: PathBuf,
    pub bind_addr: String,
    pub port: u16,
    pub worker_count: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            inference_host: env_or("INFERENCE_HOST", DEFAULT_INFERENCE_HOST),
            chat_model: env_or("INFERENCE_CHAT_MODEL", DEFAULT_CHAT_MODEL),
            extraction_model: env_or("INFERENCE_EXTRACTION_MODEL", DEFAULT_EXTRACTION_MODEL),
            inference_timeout: Duration::from_secs(
                env_non_empty("INFERENCE_TIMEOUT_SECONDS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_INFERENCE_TIMEOUT_SECONDS),
            ),
            ocr_service_url: env_or("OCR_SERVICE_URL", DEFAULT_OCR_SERVICE_URL),
            store_path: PathBuf::from(env_or("STORE_URL", DEFAULT_STORE_PATH)),
            queue_url: env_non_empty("QUEUE_URL"),
            upload_dir: PathBuf::from(env_or("UPLOAD_DIR", DEFAULT_UPLOAD_DIR)),
            bind_addr: env_or("HEALTHMIND_BIND", DEFAULT_BIND_ADDR),
            port: env_non_empty("HEALTHMIND_PORT").and_then(|v| v.parse().ok()).unwrap_or(DEFAULT_PORT),
            worker_count: env_non_empty("HEALTHMIND_WORKER_COUNT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(healthmind_ingest::DEFAULT_WORKER_COUNT),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_non_empty(key).unwrap_or_else(|| default.to_string())
}
