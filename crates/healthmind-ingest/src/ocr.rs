//! HTTP client for the external document-parsing sidecar (Stage 1: OCR).
//!
//! Grounded on `openintent-adapters/src/http_request.rs`'s adapter shape
//! (bare `reqwest::Client`, `.timeout(...)`, `e.is_timeout()` branch to a
//! typed error) narrowed to a single multipart conversion call, plus
//! `openintent-agent/src/executor.rs`'s one-retry-then-fail pattern, bounded
//! here to exactly one retry and only on a connection failure.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument, warn};

use crate::error::{IngestError, IngestResult};

/// Per-call timeout for the OCR sidecar (Stage 1, per the pipeline's
/// resource model).
pub const OCR_TIMEOUT: Duration = Duration::from_secs(120);

/// Adapter to the external document-parsing service. Converts raw file
/// bytes into markdown or plain text.
#[derive(Clone)]
pub struct OcrClient {
    http: reqwest::Client,
    base_url: String,
}

impl OcrClient {
    pub fn new(base_url: impl Into<String>) -> IngestResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent("healthmind/0.1")
            .build()
            .map_err(|e| IngestError::OcrUnreachable(e.to_string()))?;
        Ok(Self { http, base_url: base_url.into() })
    }

    /// Convert a document's bytes into text. Retries exactly once on a
    /// connection failure; a non-success HTTP status is never retried.
    #[instrument(skip(self, bytes))]
    pub async fn convert(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> IngestResult<String> {
        match self.try_convert(bytes.clone(), file_name, content_type).await {
            Ok(text) => Ok(text),
            Err(IngestError::OcrUnreachable(reason)) => {
                warn!(reason = %reason, "OCR request failed, retrying once");
                self.try_convert(bytes, file_name, content_type).await
            }
            Err(other) => Err(other),
        }
    }

    async fn try_convert(&self, bytes: Vec<u8>, file_name: &str, content_type: &str) -> IngestResult<String> {
        let url = format!("{}/convert", self.base_url.trim_end_matches('/'));
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(content_type)
            .unwrap_or_else(|_| Part::bytes(Vec::new()));
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&url)
            .timeout(OCR_TIMEOUT)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::OcrUnreachable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(IngestError::OcrHttpStatus { status });
        }

        let text = response
            .text()
            .await
            .map_err(|e| IngestError::OcrUnreachable(e.to_string()))?;
        debug!(chars = text.len(), "OCR conversion completed");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn convert_returns_response_body_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .respond_with(ResponseTemplate::new(200).set_body_string("# Lab Report\nHbA1c: 5.8%"))
            .mount(&server)
            .await;

        let client = OcrClient::new(server.uri()).unwrap();
        let text = client.convert(b"fake pdf bytes".to_vec(), "report.pdf", "application/pdf").await.unwrap();
        assert!(text.contains("HbA1c"));
    }

    #[tokio::test]
    async fn convert_surfaces_4xx_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/convert"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let client = OcrClient::new(server.uri()).unwrap();
        let err = client.convert(b"bytes".to_vec(), "x.pdf", "application/pdf").await.unwrap_err();
        assert!(matches!(err, IngestError::OcrHttpStatus { status: 400 }));
    }

    #[tokio::test]
    async fn convert_retries_once_on_connection_failure() {
        // No server bound at all: every attempt is a connection failure.
        let client = OcrClient::new("http://127.0.0.1:1").unwrap();
        let err = client.convert(b"bytes".to_vec(), "x.pdf", "application/pdf").await.unwrap_err();
        assert!(matches!(err, IngestError::OcrUnreachable(_)));
    }
}
