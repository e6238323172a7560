//! Optional natural-language rendering of the deterministic report.
//!
//! A synthesizer may return an alternate markdown document. The structured
//! response is never touched, and any failure (an empty answer included)
//! leaves the deterministic markdown in place.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::{SynthesisConfig, SynthesisMode};

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("Synthesis request failed: {0}")]
    Http(String),

    #[error("Synthesis backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected synthesis response: {0}")]
    Decode(String),

    #[error("Synthesis backend returned an empty answer")]
    EmptyResponse,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, markdown: &str, prompt: &str) -> Result<String, SynthesisError>;
}

/// Returns the markdown unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicSynthesizer;

#[async_trait]
impl Synthesizer for DeterministicSynthesizer {
    fn name(&self) -> &str {
        "deterministic"
    }

    async fn synthesize(&self, markdown: &str, _prompt: &str) -> Result<String, SynthesisError> {
        Ok(markdown.to_string())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Local Ollama `/api/generate`, non-streaming.
pub struct OllamaSynthesizer {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaSynthesizer {
    pub fn new(config: &SynthesisConfig) -> Result<Self, SynthesisError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| SynthesisError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            model: config.ollama_model.clone(),
        })
    }
}

#[async_trait]
impl Synthesizer for OllamaSynthesizer {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn synthesize(&self, _markdown: &str, prompt: &str) -> Result<String, SynthesisError> {
        let url = format!("{}/api/generate", self.base_url);
        debug!(%url, model = %self.model, "requesting synthesis");
        let response = self
            .client
            .post(&url)
            .json(&GenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
            })
            .send()
            .await
            .map_err(|e| SynthesisError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| SynthesisError::Decode(e.to_string()))?;
        let answer = body.response.unwrap_or_default().trim().to_string();
        if answer.is_empty() {
            return Err(SynthesisError::EmptyResponse);
        }
        Ok(answer)
    }
}

/// `openai` is accepted but renders deterministically.
pub fn synthesizer_from_config(config: &SynthesisConfig) -> Result<Arc<dyn Synthesizer>, SynthesisError> {
    Ok(match config.mode {
        SynthesisMode::None | SynthesisMode::OpenAi => Arc::new(DeterministicSynthesizer),
        SynthesisMode::Ollama => Arc::new(OllamaSynthesizer::new(config)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama(server: &MockServer) -> OllamaSynthesizer {
        OllamaSynthesizer::new(&SynthesisConfig {
            mode: SynthesisMode::Ollama,
            ollama_url: format!("{}/", server.uri()),
            ollama_model: "llama3.1".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_deterministic_is_identity() {
        let out = DeterministicSynthesizer.synthesize("# Report\n", "ignored").await.unwrap();
        assert_eq!(out, "# Report\n");
    }

    #[tokio::test]
    async fn test_ollama_generate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_json(json!({"model": "llama3.1", "prompt": "summarize", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "  Short summary.\n"})))
            .mount(&server)
            .await;

        let out = ollama(&server).synthesize("# md", "summarize").await.unwrap();
        assert_eq!(out, "Short summary.");
    }

    #[tokio::test]
    async fn test_ollama_empty_answer_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "   "})))
            .mount(&server)
            .await;

        let err = ollama(&server).synthesize("# md", "p").await.unwrap_err();
        assert!(matches!(err, SynthesisError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_ollama_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = ollama(&server).synthesize("# md", "p").await.unwrap_err();
        assert!(matches!(err, SynthesisError::Status { status: 500, .. }));
    }

    #[test]
    fn test_mode_selection() {
        let mut config = SynthesisConfig::default();
        assert_eq!(synthesizer_from_config(&config).unwrap().name(), "deterministic");
        config.mode = SynthesisMode::OpenAi;
        assert_eq!(synthesizer_from_config(&config).unwrap().name(), "deterministic");
        config.mode = SynthesisMode::Ollama;
        assert_eq!(synthesizer_from_config(&config).unwrap().name(), "ollama");
    }
}
