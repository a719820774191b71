//! Upstream LLM HTTP backend (§4.3 ADDED)
//!
//! Modeled on this codebase's Messages-API client: bearer/`x-api-key`
//! header auth, JSON body with `max_tokens`/`temperature`, a `reqwest`
//! POST with a per-call timeout, and typed response parsing.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;

#[derive(Debug, Clone)]
pub struct AnalyzerBackendConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl Default for AnalyzerBackendConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("VTS_LLM_API_KEY").unwrap_or_default(),
            model: std::env::var("VTS_LLM_MODEL").unwrap_or_else(|_| "default".to_string()),
            endpoint: std::env::var("VTS_LLM_ENDPOINT").unwrap_or_else(|_| "https://api.anthropic.com".to_string()),
            max_tokens: 512,
            temperature: 0.3,
            timeout: Duration::from_secs(10),
        }
    }
}

/// The upstream LLM interface, realized by an HTTP client backend.
#[async_trait]
pub trait AnalyzerBackend: Send + Sync {
    /// Send a system+user prompt and return the raw completion text.
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalyzerError>;
}

pub struct ClaudeAnalyzerBackend {
    config: AnalyzerBackendConfig,
    client: Client,
}

impl ClaudeAnalyzerBackend {
    pub fn new(config: AnalyzerBackendConfig) -> Result<Self, AnalyzerError> {
        if config.api_key.is_empty() {
            return Err(AnalyzerError::Configuration(
                "LLM API key not set; set VTS_LLM_API_KEY or pass one explicitly".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalyzerError::Network(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl AnalyzerBackend for ClaudeAnalyzerBackend {
    async fn complete(&self, system: &str, user: &str) -> Result<String, AnalyzerError> {
        let request = CompletionRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: system.to_string(),
            messages: vec![CompletionMessage {
                role: "user".to_string(),
                content: user.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.endpoint))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Api(format!("HTTP {status}: {error_text}")));
        }

        let parsed: CompletionResponse = response.json().await.map_err(|e| AnalyzerError::InvalidResponse(e.to_string()))?;

        Ok(parsed
            .content
            .into_iter()
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    system: String,
    messages: Vec<CompletionMessage>,
}

#[derive(Debug, Serialize)]
struct CompletionMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: Vec<CompletionContentBlock>,
}

#[derive(Debug, Deserialize)]
struct CompletionContentBlock {
    text: Option<String>,
}
