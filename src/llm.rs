//! Text Generation Collaborator
//!
//! Thoughts, waking reflections and dream consolidations are delegated to a
//! text-generation service. The scheduler only cares about control flow:
//! - Every call is bounded by a timeout
//! - Any failure degrades to [`PLACEHOLDER`] instead of crossing the tick
//!
//! [`OllamaGenerator`] talks to a local Ollama instance; [`OfflineGenerator`]
//! is used when no service is configured.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Text substituted when generation is unavailable
pub const PLACEHOLDER: &str = "[LLM unavailable - placeholder thought]";

/// Generation errors
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Decode(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Text generation unavailable")]
    Unavailable,
}

/// A single generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Sampling temperature, clamped to [0, 1]
    pub temperature: f32,
    /// Maximum output length in tokens
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            prompt: prompt.into(),
            temperature: temperature.clamp(0.0, 1.0),
            max_tokens,
        }
    }
}

/// Result of a guarded generation call
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub text: String,
    /// True when the placeholder was substituted
    pub degraded: bool,
}

/// Text-generation capability
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;

    /// Name for logs
    fn name(&self) -> &str {
        "generator"
    }
}

/// Call the generator with a timeout, degrading to [`PLACEHOLDER`] on any failure
pub async fn generate_or_placeholder(
    generator: &dyn TextGenerator,
    request: &GenerationRequest,
    timeout: Duration,
) -> Generated {
    let outcome = match tokio::time::timeout(timeout, generator.generate(request)).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout(timeout)),
    };

    match outcome {
        Ok(text) if !text.trim().is_empty() => Generated {
            text: text.trim().to_string(),
            degraded: false,
        },
        Ok(_) => {
            debug!("{} returned empty text, using placeholder", generator.name());
            Generated {
                text: PLACEHOLDER.to_string(),
                degraded: true,
            }
        }
        Err(e) => {
            warn!("{} failed: {}, using placeholder", generator.name(), e);
            Generated {
                text: PLACEHOLDER.to_string(),
                degraded: true,
            }
        }
    }
}

/// Ollama generator configuration
#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub ollama_url: String,
    pub model: String,
    /// Transport-level timeout (the scheduler applies its own call timeout too)
    pub timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            ollama_url: std::env::var("OLLAMA_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("LLAMA_MODEL").unwrap_or_else(|_| "llama3.2:3b".to_string()),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Ollama generate response
#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

/// Generator backed by Ollama's `/api/generate`
pub struct OllamaGenerator {
    config: OllamaConfig,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: OllamaConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    /// Check if Ollama is reachable
    pub async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.config.ollama_url))
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.config.ollama_url);

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "model": self.config.model,
                "prompt": request.prompt,
                "stream": false,
                "options": {
                    "temperature": request.temperature,
                    "num_predict": request.max_tokens,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let result: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| GenerationError::Decode(e.to_string()))?;

        Ok(result.response.trim().to_string())
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

/// Generator used when no service is configured: always unavailable
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

#[async_trait]
impl TextGenerator for OfflineGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Unavailable)
    }

    fn name(&self) -> &str {
        "offline"
    }
}

/// Extract a `FIELD: value` line from generated text
pub fn extract_field(text: &str, field: &str) -> Option<String> {
    let pattern = format!(r"(?im)^\s*{}:\s*(.+?)\s*$", regex::escape(field));
    let re = regex::Regex::new(&pattern).ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract a comma-separated `FIELD: a, b, c` line
pub fn extract_list_field(text: &str, field: &str) -> Vec<String> {
    extract_field(text, field)
        .map(|v| {
            v.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
