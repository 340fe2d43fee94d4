//! Provider-facing interface: the shape every backend (GitHub Models,
//! OpenAI-compatible, Anthropic-compatible) must implement to plug into the
//! gateway's purpose lanes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub seed: Option<u64>,
    pub json_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: serde_json::Value,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub context_window: u32,
}

/// Errors a provider implementation returns. The gateway retries
/// `RateLimit`/`Connection`/`Timeout` with backoff; `Auth` never retries.
#[derive(Debug, Error, Clone)]
pub enum ProviderError {
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("rate limited, retry_after={retry_after_secs:?}")]
    RateLimit { retry_after_secs: Option<f64> },
    #[error("connection error: {0}")]
    Connection(String),
    #[error("request timed out")]
    Timeout,
}

#[async_trait]
pub trait Provider: Send + Sync {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError>;
    async fn health_check(&self) -> bool;
    fn list_models(&self) -> Vec<ModelInfo>;
}
