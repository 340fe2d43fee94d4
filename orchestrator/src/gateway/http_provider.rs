//! Generic OpenAI-compatible HTTP provider. Grounded on
//! `shared/providers/openai_provider.py`/`online_provider.py`: a single
//! bearer-token POST to `{base_url}/chat/completions`, response content
//! parsed as the model's JSON-mode payload.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::provider::{ChatRequest, ChatResponse, ModelInfo, Provider, ProviderError, Usage};

#[derive(Debug, Clone)]
pub struct HttpProvider {
    name: String,
    base_url: String,
    api_key: String,
    models: Vec<ModelInfo>,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>, api_key: impl Into<String>, models: Vec<ModelInfo>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            models,
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [super::provider::ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageBody,
}

#[derive(Deserialize)]
struct MessageBody {
    content: String,
}

#[derive(Deserialize)]
struct UsageBody {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl Provider for HttpProvider {
    async fn generate(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let response_format = request.json_schema.as_ref().map(|schema| {
            serde_json::json!({"type": "json_schema", "json_schema": schema})
        });

        let body = CompletionRequest {
            model: &request.model,
            messages: request.messages.as_slice(),
            temperature: request.temperature,
            seed: request.seed,
            response_format,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout
                } else {
                    ProviderError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::Auth(format!("http {status}")));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<f64>().ok());
            return Err(ProviderError::RateLimit { retry_after_secs });
        }
        if status.is_server_error() {
            return Err(ProviderError::Connection(format!("http {status}")));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Connection(format!("malformed response body: {e}")))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::Connection("empty choices array".to_string()))?;

        let value: serde_json::Value = serde_json::from_str(&content).unwrap_or(serde_json::Value::String(content));

        let usage = completion
            .usage
            .map(|u| Usage { prompt_tokens: u.prompt_tokens, completion_tokens: u.completion_tokens })
            .unwrap_or_default();

        Ok(ChatResponse { content: value, usage })
    }

    async fn health_check(&self) -> bool {
        self.client.get(format!("{}/models", self.base_url)).bearer_auth(&self.api_key).send().await.is_ok_and(|r| r.status().is_success())
    }

    fn list_models(&self) -> Vec<ModelInfo> {
        self.models.clone()
    }
}

impl HttpProvider {
    pub fn name(&self) -> &str {
        &self.name
    }
}
