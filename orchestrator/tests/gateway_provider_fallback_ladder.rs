//! Provider fallback ladder: the gateway walks a purpose lane's preferences
//! in priority order, falling through to the next preference when one
//! provider is unregistered or keeps failing, and succeeding on whichever
//! preference first returns a contract-shaped response.

use async_trait::async_trait;
use orchestrator::gateway::{
    ChatMessage, ChatRequest, ChatResponse, LlmGateway, ModelInfo, ModelPreference, Provider, ProviderError, Purpose, RoutingPolicy,
};

struct AlwaysFails;

#[async_trait]
impl Provider for AlwaysFails {
    async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        // `retry_after_secs: Some(0.0)` keeps the gateway's real backoff
        // sleep at zero instead of the exponential default.
        Err(ProviderError::RateLimit { retry_after_secs: Some(0.0) })
    }
    async fn health_check(&self) -> bool {
        false
    }
    fn list_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}

struct AlwaysAuthFails;

#[async_trait]
impl Provider for AlwaysAuthFails {
    async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Err(ProviderError::Auth("revoked key".to_string()))
    }
    async fn health_check(&self) -> bool {
        false
    }
    fn list_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}

struct Succeeds;

#[async_trait]
impl Provider for Succeeds {
    async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        Ok(ChatResponse {
            content: serde_json::json!({
                "stage": "implement",
                "module": "news/nyt",
                "changed_files": {"adapter.rs": "fn main() {}"},
                "deleted_files": [],
                "assumptions": [],
                "rationale": "fallback succeeded",
                "policy": {},
                "validation_report": null,
            }),
            usage: Default::default(),
        })
    }
    async fn health_check(&self) -> bool {
        true
    }
    fn list_models(&self) -> Vec<ModelInfo> {
        vec![]
    }
}

fn messages() -> Vec<ChatMessage> {
    vec![ChatMessage { role: "user".to_string(), content: "build the nyt adapter".to_string() }]
}

#[tokio::test]
async fn falls_through_auth_failure_and_unregistered_provider_to_the_working_one() {
    let mut policy = RoutingPolicy::new();
    policy.set_lane(
        Purpose::Codegen,
        vec![
            ModelPreference { provider: "revoked".to_string(), model: "m1".to_string(), priority: 0 },
            ModelPreference { provider: "ghost".to_string(), model: "m2".to_string(), priority: 1 },
            ModelPreference { provider: "backup".to_string(), model: "m3".to_string(), priority: 2 },
        ],
    );

    let mut gateway = LlmGateway::new(policy);
    gateway.register_provider("revoked", Box::new(AlwaysAuthFails));
    // "ghost" deliberately left unregistered.
    gateway.register_provider("backup", Box::new(Succeeds));

    let (contract, metadata) = gateway
        .generate(Purpose::Codegen, &messages(), &serde_json::json!({}), &[], None, 0.0, None, 100)
        .await
        .unwrap();

    assert_eq!(contract.module, "news/nyt");
    assert_eq!(metadata.provider, "backup");
    assert_eq!(metadata.attempt, 3);
}

#[tokio::test]
async fn all_preferences_exhausted_raises_all_models_failed() {
    let mut policy = RoutingPolicy::new();
    policy.set_lane(Purpose::Codegen, vec![ModelPreference { provider: "flaky".to_string(), model: "m1".to_string(), priority: 0 }]);

    let mut gateway = LlmGateway::new(policy);
    gateway.register_provider("flaky", Box::new(AlwaysFails));

    let result = gateway.generate(Purpose::Codegen, &messages(), &serde_json::json!({}), &[], None, 0.0, None, 100).await;

    assert!(matches!(result, Err(orchestrator::gateway::GatewayError::AllModelsFailed { purpose: Purpose::Codegen, .. })));
}
