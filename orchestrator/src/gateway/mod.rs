//! Provider gateway: purpose-lane routing, deterministic fallback, bounded
//! retry with jitter, schema-validated JSON responses, per-job budgets.
//!
//! Grounded on `shared/providers/llm_gateway.py`; the per-model backoff/
//! circuit-breaker bookkeeping follows the style of `router/circuit_breaker.rs`.

mod backoff;
mod budget;
mod contract;
mod http_provider;
mod provider;

pub use backoff::compute_backoff;
pub use budget::{JobBudget, UsageAccumulator};
pub use contract::{GeneratorResponseContract, SchemaValidationError};
pub use http_provider::HttpProvider;
pub use provider::{ChatMessage, ChatRequest, ChatResponse, ModelInfo, Provider, ProviderError};

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("requested token budget exceeds per-request or per-job headroom")]
    BudgetExceeded,

    #[error("all model preferences exhausted for purpose {purpose:?}: {errors:?}")]
    AllModelsFailed {
        purpose: Purpose,
        errors: Vec<String>,
    },

    #[error("all model preferences exhausted for tier {tier:?}: {errors:?}")]
    AllModelsFailedForTier {
        tier: crate::config::Tier,
        errors: Vec<String>,
    },
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    Codegen,
    Repair,
    Critic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPreference {
    pub provider: String,
    pub model: String,
    pub priority: u32,
}

/// Ordered model preference lists, one per purpose lane.
#[derive(Debug, Clone, Default)]
pub struct RoutingPolicy {
    lanes: HashMap<Purpose, Vec<ModelPreference>>,
    /// Separate from the purpose lanes above: the delegation manager routes
    /// by inference tier (ultra/heavy/standard/...), not by codegen/repair/
    /// critic purpose, so it gets its own preference table.
    tier_lanes: HashMap<crate::config::Tier, Vec<ModelPreference>>,
}

impl RoutingPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_lane(&mut self, purpose: Purpose, mut preferences: Vec<ModelPreference>) {
        preferences.sort_by_key(|p| p.priority);
        self.lanes.insert(purpose, preferences);
    }

    pub fn lane(&self, purpose: Purpose) -> &[ModelPreference] {
        self.lanes.get(&purpose).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_tier_lane(&mut self, tier: crate::config::Tier, mut preferences: Vec<ModelPreference>) {
        preferences.sort_by_key(|p| p.priority);
        self.tier_lanes.insert(tier, preferences);
    }

    pub fn tier_lane(&self, tier: crate::config::Tier) -> &[ModelPreference] {
        self.tier_lanes.get(&tier).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Build a `RoutingPolicy` from the persisted routing config and the set of
/// providers registered at startup. Each purpose/tier lane is seeded from a
/// `RoutingConfig` category of the same name (`"codegen"`, `"ultra"`, ...)
/// when the admin has configured one with both a provider and a model;
/// lanes with no such category fall back to every registered provider, in
/// config order, so the gateway always has somewhere to route at startup.
pub fn build_routing_policy(config: &crate::config::RoutingConfig, providers: &[crate::config::ProviderConfig]) -> RoutingPolicy {
    let mut policy = RoutingPolicy::new();

    for (purpose, name) in [(Purpose::Codegen, "codegen"), (Purpose::Repair, "repair"), (Purpose::Critic, "critic")] {
        policy.set_lane(purpose, lane_for(config, providers, name));
    }

    for (tier, name) in [
        (crate::config::Tier::Ultra, "ultra"),
        (crate::config::Tier::Heavy, "heavy"),
        (crate::config::Tier::Standard, "standard"),
        (crate::config::Tier::Light, "light"),
        (crate::config::Tier::Micro, "micro"),
        (crate::config::Tier::External, "external"),
    ] {
        policy.set_tier_lane(tier, lane_for(config, providers, name));
    }

    policy
}

fn lane_for(config: &crate::config::RoutingConfig, providers: &[crate::config::ProviderConfig], category_name: &str) -> Vec<ModelPreference> {
    if let Some(category) = config.categories.get(category_name) {
        if let (Some(provider), Some(model)) = (&category.provider, &category.model) {
            return vec![ModelPreference { provider: provider.clone(), model: model.clone(), priority: 0 }];
        }
    }
    providers
        .iter()
        .enumerate()
        .map(|(index, provider)| ModelPreference { provider: provider.name.clone(), model: "default".to_string(), priority: index as u32 })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateMetadata {
    pub provider: String,
    pub model: String,
    pub usage: provider::Usage,
    /// 1-based index of the preference that succeeded.
    pub attempt: usize,
}

const DEFAULT_BASE_DELAY_SECS: f64 = 1.0;
const DEFAULT_CAP_SECS: f64 = 30.0;
const DEFAULT_MAX_RETRIES: u32 = 5;

/// Consecutive failures before a provider is auto-marked unhealthy.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;
/// How long an auto-marked-unhealthy provider is excluded from selection.
const DEFAULT_UNHEALTHY_DURATION_SECS: i64 = 60;
/// Smoothing factor for the latency exponential moving average.
const LATENCY_EMA_ALPHA: f64 = 0.2;

/// Tracks a single provider's health: consecutive-failure circuit breaker,
/// request counters, and an EMA of latency. Grounded on
/// `provider_router.py`'s `ProviderHealth`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub is_healthy: bool,
    pub unhealthy_until: Option<chrono::DateTime<chrono::Utc>>,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub ema_latency_ms: f64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            is_healthy: true,
            unhealthy_until: None,
            consecutive_failures: 0,
            total_requests: 0,
            successful_requests: 0,
            ema_latency_ms: 0.0,
        }
    }
}

impl ProviderHealth {
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            100.0
        } else {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        }
    }

    /// Current availability, clearing an expired unhealthy window in place.
    fn is_available(&mut self) -> bool {
        if !self.is_healthy {
            if let Some(until) = self.unhealthy_until {
                if chrono::Utc::now() >= until {
                    self.is_healthy = true;
                    self.consecutive_failures = 0;
                    self.unhealthy_until = None;
                }
            }
        }
        self.is_healthy
    }

    fn record_success(&mut self, latency_ms: f64) {
        self.total_requests += 1;
        self.successful_requests += 1;
        self.consecutive_failures = 0;
        self.ema_latency_ms = if self.ema_latency_ms == 0.0 {
            latency_ms
        } else {
            LATENCY_EMA_ALPHA * latency_ms + (1.0 - LATENCY_EMA_ALPHA) * self.ema_latency_ms
        };
    }

    fn record_failure(&mut self) {
        self.total_requests += 1;
        self.consecutive_failures += 1;
        if self.consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
            self.is_healthy = false;
            self.unhealthy_until = Some(chrono::Utc::now() + chrono::Duration::seconds(DEFAULT_UNHEALTHY_DURATION_SECS));
        }
    }
}

/// Dispatches `generate` calls across a purpose lane's preferences,
/// retrying transient failures per-model and falling through to the next
/// preference on schema/auth failures or retry exhaustion.
pub struct LlmGateway {
    policy: RoutingPolicy,
    providers: HashMap<String, Box<dyn Provider>>,
    budgets: Mutex<HashMap<String, JobBudget>>,
    health: Mutex<HashMap<String, ProviderHealth>>,
    max_retries: u32,
}

impl LlmGateway {
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            providers: HashMap::new(),
            budgets: Mutex::new(HashMap::new()),
            health: Mutex::new(HashMap::new()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn register_provider(&mut self, name: impl Into<String>, provider: Box<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// True if `provider_name` is registered and not in its unhealthy
    /// cooldown window; auto-clears an expired cooldown as a side effect.
    fn is_provider_available(&self, provider_name: &str) -> bool {
        let mut health = self.health.lock().expect("health lock poisoned");
        health.entry(provider_name.to_string()).or_default().is_available()
    }

    fn record_health_success(&self, provider_name: &str, latency_ms: f64) {
        let mut health = self.health.lock().expect("health lock poisoned");
        health.entry(provider_name.to_string()).or_default().record_success(latency_ms);
    }

    fn record_health_failure(&self, provider_name: &str) {
        let mut health = self.health.lock().expect("health lock poisoned");
        let entry = health.entry(provider_name.to_string()).or_default();
        entry.record_failure();
        if !entry.is_healthy {
            warn!(provider = %provider_name, consecutive_failures = entry.consecutive_failures, "provider marked unhealthy");
        }
    }

    /// Snapshot of a provider's tracked health, for the admin metrics surface.
    pub fn provider_health(&self, provider_name: &str) -> Option<ProviderHealth> {
        self.health.lock().expect("health lock poisoned").get(provider_name).cloned()
    }

    pub fn register_job_budget(&self, budget: JobBudget) {
        self.budgets
            .lock()
            .expect("budget lock poisoned")
            .insert(budget.job_id.clone(), budget);
    }

    /// Run the purpose lane in priority order, retrying each preference with
    /// backoff on transient errors, until one succeeds or all are exhausted.
    pub async fn generate(
        &self,
        purpose: Purpose,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        allowed_dirs: &[String],
        job_id: Option<&str>,
        temperature: f32,
        seed: Option<u64>,
        requested_tokens: u32,
    ) -> GatewayResult<(GeneratorResponseContract, GenerateMetadata)> {
        if let Some(job_id) = job_id {
            self.check_budget(job_id, requested_tokens)?;
        }

        let preferences = self.policy.lane(purpose);
        let mut errors = Vec::new();

        for (index, preference) in preferences.iter().enumerate() {
            let attempt_number = index + 1;
            if !self.is_provider_available(&preference.provider) {
                errors.push(format!("{}: marked unhealthy", preference.provider));
                continue;
            }
            let Some(provider) = self.providers.get(preference.provider.as_str()) else {
                errors.push(format!("{}: provider not registered", preference.provider));
                continue;
            };

            let request = ChatRequest {
                model: preference.model.clone(),
                messages: messages.to_vec(),
                temperature,
                seed,
                json_schema: Some(schema.clone()),
            };

            match self.call_with_retry(preference.provider.as_str(), provider.as_ref(), &request).await {
                Ok(response) => {
                    match contract::validate(&response.content, schema, allowed_dirs) {
                        Ok(contract) => {
                            if let Some(job_id) = job_id {
                                self.record_usage(job_id, &response.usage);
                            }
                            info!(
                                provider = %preference.provider,
                                model = %preference.model,
                                attempt = attempt_number,
                                "gateway request succeeded"
                            );
                            return Ok((
                                contract,
                                GenerateMetadata {
                                    provider: preference.provider.clone(),
                                    model: preference.model.clone(),
                                    usage: response.usage,
                                    attempt: attempt_number,
                                },
                            ));
                        }
                        Err(e) => {
                            // Schema/contract failure: do not retry this
                            // model, fall through to the next preference.
                            warn!(provider = %preference.provider, error = %e, "schema validation failed, falling through");
                            errors.push(format!("{}: {e}", preference.provider));
                        }
                    }
                }
                Err(e) => {
                    warn!(provider = %preference.provider, error = %e, "provider exhausted retries");
                    errors.push(format!("{}: {e}", preference.provider));
                }
            }
        }

        Err(GatewayError::AllModelsFailed { purpose, errors })
    }

    /// Like `generate`, but returns the raw JSON response instead of
    /// requiring it to match the codegen `GeneratorResponseContract` —
    /// used by the delegation manager's classification/decomposition/
    /// verification calls, whose response shapes vary by call site.
    pub async fn generate_raw(
        &self,
        purpose: Purpose,
        messages: &[ChatMessage],
        job_id: Option<&str>,
        temperature: f32,
        requested_tokens: u32,
    ) -> GatewayResult<(serde_json::Value, GenerateMetadata)> {
        if let Some(job_id) = job_id {
            self.check_budget(job_id, requested_tokens)?;
        }

        let preferences = self.policy.lane(purpose);
        let mut errors = Vec::new();

        for (index, preference) in preferences.iter().enumerate() {
            let attempt_number = index + 1;
            if !self.is_provider_available(&preference.provider) {
                errors.push(format!("{}: marked unhealthy", preference.provider));
                continue;
            }
            let Some(provider) = self.providers.get(preference.provider.as_str()) else {
                errors.push(format!("{}: provider not registered", preference.provider));
                continue;
            };

            let request = ChatRequest {
                model: preference.model.clone(),
                messages: messages.to_vec(),
                temperature,
                seed: None,
                json_schema: None,
            };

            match self.call_with_retry(preference.provider.as_str(), provider.as_ref(), &request).await {
                Ok(response) => {
                    if let Some(job_id) = job_id {
                        self.record_usage(job_id, &response.usage);
                    }
                    return Ok((
                        response.content,
                        GenerateMetadata {
                            provider: preference.provider.clone(),
                            model: preference.model.clone(),
                            usage: response.usage,
                            attempt: attempt_number,
                        },
                    ));
                }
                Err(e) => {
                    warn!(provider = %preference.provider, error = %e, "provider exhausted retries");
                    errors.push(format!("{}: {e}", preference.provider));
                }
            }
        }

        Err(GatewayError::AllModelsFailed { purpose, errors })
    }

    /// Like `generate_raw`, but dispatches over a tier lane instead of a
    /// purpose lane — used by the delegation manager, which routes by
    /// inference tier (`required_tier(capabilities)`), not by codegen/
    /// repair/critic purpose.
    pub async fn generate_for_tier(
        &self,
        tier: crate::config::Tier,
        messages: &[ChatMessage],
        job_id: Option<&str>,
        temperature: f32,
        requested_tokens: u32,
    ) -> GatewayResult<(serde_json::Value, GenerateMetadata)> {
        if let Some(job_id) = job_id {
            self.check_budget(job_id, requested_tokens)?;
        }

        let preferences = self.policy.tier_lane(tier);
        let mut errors = Vec::new();

        for (index, preference) in preferences.iter().enumerate() {
            let attempt_number = index + 1;
            if !self.is_provider_available(&preference.provider) {
                errors.push(format!("{}: marked unhealthy", preference.provider));
                continue;
            }
            let Some(provider) = self.providers.get(preference.provider.as_str()) else {
                errors.push(format!("{}: provider not registered", preference.provider));
                continue;
            };

            let request = ChatRequest {
                model: preference.model.clone(),
                messages: messages.to_vec(),
                temperature,
                seed: None,
                json_schema: None,
            };

            match self.call_with_retry(preference.provider.as_str(), provider.as_ref(), &request).await {
                Ok(response) => {
                    if let Some(job_id) = job_id {
                        self.record_usage(job_id, &response.usage);
                    }
                    return Ok((
                        response.content,
                        GenerateMetadata {
                            provider: preference.provider.clone(),
                            model: preference.model.clone(),
                            usage: response.usage,
                            attempt: attempt_number,
                        },
                    ));
                }
                Err(e) => {
                    warn!(provider = %preference.provider, error = %e, "provider exhausted retries");
                    errors.push(format!("{}: {e}", preference.provider));
                }
            }
        }

        Err(GatewayError::AllModelsFailedForTier { tier, errors })
    }

    /// True if at least one registered preference exists for `tier`.
    pub fn has_tier(&self, tier: crate::config::Tier) -> bool {
        !self.policy.tier_lane(tier).is_empty()
    }

    /// Retry a single provider call with exponential backoff + jitter on
    /// transient errors; auth and schema errors never retry.
    async fn call_with_retry(
        &self,
        provider_name: &str,
        provider: &dyn Provider,
        request: &ChatRequest,
    ) -> Result<ChatResponse, ProviderError> {
        let start = std::time::Instant::now();
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match provider.generate(request.clone()).await {
                Ok(response) => {
                    self.record_health_success(provider_name, start.elapsed().as_secs_f64() * 1000.0);
                    return Ok(response);
                }
                Err(ProviderError::Auth(msg)) => {
                    self.record_health_failure(provider_name);
                    return Err(ProviderError::Auth(msg));
                }
                Err(e @ (ProviderError::RateLimit { .. } | ProviderError::Connection(_) | ProviderError::Timeout)) => {
                    last_err = Some(e);
                    if attempt == self.max_retries {
                        break;
                    }
                    let retry_after = match &last_err {
                        Some(ProviderError::RateLimit { retry_after_secs: Some(s) }) => Some(*s),
                        _ => None,
                    };
                    let delay = retry_after.unwrap_or_else(|| {
                        compute_backoff(attempt, DEFAULT_BASE_DELAY_SECS, DEFAULT_CAP_SECS)
                    });
                    debug!(attempt, delay, "retrying provider call after backoff");
                    tokio::time::sleep(std::time::Duration::from_secs_f64(delay)).await;
                }
            }
        }
        self.record_health_failure(provider_name);
        Err(last_err.unwrap_or(ProviderError::Connection("no attempts made".to_string())))
    }

    fn check_budget(&self, job_id: &str, requested_tokens: u32) -> GatewayResult<()> {
        let budgets = self.budgets.lock().expect("budget lock poisoned");
        if let Some(budget) = budgets.get(job_id) {
            if !budget.has_headroom(requested_tokens) {
                return Err(GatewayError::BudgetExceeded);
            }
        }
        Ok(())
    }

    fn record_usage(&self, job_id: &str, usage: &provider::Usage) {
        let mut budgets = self.budgets.lock().expect("budget lock poisoned");
        if let Some(budget) = budgets.get_mut(job_id) {
            budget.record_usage(usage.prompt_tokens + usage.completion_tokens);
        }
    }

    pub fn job_budget(&self, job_id: &str) -> Option<JobBudget> {
        self.budgets.lock().expect("budget lock poisoned").get(job_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn build_routing_policy_falls_back_to_all_providers_when_no_category_configured() {
        let config = crate::config::RoutingConfig::default();
        let providers = vec![
            crate::config::ProviderConfig { name: "openai".to_string(), base_url: "https://api.openai.com/v1".to_string(), api_key: "k".to_string() },
            crate::config::ProviderConfig { name: "anthropic".to_string(), base_url: "https://api.anthropic.com/v1".to_string(), api_key: "k".to_string() },
        ];
        let policy = build_routing_policy(&config, &providers);

        let codegen = policy.lane(Purpose::Codegen);
        assert_eq!(codegen.len(), 2);
        assert_eq!(codegen[0].provider, "openai");

        let heavy = policy.tier_lane(crate::config::Tier::Heavy);
        assert_eq!(heavy.len(), 2);
    }

    #[test]
    fn build_routing_policy_honors_configured_category() {
        let mut config = crate::config::RoutingConfig::default();
        config.categories.insert(
            "ultra".to_string(),
            crate::config::CategoryRouting {
                provider: Some("anthropic".to_string()),
                model: Some("claude-opus".to_string()),
                ..Default::default()
            },
        );
        let policy = build_routing_policy(&config, &[]);

        let ultra = policy.tier_lane(crate::config::Tier::Ultra);
        assert_eq!(ultra.len(), 1);
        assert_eq!(ultra[0].provider, "anthropic");
        assert_eq!(ultra[0].model, "claude-opus");
    }

    struct AlwaysRateLimited {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Provider for AlwaysRateLimited {
        async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProviderError::RateLimit { retry_after_secs: Some(0.0) })
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    struct ValidJson;

    #[async_trait]
    impl Provider for ValidJson {
        async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: serde_json::json!({
                    "stage": "implement",
                    "module": "news/nyt",
                    "changed_files": {"adapter.rs": "fn main() {}"},
                    "deleted_files": [],
                    "assumptions": [],
                    "rationale": "ok",
                    "policy": {},
                    "validation_report": null,
                }),
                usage: provider::Usage { prompt_tokens: 10, completion_tokens: 20 },
            })
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    struct InvalidJson;

    #[async_trait]
    impl Provider for InvalidJson {
        async fn generate(&self, _request: ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: serde_json::json!({"invalid": "response"}),
                usage: provider::Usage { prompt_tokens: 5, completion_tokens: 5 },
            })
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn schema() -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    #[tokio::test]
    async fn provider_fallback_on_rate_limit() {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(
            Purpose::Codegen,
            vec![
                ModelPreference { provider: "github".to_string(), model: "m1".to_string(), priority: 0 },
                ModelPreference { provider: "openai".to_string(), model: "m2".to_string(), priority: 1 },
                ModelPreference { provider: "anthropic".to_string(), model: "m3".to_string(), priority: 2 },
            ],
        );

        let mut gateway = LlmGateway::new(policy);
        gateway.max_retries = 0;
        let calls = Arc::new(AtomicUsize::new(0));
        gateway.register_provider("github", Box::new(AlwaysRateLimited { calls: calls.clone() }));
        gateway.register_provider("openai", Box::new(ValidJson));
        gateway.register_provider(
            "anthropic",
            Box::new(AlwaysRateLimited { calls: Arc::new(AtomicUsize::new(0)) }),
        );

        let (_, meta) = gateway
            .generate(Purpose::Codegen, &[], &schema(), &["adapter.rs".to_string()], None, 0.2, None, 100)
            .await
            .unwrap();

        assert_eq!(meta.provider, "openai");
        assert_eq!(meta.attempt, 2);
        assert!(calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn schema_rejection_falls_through_without_retrying_same_model() {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(
            Purpose::Codegen,
            vec![
                ModelPreference { provider: "first".to_string(), model: "m1".to_string(), priority: 0 },
                ModelPreference { provider: "second".to_string(), model: "m2".to_string(), priority: 1 },
            ],
        );

        let mut gateway = LlmGateway::new(policy);
        gateway.register_provider("first", Box::new(InvalidJson));
        gateway.register_provider("second", Box::new(ValidJson));

        let (_, meta) = gateway
            .generate(Purpose::Codegen, &[], &schema(), &["adapter.rs".to_string()], None, 0.2, None, 100)
            .await
            .unwrap();

        assert_eq!(meta.provider, "second");
        assert_eq!(meta.attempt, 2);
    }

    #[tokio::test]
    async fn all_models_failed_when_every_preference_exhausted() {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(
            Purpose::Repair,
            vec![ModelPreference { provider: "only".to_string(), model: "m1".to_string(), priority: 0 }],
        );

        let mut gateway = LlmGateway::new(policy);
        gateway.max_retries = 0;
        gateway.register_provider(
            "only",
            Box::new(AlwaysRateLimited { calls: Arc::new(AtomicUsize::new(0)) }),
        );

        let result = gateway
            .generate(Purpose::Repair, &[], &schema(), &[], None, 0.2, None, 100)
            .await;
        assert!(matches!(result, Err(GatewayError::AllModelsFailed { .. })));
    }

    #[tokio::test]
    async fn budget_exceeded_rejects_before_calling_provider() {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(
            Purpose::Codegen,
            vec![ModelPreference { provider: "p".to_string(), model: "m".to_string(), priority: 0 }],
        );
        let mut gateway = LlmGateway::new(policy);
        let calls = Arc::new(AtomicUsize::new(0));
        gateway.register_provider("p", Box::new(AlwaysRateLimited { calls: calls.clone() }));
        gateway.register_job_budget(JobBudget::new("job-1", 10));

        let result = gateway
            .generate(Purpose::Codegen, &[], &schema(), &[], Some("job-1"), 0.2, None, 9999)
            .await;
        assert!(matches!(result, Err(GatewayError::BudgetExceeded)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_marked_unhealthy_after_three_consecutive_failures_is_skipped() {
        let mut policy = RoutingPolicy::new();
        policy.set_lane(
            Purpose::Codegen,
            vec![
                ModelPreference { provider: "flaky".to_string(), model: "m1".to_string(), priority: 0 },
                ModelPreference { provider: "backup".to_string(), model: "m2".to_string(), priority: 1 },
            ],
        );

        let mut gateway = LlmGateway::new(policy);
        gateway.max_retries = 0;
        let calls = Arc::new(AtomicUsize::new(0));
        gateway.register_provider("flaky", Box::new(AlwaysRateLimited { calls: calls.clone() }));
        gateway.register_provider("backup", Box::new(ValidJson));

        for _ in 0..MAX_CONSECUTIVE_FAILURES {
            let _ = gateway
                .generate(Purpose::Codegen, &[], &schema(), &["adapter.rs".to_string()], None, 0.2, None, 100)
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), MAX_CONSECUTIVE_FAILURES as usize);

        let health = gateway.provider_health("flaky").unwrap();
        assert!(!health.is_healthy);
        assert_eq!(health.consecutive_failures, MAX_CONSECUTIVE_FAILURES);

        // Now unhealthy: the ladder should skip straight to "backup" without
        // calling "flaky" again.
        let (_, meta) = gateway
            .generate(Purpose::Codegen, &[], &schema(), &["adapter.rs".to_string()], None, 0.2, None, 100)
            .await
            .unwrap();
        assert_eq!(meta.provider, "backup");
        assert_eq!(calls.load(Ordering::SeqCst), MAX_CONSECUTIVE_FAILURES as usize);
    }

    #[test]
    fn provider_health_recovers_latency_ema_and_success_rate() {
        let mut health = ProviderHealth::default();
        health.record_failure();
        health.record_failure();
        assert!(health.is_healthy);
        health.record_success(100.0);
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.ema_latency_ms, 100.0);
        health.record_success(200.0);
        assert_eq!(health.ema_latency_ms, 0.2 * 200.0 + 0.8 * 100.0);
        assert_eq!(health.total_requests, 4);
        assert_eq!(health.successful_requests, 2);
        assert_eq!(health.success_rate(), 50.0);
    }
}
