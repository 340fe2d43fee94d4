//! Cascading result verification: self-consistency → heavy-tier upgrade →
//! ultra-tier deep verify. Grounded on `delegation_manager.py`'s
//! `verify_result`.

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Tier;
use crate::gateway::{ChatMessage, LlmGateway};

const SELF_CONSISTENCY_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationMethod {
    SelfConsistency,
    ModelUpgrade,
    AirllmDeep,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub verified: bool,
    pub method: VerificationMethod,
    pub confidence: f32,
    pub revised_answer: String,
}

/// 1. Sample the standard tier `k=3` times at T=0.3 and compute a
///    consistency score (the JSON-parsed `correct` agreement rate). If it
///    meets `consistency_threshold`, accept as-is.
/// 2. Otherwise regenerate once on the heavy tier at T=0.15.
/// 3. Otherwise, if complexity > 0.8 and an ultra tier exists, escalate.
/// 4. Any gateway failure throughout resolves to an unverified result,
///    never propagates as an error — verification is best-effort.
pub async fn verify_result(
    gateway: &LlmGateway,
    query: &str,
    answer: &str,
    complexity: f32,
    consistency_threshold: f32,
) -> VerificationResult {
    if !gateway.has_tier(Tier::Standard) {
        return VerificationResult {
            verified: true,
            method: VerificationMethod::Failed,
            confidence: 0.0,
            revised_answer: answer.to_string(),
        };
    }

    let verification_prompt = format!(
        "Question: {query}\n\n\
         Proposed answer: {answer}\n\n\
         Is this answer correct and complete? Respond with a JSON object:\n\
         {{\"correct\": true/false, \"confidence\": 0.0-1.0, \"issues\": \"description if any\"}}"
    );
    let messages = vec![ChatMessage { role: "user".to_string(), content: verification_prompt }];

    let consistency = match self_consistency_score(gateway, &messages).await {
        Some(score) => score,
        None => {
            error!("verification sampling failed");
            return VerificationResult {
                verified: false,
                method: VerificationMethod::Failed,
                confidence: 0.0,
                revised_answer: answer.to_string(),
            };
        }
    };

    if consistency >= consistency_threshold {
        return VerificationResult {
            verified: true,
            method: VerificationMethod::SelfConsistency,
            confidence: consistency,
            revised_answer: answer.to_string(),
        };
    }

    info!(consistency, "self-consistency low, upgrading to heavy tier");
    if gateway.has_tier(Tier::Heavy) {
        let prompt = format!("Answer this question carefully and completely:\n\n{query}");
        let messages = vec![ChatMessage { role: "user".to_string(), content: prompt }];
        if let Ok((value, _metadata)) = gateway.generate_for_tier(Tier::Heavy, &messages, None, 0.15, 1024).await {
            return VerificationResult {
                verified: true,
                method: VerificationMethod::ModelUpgrade,
                confidence: 0.7,
                revised_answer: value_to_text(&value),
            };
        }
    }

    if gateway.has_tier(Tier::Ultra) && complexity > 0.8 {
        info!("routing to ultra tier for deep verification");
        let prompt = format!("Carefully verify and answer:\n\n{query}");
        let messages = vec![ChatMessage { role: "user".to_string(), content: prompt }];
        if let Ok((value, _metadata)) = gateway.generate_for_tier(Tier::Ultra, &messages, None, 0.3, 1024).await {
            return VerificationResult {
                verified: true,
                method: VerificationMethod::AirllmDeep,
                confidence: 0.85,
                revised_answer: value_to_text(&value),
            };
        }
    }

    VerificationResult {
        verified: false,
        method: VerificationMethod::Failed,
        confidence: 0.0,
        revised_answer: answer.to_string(),
    }
}

async fn self_consistency_score(gateway: &LlmGateway, messages: &[ChatMessage]) -> Option<f32> {
    let mut correct_votes = 0usize;
    let mut total = 0usize;

    for _ in 0..SELF_CONSISTENCY_SAMPLES {
        let (value, _metadata) = gateway.generate_for_tier(Tier::Standard, messages, None, 0.3, 256).await.ok()?;
        total += 1;
        if value.get("correct").and_then(|v| v.as_bool()).unwrap_or(false) {
            correct_votes += 1;
        }
    }

    if total == 0 {
        None
    } else {
        Some(correct_votes as f32 / total as f32)
    }
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::gateway::{ChatResponse, ModelInfo, ModelPreference, Provider, ProviderError, RoutingPolicy, Usage};

    struct ScriptedProvider {
        responses: Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, _request: crate::gateway::ChatRequest) -> Result<ChatResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ProviderError::Connection("exhausted".to_string()));
            }
            Ok(ChatResponse { content: responses.remove(0), usage: Usage::default() })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn gateway_with_tiers(tiers: &[(Tier, Vec<serde_json::Value>)]) -> LlmGateway {
        let mut policy = RoutingPolicy::new();
        let mut gateway_providers = Vec::new();
        for (tier, responses) in tiers {
            let name = format!("{:?}", tier);
            policy.set_tier_lane(*tier, vec![ModelPreference { provider: name.clone(), model: "m".to_string(), priority: 0 }]);
            gateway_providers.push((name, responses.clone()));
        }
        let mut gateway = LlmGateway::new(policy);
        for (name, responses) in gateway_providers {
            gateway.register_provider(name, Box::new(ScriptedProvider { responses: Mutex::new(responses) }));
        }
        gateway
    }

    #[tokio::test]
    async fn high_consistency_accepts_original_answer() {
        let gateway = gateway_with_tiers(&[(
            Tier::Standard,
            vec![
                serde_json::json!({"correct": true, "confidence": 0.9}),
                serde_json::json!({"correct": true, "confidence": 0.9}),
                serde_json::json!({"correct": true, "confidence": 0.9}),
            ],
        )]);

        let result = verify_result(&gateway, "q", "a", 0.5, 0.6).await;
        assert!(result.verified);
        assert_eq!(result.method, VerificationMethod::SelfConsistency);
    }

    #[tokio::test]
    async fn low_consistency_upgrades_to_heavy_tier() {
        let gateway = gateway_with_tiers(&[
            (
                Tier::Standard,
                vec![
                    serde_json::json!({"correct": false}),
                    serde_json::json!({"correct": false}),
                    serde_json::json!({"correct": true}),
                ],
            ),
            (Tier::Heavy, vec![serde_json::json!("a better, careful answer")]),
        ]);

        let result = verify_result(&gateway, "q", "a", 0.5, 0.6).await;
        assert!(result.verified);
        assert_eq!(result.method, VerificationMethod::ModelUpgrade);
        assert_eq!(result.confidence, 0.7);
    }

    #[tokio::test]
    async fn low_complexity_with_no_heavy_tier_does_not_escalate_to_ultra() {
        let gateway = gateway_with_tiers(&[(
            Tier::Standard,
            vec![serde_json::json!({"correct": false}), serde_json::json!({"correct": false}), serde_json::json!({"correct": false})],
        )]);

        let result = verify_result(&gateway, "q", "a", 0.2, 0.6).await;
        assert!(!result.verified);
        assert_eq!(result.method, VerificationMethod::Failed);
    }

    #[tokio::test]
    async fn high_complexity_escalates_to_ultra_when_heavy_absent() {
        let gateway = gateway_with_tiers(&[
            (
                Tier::Standard,
                vec![serde_json::json!({"correct": false}), serde_json::json!({"correct": false}), serde_json::json!({"correct": false})],
            ),
            (Tier::Ultra, vec![serde_json::json!("deeply verified answer")]),
        ]);

        let result = verify_result(&gateway, "q", "a", 0.9, 0.6).await;
        assert!(result.verified);
        assert_eq!(result.method, VerificationMethod::AirllmDeep);
        assert_eq!(result.confidence, 0.85);
    }

    #[tokio::test]
    async fn missing_standard_tier_skips_verification() {
        let gateway = gateway_with_tiers(&[]);
        let result = verify_result(&gateway, "q", "a", 0.5, 0.6).await;
        assert!(result.verified);
        assert_eq!(result.method, VerificationMethod::Failed);
        assert_eq!(result.revised_answer, "a");
    }
}
