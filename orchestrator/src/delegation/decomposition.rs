//! Query classification and decomposition. Grounded on
//! `delegation_manager.py`'s `_classify_query`/`_decompose_task`/
//! `analyze_and_route` and `_resolve_routing`.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{CapabilityMap, Tier};
use crate::gateway::{ChatMessage, LlmGateway};

use super::DelegationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    Decompose,
    Verify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub instruction: String,
    pub required_capabilities: Vec<String>,
    pub target_tier: Tier,
    pub depends_on: Vec<String>,
    /// 1 = highest.
    pub priority: u32,
    pub result: Option<String>,
    pub status: SubTaskStatus,
    pub duration_ms: f64,
}

impl SubTask {
    fn new(id: String, instruction: String, required_capabilities: Vec<String>, depends_on: Vec<String>, priority: u32) -> Self {
        Self {
            id,
            instruction,
            required_capabilities,
            target_tier: Tier::Standard,
            depends_on,
            priority,
            result: None,
            status: SubTaskStatus::Pending,
            duration_ms: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub task_type: String,
    pub capabilities: Vec<String>,
    pub complexity: f32,
}

impl Default for Classification {
    fn default() -> Self {
        Self {
            task_type: "general".to_string(),
            capabilities: vec!["fast_response".to_string()],
            complexity: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDecomposition {
    pub original_query: String,
    pub sub_tasks: Vec<SubTask>,
    pub strategy: Strategy,
    pub complexity_score: f32,
    pub task_type: String,
}

/// Classify `query` via the standard tier, then either build a single direct
/// SubTask or decompose into 2..=max_sub_tasks dependency-ordered SubTasks.
pub async fn analyze_and_route(
    gateway: &LlmGateway,
    capability_map: &CapabilityMap,
    routing_config: Option<&crate::config::RoutingConfig>,
    complexity_direct_threshold: f32,
    max_sub_tasks: usize,
    query: &str,
) -> DelegationResult<TaskDecomposition> {
    let classification = classify_query(gateway, query).await;
    info!(
        task_type = %classification.task_type,
        complexity = classification.complexity,
        capabilities = ?classification.capabilities,
        "delegation classification"
    );

    if classification.complexity < complexity_direct_threshold || classification.capabilities.len() <= 1 {
        let tier = if classification.capabilities.is_empty() {
            Tier::Standard
        } else {
            capability_map.required_tier(&classification.capabilities, routing_config)
        };
        let mut sub_task = SubTask::new(
            format!("st_{}", short_id()),
            query.to_string(),
            classification.capabilities.clone(),
            Vec::new(),
            1,
        );
        sub_task.target_tier = tier;

        return Ok(TaskDecomposition {
            original_query: query.to_string(),
            sub_tasks: vec![sub_task],
            strategy: Strategy::Direct,
            complexity_score: classification.complexity,
            task_type: classification.task_type,
        });
    }

    let mut sub_tasks = decompose_task(gateway, query, &classification, max_sub_tasks).await;
    for task in &mut sub_tasks {
        task.target_tier = capability_map.required_tier(&task.required_capabilities, routing_config);
    }

    Ok(TaskDecomposition {
        original_query: query.to_string(),
        sub_tasks,
        strategy: Strategy::Decompose,
        complexity_score: classification.complexity,
        task_type: classification.task_type,
    })
}

async fn classify_query(gateway: &LlmGateway, query: &str) -> Classification {
    let prompt = format!(
        "Analyze this query and respond with JSON only.\n\n\
         Query: \"{query}\"\n\n\
         Respond with:\n\
         {{\"task_type\": \"one of: coding, reasoning, math, finance, multilingual, search, general\",\n\
          \"capabilities\": [\"list of: coding, reasoning, analysis, verification, finance, multilingual, math, fast_response, search, deep_research\"],\n\
          \"complexity\": 0.0 to 1.0 (0=trivial, 1=very complex multi-step)}}\n\nJSON:"
    );

    let messages = vec![ChatMessage { role: "user".to_string(), content: prompt }];
    match gateway.generate_for_tier(Tier::Standard, &messages, None, 0.1, 256).await {
        Ok((value, _metadata)) => parse_classification(&value).unwrap_or_else(|| {
            warn!("classification response missing expected fields, using defaults");
            Classification::default()
        }),
        Err(e) => {
            warn!(error = %e, "classification failed, using defaults");
            Classification::default()
        }
    }
}

fn parse_classification(value: &serde_json::Value) -> Option<Classification> {
    let task_type = value.get("task_type")?.as_str()?.to_string();
    let capabilities = value
        .get("capabilities")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_else(|| vec!["fast_response".to_string()]);
    let complexity = value.get("complexity").and_then(|v| v.as_f64()).unwrap_or(0.3) as f32;
    Some(Classification { task_type, capabilities, complexity })
}

async fn decompose_task(
    gateway: &LlmGateway,
    query: &str,
    classification: &Classification,
    max_sub_tasks: usize,
) -> Vec<SubTask> {
    let prompt = format!(
        "Break this complex query into 2-{max_sub_tasks} sub-tasks.\n\n\
         Query: \"{query}\"\n\
         Required capabilities: {:?}\n\n\
         Respond with JSON array:\n\
         [{{\"id\": \"st_1\", \"instruction\": \"specific task description\", \"capabilities\": [\"needed_capabilities\"], \"depends_on\": []}}]\n\n\
         Keep sub-tasks focused and actionable. Use depends_on to reference earlier task IDs.\n\nJSON:",
        classification.capabilities
    );

    let messages = vec![ChatMessage { role: "user".to_string(), content: prompt }];
    let fallback = || {
        vec![SubTask::new(
            "st_fallback".to_string(),
            query.to_string(),
            classification.capabilities.clone(),
            Vec::new(),
            1,
        )]
    };

    let value = match gateway.generate_for_tier(Tier::Standard, &messages, None, 0.2, 512).await {
        Ok((value, _metadata)) => value,
        Err(e) => {
            warn!(error = %e, "decomposition failed, using single task");
            return fallback();
        }
    };

    let items: Vec<serde_json::Value> = match value {
        serde_json::Value::Array(arr) => arr,
        other => vec![other],
    };

    let sub_tasks: Vec<SubTask> = items
        .into_iter()
        .take(max_sub_tasks)
        .enumerate()
        .map(|(i, item)| {
            let id = item.get("id").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(|| format!("st_{}", i + 1));
            let instruction = item.get("instruction").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(|| query.to_string());
            let capabilities = item
                .get("capabilities")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_else(|| vec!["fast_response".to_string()]);
            let depends_on = item
                .get("depends_on")
                .and_then(|v| v.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default();
            SubTask::new(id, instruction, capabilities, depends_on, (i + 1) as u32)
        })
        .collect();

    if sub_tasks.is_empty() {
        fallback()
    } else {
        sub_tasks
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::gateway::{ChatResponse, ModelInfo, ModelPreference, Provider, ProviderError, RoutingPolicy, Usage};

    struct ScriptedProvider {
        responses: std::sync::Mutex<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn generate(&self, _request: crate::gateway::ChatRequest) -> Result<ChatResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ProviderError::Connection("no more scripted responses".to_string()));
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

    fn gateway_with(responses: Vec<serde_json::Value>) -> LlmGateway {
        let mut policy = RoutingPolicy::new();
        policy.set_tier_lane(
            Tier::Standard,
            vec![ModelPreference { provider: "mock".to_string(), model: "mock-standard".to_string(), priority: 0 }],
        );
        let mut gateway = LlmGateway::new(policy);
        gateway.register_provider("mock", Box::new(ScriptedProvider { responses: std::sync::Mutex::new(responses) }));
        gateway
    }

    #[tokio::test]
    async fn low_complexity_query_routes_direct() {
        let gateway = gateway_with(vec![serde_json::json!({
            "task_type": "general",
            "capabilities": ["fast_response"],
            "complexity": 0.1
        })]);
        let capability_map = CapabilityMap::new();

        let decomposition = analyze_and_route(&gateway, &capability_map, None, 0.5, 5, "what time is it?").await.unwrap();
        assert_eq!(decomposition.strategy, Strategy::Direct);
        assert_eq!(decomposition.sub_tasks.len(), 1);
        assert_eq!(decomposition.sub_tasks[0].target_tier, Tier::Standard);
    }

    #[tokio::test]
    async fn high_complexity_multi_capability_query_decomposes() {
        let gateway = gateway_with(vec![
            serde_json::json!({
                "task_type": "coding",
                "capabilities": ["coding", "verification"],
                "complexity": 0.9
            }),
            serde_json::json!([
                {"id": "st_1", "instruction": "write the function", "capabilities": ["coding"], "depends_on": []},
                {"id": "st_2", "instruction": "verify the function", "capabilities": ["verification"], "depends_on": ["st_1"]}
            ]),
        ]);
        let capability_map = CapabilityMap::new();

        let decomposition = analyze_and_route(&gateway, &capability_map, None, 0.5, 5, "build and verify a parser").await.unwrap();
        assert_eq!(decomposition.strategy, Strategy::Decompose);
        assert_eq!(decomposition.sub_tasks.len(), 2);
        assert_eq!(decomposition.sub_tasks[0].target_tier, Tier::Heavy);
        assert_eq!(decomposition.sub_tasks[1].target_tier, Tier::Ultra);
        assert_eq!(decomposition.sub_tasks[1].depends_on, vec!["st_1".to_string()]);
    }

    #[tokio::test]
    async fn classification_failure_falls_back_to_defaults() {
        let gateway = gateway_with(vec![]);
        let capability_map = CapabilityMap::new();

        let decomposition = analyze_and_route(&gateway, &capability_map, None, 0.5, 5, "anything").await.unwrap();
        assert_eq!(decomposition.strategy, Strategy::Direct);
        assert_eq!(decomposition.task_type, "general");
    }

    #[tokio::test]
    async fn malformed_decomposition_response_falls_back_to_single_task() {
        let gateway = gateway_with(vec![
            serde_json::json!({
                "task_type": "coding",
                "capabilities": ["coding", "verification"],
                "complexity": 0.9
            }),
            serde_json::json!("not an array or object with fields"),
        ]);
        let capability_map = CapabilityMap::new();

        let decomposition = analyze_and_route(&gateway, &capability_map, None, 0.5, 5, "build and verify a parser").await.unwrap();
        assert_eq!(decomposition.sub_tasks.len(), 1);
        assert_eq!(decomposition.sub_tasks[0].id, "st_fallback");
    }
}
