//! Bounded topological execution of a `TaskDecomposition`'s sub-tasks, plus
//! result aggregation. Grounded on `delegation_manager.py`'s
//! `execute_delegation`/`aggregate_results`.

use std::collections::HashMap;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::Tier;
use crate::gateway::{ChatMessage, LlmGateway};

use super::decomposition::{SubTaskStatus, TaskDecomposition};
use super::DelegationResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubTaskResult {
    pub task_id: String,
    pub tier: Tier,
    pub status: SubTaskStatus,
    pub duration_ms: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationExecution {
    pub sub_results: Vec<SubTaskResult>,
    pub completed: HashMap<String, String>,
}

/// Run every sub-task once its dependencies are satisfied, up to
/// `|sub_tasks| + 2` rounds. A round with pending tasks but zero progress is
/// a dependency deadlock: remaining tasks are marked failed and the loop
/// stops early rather than spinning out the remaining rounds.
pub async fn execute_delegation(
    gateway: &LlmGateway,
    decomposition: &mut TaskDecomposition,
) -> DelegationResult<DelegationExecution> {
    let mut completed: HashMap<String, String> = HashMap::new();
    let mut results = Vec::new();
    let mut pending: Vec<usize> = (0..decomposition.sub_tasks.len()).collect();

    let max_rounds = decomposition.sub_tasks.len() + 2;
    let mut round = 0;

    while !pending.is_empty() && round < max_rounds {
        round += 1;
        let mut executed_this_round = Vec::new();

        for &index in &pending {
            let deps_met = decomposition.sub_tasks[index].depends_on.iter().all(|dep| completed.contains_key(dep));
            if !deps_met {
                continue;
            }

            let mut dep_context = String::new();
            for dep in &decomposition.sub_tasks[index].depends_on {
                if let Some(result) = completed.get(dep) {
                    dep_context.push_str(&format!("\n[Previous result]: {result}\n"));
                }
            }

            decomposition.sub_tasks[index].status = SubTaskStatus::Running;
            let start = Instant::now();

            let prompt = if dep_context.is_empty() {
                decomposition.sub_tasks[index].instruction.clone()
            } else {
                format!("{dep_context}\n\n{}", decomposition.sub_tasks[index].instruction)
            };

            let tier = decomposition.sub_tasks[index].target_tier;
            let messages = vec![ChatMessage { role: "user".to_string(), content: prompt }];

            let (result, status) = match gateway.generate_for_tier(tier, &messages, None, 0.2, 1024).await {
                Ok((value, _metadata)) => (value_to_text(&value), SubTaskStatus::Completed),
                Err(e) => {
                    error!(task_id = %decomposition.sub_tasks[index].id, error = %e, "sub-task failed");
                    (format!("Error: {e}"), SubTaskStatus::Failed)
                }
            };

            let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
            decomposition.sub_tasks[index].result = Some(result.clone());
            decomposition.sub_tasks[index].status = status;
            decomposition.sub_tasks[index].duration_ms = duration_ms;

            completed.insert(decomposition.sub_tasks[index].id.clone(), result);
            executed_this_round.push(index);
            results.push(SubTaskResult {
                task_id: decomposition.sub_tasks[index].id.clone(),
                tier,
                status,
                duration_ms,
            });

            info!(
                task_id = %decomposition.sub_tasks[index].id,
                tier = tier.as_str(),
                status = ?status,
                duration_ms,
                "sub-task finished"
            );
        }

        pending.retain(|index| !executed_this_round.contains(index));

        if executed_this_round.is_empty() {
            error!("dependency deadlock: no sub-tasks could execute this round");
            for &index in &pending {
                decomposition.sub_tasks[index].status = SubTaskStatus::Failed;
                decomposition.sub_tasks[index].result = Some("Dependency deadlock".to_string());
                results.push(SubTaskResult {
                    task_id: decomposition.sub_tasks[index].id.clone(),
                    tier: decomposition.sub_tasks[index].target_tier,
                    status: SubTaskStatus::Failed,
                    duration_ms: 0.0,
                });
            }
            break;
        }
    }

    Ok(DelegationExecution { sub_results: results, completed })
}

fn value_to_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Single sub-task: return its result directly. Multiple: synthesize via a
/// standard-tier call over all sub-task (id, capabilities, result) triples.
pub async fn aggregate_results(
    gateway: &LlmGateway,
    query: &str,
    decomposition: &TaskDecomposition,
) -> DelegationResult<String> {
    if decomposition.sub_tasks.len() == 1 {
        return Ok(decomposition.sub_tasks[0].result.clone().unwrap_or_default());
    }

    let mut results_text = String::new();
    for task in &decomposition.sub_tasks {
        results_text.push_str(&format!(
            "\n[{}] ({}): {}\n",
            task.id,
            task.required_capabilities.join(", "),
            task.result.as_deref().unwrap_or("")
        ));
    }

    let synthesis_prompt = format!(
        "You are synthesizing results from multiple specialized analyses.\n\n\
         Original question: {query}\n\n\
         Sub-task results:\n{results_text}\n\n\
         Provide a clear, unified answer that integrates all the sub-task findings.\n\
         Be direct and specific — include relevant details from each result.\n\nAnswer:"
    );

    let messages = vec![ChatMessage { role: "user".to_string(), content: synthesis_prompt }];
    let (value, _metadata) = gateway.generate_for_tier(Tier::Standard, &messages, None, 0.3, 1024).await?;
    Ok(value_to_text(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::delegation::decomposition::{Strategy, SubTask};
    use crate::gateway::{ChatResponse, ModelInfo, ModelPreference, Provider, ProviderError, RoutingPolicy, Usage};

    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        async fn generate(&self, request: crate::gateway::ChatRequest) -> Result<ChatResponse, ProviderError> {
            let content = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(ChatResponse { content: serde_json::Value::String(format!("handled: {content}")), usage: Usage::default() })
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        async fn generate(&self, _request: crate::gateway::ChatRequest) -> Result<ChatResponse, ProviderError> {
            Err(ProviderError::Auth("no credentials".to_string()))
        }

        async fn health_check(&self) -> bool {
            false
        }

        fn list_models(&self) -> Vec<ModelInfo> {
            vec![]
        }
    }

    fn gateway_all_tiers(provider: Box<dyn Provider>) -> LlmGateway {
        let mut policy = RoutingPolicy::new();
        for tier in [Tier::Standard, Tier::Heavy, Tier::Ultra] {
            policy.set_tier_lane(tier, vec![ModelPreference { provider: "mock".to_string(), model: "mock".to_string(), priority: 0 }]);
        }
        let mut gateway = LlmGateway::new(policy);
        gateway.register_provider("mock", provider);
        gateway
    }

    fn sub_task(id: &str, depends_on: Vec<&str>) -> SubTask {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "instruction": format!("do {id}"),
            "required_capabilities": ["fast_response"],
            "target_tier": "standard",
            "depends_on": depends_on,
            "priority": 1,
            "result": null,
            "status": "pending",
            "duration_ms": 0.0
        }))
        .unwrap()
    }

    fn decomposition(sub_tasks: Vec<SubTask>) -> TaskDecomposition {
        TaskDecomposition {
            original_query: "q".to_string(),
            sub_tasks,
            strategy: Strategy::Decompose,
            complexity_score: 0.9,
            task_type: "general".to_string(),
        }
    }

    #[tokio::test]
    async fn dependent_tasks_execute_in_order_with_prior_context() {
        let gateway = gateway_all_tiers(Box::new(EchoProvider));
        let mut decomp = decomposition(vec![sub_task("st_1", vec![]), sub_task("st_2", vec!["st_1"])]);

        let execution = execute_delegation(&gateway, &mut decomp).await.unwrap();
        assert_eq!(execution.sub_results.len(), 2);
        assert!(execution.completed.contains_key("st_1"));
        assert!(decomp.sub_tasks[1].result.as_ref().unwrap().contains("Previous result"));
    }

    #[tokio::test]
    async fn unsatisfiable_dependency_is_a_deadlock() {
        let gateway = gateway_all_tiers(Box::new(EchoProvider));
        let mut decomp = decomposition(vec![sub_task("st_1", vec!["st_missing"])]);

        let execution = execute_delegation(&gateway, &mut decomp).await.unwrap();
        assert_eq!(execution.sub_results[0].status, SubTaskStatus::Failed);
        assert_eq!(decomp.sub_tasks[0].result.as_deref(), Some("Dependency deadlock"));
    }

    #[tokio::test]
    async fn failing_sub_task_is_isolated_not_fatal() {
        let gateway = gateway_all_tiers(Box::new(FailingProvider));
        let mut decomp = decomposition(vec![sub_task("st_1", vec![]), sub_task("st_2", vec![])]);

        let execution = execute_delegation(&gateway, &mut decomp).await.unwrap();
        assert_eq!(execution.sub_results.len(), 2);
        assert!(execution.sub_results.iter().all(|r| r.status == SubTaskStatus::Failed));
    }

    #[tokio::test]
    async fn single_sub_task_aggregation_returns_result_directly() {
        let gateway = gateway_all_tiers(Box::new(EchoProvider));
        let mut decomp = decomposition(vec![sub_task("st_1", vec![])]);
        execute_delegation(&gateway, &mut decomp).await.unwrap();

        let aggregated = aggregate_results(&gateway, "q", &decomp).await.unwrap();
        assert_eq!(aggregated, decomp.sub_tasks[0].result.clone().unwrap());
    }

    #[tokio::test]
    async fn multi_sub_task_aggregation_synthesizes() {
        let gateway = gateway_all_tiers(Box::new(EchoProvider));
        let mut decomp = decomposition(vec![sub_task("st_1", vec![]), sub_task("st_2", vec![])]);
        execute_delegation(&gateway, &mut decomp).await.unwrap();

        let aggregated = aggregate_results(&gateway, "q", &decomp).await.unwrap();
        assert!(aggregated.contains("handled"));
    }
}
