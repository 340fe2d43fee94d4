//! Delegation Manager: classify → decompose → route → execute → aggregate
//! → verify. Grounded on `original_source/orchestrator/delegation_manager.py`.

mod decomposition;
mod execution;
mod verify;

pub use decomposition::{Classification, Strategy, SubTask, SubTaskStatus, TaskDecomposition};
pub use execution::{DelegationExecution, SubTaskResult};
pub use verify::{VerificationMethod, VerificationResult};

use std::sync::Arc;

use thiserror::Error;

use crate::config::{CapabilityMap, SharedConfigManager};
use crate::gateway::LlmGateway;

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),
}

pub type DelegationResult<T> = Result<T, DelegationError>;

/// Owns the gateway handle, capability map, and a live config reference so
/// performance thresholds (`complexity_direct_threshold`, `max_sub_tasks`,
/// `consistency_threshold`) always reflect the latest hot-reloaded config
/// without this manager needing its own observer registration.
pub struct DelegationManager {
    gateway: Arc<LlmGateway>,
    capability_map: CapabilityMap,
    config: SharedConfigManager,
}

impl DelegationManager {
    pub fn new(gateway: Arc<LlmGateway>, config: SharedConfigManager) -> Self {
        Self { gateway, capability_map: CapabilityMap::new(), config }
    }

    pub async fn analyze_and_route(&self, query: &str) -> DelegationResult<TaskDecomposition> {
        let config = self.config.get_config();
        decomposition::analyze_and_route(
            &self.gateway,
            &self.capability_map,
            Some(&config),
            config.performance.complexity_threshold_direct,
            config.performance.max_sub_tasks,
            query,
        )
        .await
    }

    pub async fn execute_delegation(&self, decomposition: &mut TaskDecomposition) -> DelegationResult<DelegationExecution> {
        execution::execute_delegation(&self.gateway, decomposition).await
    }

    pub async fn aggregate_results(&self, query: &str, decomposition: &TaskDecomposition) -> DelegationResult<String> {
        execution::aggregate_results(&self.gateway, query, decomposition).await
    }

    pub async fn verify_result(&self, query: &str, answer: &str, complexity: f32) -> VerificationResult {
        let threshold = self.config.get_config().performance.self_consistency_threshold;
        verify::verify_result(&self.gateway, query, answer, complexity, threshold).await
    }
}
