//! Control RPCs `Query` and `GetMetrics` (§6), exposed over the same axum
//! router as the admin surface rather than a separate gRPC service — no
//! gRPC crate appears anywhere in the retrieval pack's axum precedent, so
//! this keeps the external-interface stack aligned with what's already
//! grounded (`axum`/`tower`).

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::delegation::SubTask;

use crate::http::error::ApiError;
use crate::http::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub user_query: String,
    #[serde(default)]
    pub debug_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub final_answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_graph: Option<Vec<SubTask>>,
}

pub async fn query(State(state): State<AppState>, Json(request): Json<QueryRequest>) -> Result<Json<QueryResponse>, ApiError> {
    let started = std::time::Instant::now();

    let mut decomposition = state.delegation.analyze_and_route(&request.user_query).await?;
    let execution = state.delegation.execute_delegation(&mut decomposition).await?;
    let aggregated = state.delegation.aggregate_results(&request.user_query, &decomposition).await?;
    let verification = state.delegation.verify_result(&request.user_query, &aggregated, decomposition.complexity_score).await;

    let failed = execution
        .sub_results
        .iter()
        .filter(|r| r.status == crate::delegation::SubTaskStatus::Failed)
        .count();

    state.metrics.record_query(started.elapsed().as_millis() as u64, execution.sub_results.len() as u64, failed as u64);

    Ok(Json(QueryResponse {
        final_answer: verification.revised_answer,
        execution_graph: request.debug_mode.then(|| decomposition.sub_tasks.clone()),
    }))
}

pub async fn get_metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
