//! `GET /admin/health` — the one public, unauthenticated route.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::http::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    modules_loaded: usize,
    config_manager: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let modules_loaded = state.modules.list().map(|m| m.len()).unwrap_or(0);
    Json(HealthResponse {
        status: "ok".to_string(),
        modules_loaded,
        config_manager: format!("{} categories loaded", state.config.get_config().categories.len()),
    })
}
