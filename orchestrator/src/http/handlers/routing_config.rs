//! `/admin/routing-config` and its category sub-resource.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::config::{CategoryRouting, RoutingConfig};
use crate::http::error::ApiError;
use crate::http::state::AppState;

pub async fn get_routing_config(State(state): State<AppState>) -> Json<RoutingConfig> {
    Json(state.config.get_config())
}

pub async fn put_routing_config(State(state): State<AppState>, Json(config): Json<RoutingConfig>) -> Result<Json<RoutingConfig>, ApiError> {
    state.config.update_config(config)?;
    Ok(Json(state.config.get_config()))
}

pub async fn upsert_category(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(routing): Json<CategoryRouting>,
) -> Result<Json<CategoryRouting>, ApiError> {
    state.config.upsert_category(&name, routing.clone())?;
    Ok(Json(routing))
}

pub async fn delete_category(State(state): State<AppState>, Path(name): Path<String>) -> Result<(), ApiError> {
    state.config.remove_category(&name)?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    status: String,
    categories: usize,
}

pub async fn reload_routing_config(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let categories = state.config.reload()?;
    Ok(Json(ReloadResponse { status: "reloaded".to_string(), categories }))
}
