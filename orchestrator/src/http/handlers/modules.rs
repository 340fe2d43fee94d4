//! `/admin/modules` — registry listing, lifecycle actions, and the
//! scaffold→validate→repair build entry point.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::pipeline::{run_build_pipeline, AuthType, ModuleStatus, ScaffoldRequest};
use crate::registry::RegistryEntry;

use crate::http::error::ApiError;
use crate::http::state::AppState;

pub async fn list_modules(State(state): State<AppState>) -> Result<Json<Vec<RegistryEntry>>, ApiError> {
    Ok(Json(state.modules.list()?))
}

pub async fn get_module(State(state): State<AppState>, Path((category, platform)): Path<(String, String)>) -> Result<Json<RegistryEntry>, ApiError> {
    let module_id = format!("{category}/{platform}");
    Ok(Json(state.modules.get(&module_id)?))
}

pub async fn module_action(
    State(state): State<AppState>,
    Path((category, platform, action)): Path<(String, String, String)>,
) -> Result<Json<RegistryEntry>, ApiError> {
    let module_id = format!("{category}/{platform}");
    match action.as_str() {
        "enable" => state.modules.set_status(&module_id, ModuleStatus::Installed)?,
        "disable" => state.modules.set_status(&module_id, ModuleStatus::Disabled)?,
        "reload" => state.modules.touch(&module_id)?,
        other => return Err(ApiError::BadRequest(format!("unknown module action '{other}'"))),
    }
    Ok(Json(state.modules.get(&module_id)?))
}

pub async fn delete_module(State(state): State<AppState>, Path((category, platform)): Path<(String, String)>) -> Result<(), ApiError> {
    state.modules.remove(&format!("{category}/{platform}"))?;
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct BuildModuleRequest {
    pub name: String,
    pub category: String,
    #[serde(default)]
    pub platform: String,
    #[serde(default)]
    pub description: String,
    pub api_base_url: String,
    pub auth_type: AuthType,
}

#[derive(Debug, Serialize)]
pub struct BuildModuleResponse {
    pub module_id: String,
    pub repair: crate::pipeline::RepairOutcome,
}

/// Scaffold a brand-new module and drive it through validate/repair,
/// calling the gateway's `repair` purpose lane for any attempt past the
/// first. Installing the result is a separate, explicit admission step.
pub async fn build_module(State(state): State<AppState>, Json(request): Json<BuildModuleRequest>) -> Result<Json<BuildModuleResponse>, ApiError> {
    let job_id = format!("build-{}-{}", request.category, request.name);
    let scaffold_request = ScaffoldRequest {
        name: request.name,
        category: request.category,
        platform: request.platform,
        description: request.description,
        api_base_url: request.api_base_url,
        auth_type: request.auth_type,
    };

    let outcome = run_build_pipeline(&state.gateway, &scaffold_request, &state.modules_dir, &job_id).await?;
    Ok(Json(BuildModuleResponse { module_id: outcome.manifest.module_id(), repair: outcome.repair }))
}
