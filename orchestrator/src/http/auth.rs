//! `X-API-Key` authentication + RBAC permission gate, applied as axum
//! middleware layers. No direct axum-middleware precedent exists in the
//! retrieval pack (the one axum repo, `mapleaiorg-maple`, doesn't gate its
//! routes) — this follows axum's own idiomatic `from_fn_with_state` pattern.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

use crate::auth::{has_permission, Permission};

use super::error::ApiError;
use super::state::AppState;

async fn require(state: &AppState, headers: &HeaderMap, permission: Permission) -> Result<(), ApiError> {
    let raw_key = headers
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthenticated)?;

    let record = state.api_keys.validate_key(raw_key)?.ok_or(ApiError::Unauthenticated)?;

    if !has_permission(record.role, permission) {
        return Err(ApiError::Forbidden);
    }
    Ok(())
}

macro_rules! permission_middleware {
    ($name:ident, $permission:expr) => {
        pub async fn $name(
            State(state): State<AppState>,
            headers: HeaderMap,
            request: Request,
            next: Next,
        ) -> Result<Response, ApiError> {
            require(&state, &headers, $permission).await?;
            Ok(next.run(request).await)
        }
    };
}

permission_middleware!(require_read_config, Permission::ReadConfig);
permission_middleware!(require_write_config, Permission::WriteConfig);
permission_middleware!(require_manage_modules, Permission::ManageModules);
