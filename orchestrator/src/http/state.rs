//! Shared state handed to every axum handler. Grounded on
//! `mapleaiorg-maple`'s `palm-daemon` `AppState`/`api::rest::state` pattern
//! (the only axum precedent in the retrieval pack).

use std::path::PathBuf;
use std::sync::Arc;

use crate::auth::ApiKeyManager;
use crate::config::SharedConfigManager;
use crate::delegation::DelegationManager;
use crate::gateway::LlmGateway;
use crate::metrics::Metrics;
use crate::registry::ModuleRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfigManager,
    pub api_keys: Arc<ApiKeyManager>,
    pub modules: Arc<ModuleRegistry>,
    pub delegation: Arc<DelegationManager>,
    pub metrics: Arc<Metrics>,
    pub gateway: Arc<LlmGateway>,
    pub modules_dir: PathBuf,
}
