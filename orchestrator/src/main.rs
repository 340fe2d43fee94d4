//! Orchestrator daemon entry point.
//!
//! Loads `AppConfig` from the environment, wires the routing config manager,
//! provider gateway, module registry, auth, and delegation manager into one
//! `AppState`, and serves the admin HTTP surface + `Query`/`GetMetrics`
//! control RPCs over axum.

use anyhow::{Context, Result};
use orchestrator::config::{AppConfig, ConfigManager};
use orchestrator::delegation::DelegationManager;
use orchestrator::gateway::{build_routing_policy, HttpProvider, LlmGateway, ModelInfo};
use orchestrator::http::{self, AppState};
use orchestrator::metrics::Metrics;
use orchestrator::registry::ModuleRegistry;
use orchestrator::store;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env().context("loading AppConfig from environment")?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config.log_filter.clone()))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("starting orchestrator");

    std::fs::create_dir_all(&config.data_dir).context("creating data directory")?;

    let conn = store::open(&config.sqlite_path).context("opening sqlite database")?;
    store::init_schema(&conn).context("initializing sqlite schema")?;
    drop(conn);

    let routing_config = ConfigManager::new(config.routing_config_path.clone())
        .context("loading routing config")?
        .shared();

    if config.providers.is_empty() {
        tracing::warn!("no providers configured ({{PROVIDER}}_API_KEY env vars unset) — every gateway lane will be empty");
    }

    let policy = build_routing_policy(&routing_config.get_config(), &config.providers);
    let mut gateway = LlmGateway::new(policy);
    for provider in &config.providers {
        tracing::info!(provider = %provider.name, base_url = %provider.base_url, "registering provider");
        gateway.register_provider(
            provider.name.clone(),
            Box::new(HttpProvider::new(
                provider.name.as_str(),
                provider.base_url.as_str(),
                provider.api_key.as_str(),
                Vec::<ModelInfo>::new(),
            )),
        );
    }
    let gateway = Arc::new(gateway);

    std::fs::create_dir_all(&config.modules_dir).context("creating modules directory")?;

    let api_keys = Arc::new(orchestrator::auth::ApiKeyManager::new(&config.sqlite_path));
    let modules = Arc::new(ModuleRegistry::new(&config.sqlite_path));
    let delegation = Arc::new(DelegationManager::new(gateway.clone(), routing_config.clone()));
    let metrics = Arc::new(Metrics::new());

    let state = AppState {
        config: routing_config,
        api_keys,
        modules,
        delegation,
        metrics,
        gateway,
        modules_dir: config.modules_dir.clone(),
    };

    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.http_bind_addr.as_str())
        .await
        .with_context(|| format!("binding {}", config.http_bind_addr))?;
    tracing::info!(addr = %config.http_bind_addr, "listening");

    axum::serve(listener, router).await.context("serving admin http")?;

    Ok(())
}
