//! Top-level `AppConfig`: layers compiled-in defaults, the on-disk routing
//! config (§6), and environment-variable overrides into one typed struct
//! constructed once at startup and threaded explicitly into constructors —
//! per §9's guidance against mutable globals and the teacher's own
//! environment-variable-driven configuration style.

use std::path::PathBuf;

use super::{ConfigError, ConfigResult};

/// One provider credential/endpoint pair, sourced from environment
/// variables named `{PROVIDER}_API_KEY` / `{PROVIDER}_BASE_URL`.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub sqlite_path: PathBuf,
    pub routing_config_path: PathBuf,
    /// Root directory new modules are scaffolded into and installed
    /// modules live under, as `{modules_dir}/{category}/{platform}`.
    /// Mirrors the original's `MODULES_DIR`.
    pub modules_dir: PathBuf,
    pub http_bind_addr: String,
    pub log_filter: String,
    pub providers: Vec<ProviderConfig>,
    /// Raw 32-byte key for `registry::EncryptionKey`, if supplied. When
    /// absent, the caller generates a fresh key and credentials will not
    /// survive a process restart — acceptable for a first boot, but callers
    /// should log a warning and persist the generated key themselves.
    pub credential_encryption_key: Option<[u8; 32]>,
    pub sandbox_max_cpu_seconds: Option<u64>,
    pub sandbox_max_memory_bytes: Option<u64>,
    pub sandbox_max_wall_seconds: Option<u64>,
}

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_HTTP_BIND_ADDR: &str = "0.0.0.0:8088";
const DEFAULT_LOG_FILTER: &str = "info";

impl AppConfig {
    /// Compiled-in defaults, overridden by whatever the environment sets.
    /// The on-disk routing config itself is loaded separately by
    /// `ConfigManager::new(routing_config_path)` — this struct only carries
    /// the *path* to it, since the manager owns its own read/write/reload
    /// lifecycle.
    pub fn from_env() -> ConfigResult<Self> {
        let data_dir = env_path("ORCHESTRATOR_DATA_DIR").unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let sqlite_path = env_path("ORCHESTRATOR_SQLITE_PATH").unwrap_or_else(|| data_dir.join("orchestrator.sqlite3"));
        let routing_config_path =
            env_path("ORCHESTRATOR_ROUTING_CONFIG_PATH").unwrap_or_else(|| data_dir.join("routing_config.json"));
        let modules_dir = env_path("ORCHESTRATOR_MODULES_DIR").unwrap_or_else(|| data_dir.join("modules"));
        let http_bind_addr = std::env::var("ORCHESTRATOR_HTTP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_HTTP_BIND_ADDR.to_string());
        let log_filter = std::env::var("ORCHESTRATOR_LOG_FILTER").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());

        let providers = load_providers_from_env();

        let credential_encryption_key = match std::env::var("ORCHESTRATOR_CREDENTIAL_KEY") {
            Ok(hex_key) => Some(decode_key(&hex_key)?),
            Err(_) => None,
        };

        Ok(Self {
            data_dir,
            sqlite_path,
            routing_config_path,
            modules_dir,
            http_bind_addr,
            log_filter,
            providers,
            credential_encryption_key,
            sandbox_max_cpu_seconds: env_u64("ORCHESTRATOR_SANDBOX_MAX_CPU_SECONDS"),
            sandbox_max_memory_bytes: env_u64("ORCHESTRATOR_SANDBOX_MAX_MEMORY_BYTES"),
            sandbox_max_wall_seconds: env_u64("ORCHESTRATOR_SANDBOX_MAX_WALL_SECONDS"),
        })
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key).ok().map(PathBuf::from)
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn decode_key(hex_key: &str) -> ConfigResult<[u8; 32]> {
    let bytes = hex::decode(hex_key).map_err(|e| ConfigError::InvalidCredentialKey(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ConfigError::InvalidCredentialKey("must decode to exactly 32 bytes".to_string()));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Known provider name prefixes. Each present `{PREFIX}_API_KEY` env var
/// registers one provider; `{PREFIX}_BASE_URL` overrides its default
/// endpoint. Mirrors `shared/providers/config.py`'s per-provider env lookup.
const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("OPENAI", "https://api.openai.com/v1"),
    ("ANTHROPIC", "https://api.anthropic.com/v1"),
    ("GITHUB_MODELS", "https://models.inference.ai.azure.com"),
    ("PERPLEXITY", "https://api.perplexity.ai"),
];

fn load_providers_from_env() -> Vec<ProviderConfig> {
    KNOWN_PROVIDERS
        .iter()
        .filter_map(|(prefix, default_base_url)| {
            let api_key = std::env::var(format!("{prefix}_API_KEY")).ok()?;
            let base_url = std::env::var(format!("{prefix}_BASE_URL")).unwrap_or_else(|_| default_base_url.to_string());
            Some(ProviderConfig { name: prefix.to_lowercase(), base_url, api_key })
        })
        .collect()
}
