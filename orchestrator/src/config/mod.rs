//! Routing configuration, capability map, and the hot-reloadable config manager.
//!
//! Mirrors the observer pattern used elsewhere in this crate's ancestry: the
//! observer list is snapshotted under lock, then each observer is invoked
//! outside the lock so a reloading observer can't deadlock against the
//! config manager it's reacting to.

mod app;
mod capability;
mod manager;
mod routing;

pub use app::{AppConfig, ProviderConfig};
pub use capability::{CapabilityMap, Tier};
pub use manager::{ConfigManager, ConfigObserver, SharedConfigManager};
pub use routing::{
    CategoryRouting, PerformanceConstraints, RoutingConfig, TierConfig,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[source] std::io::Error),

    #[error("failed to write config file: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to parse config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("invalid credential encryption key: {0}")]
    InvalidCredentialKey(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
