//! Hot-reloadable config manager: atomic file persistence, observer fan-out.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use super::routing::RoutingConfig;
use super::{ConfigError, ConfigResult};

/// An observer callback invoked, outside the config lock, on every update.
/// `Arc` (not `Box`) so the observer list can be cloned cheaply under the
/// lock and then iterated after the lock is released.
pub type ConfigObserver = Arc<dyn Fn(&RoutingConfig) + Send + Sync>;

pub type SharedConfigManager = Arc<ConfigManager>;

struct Inner {
    config: RoutingConfig,
    observers: Vec<ConfigObserver>,
}

/// Owns the on-disk routing config, a single in-memory snapshot, and the
/// observer list. All three are behind one `Mutex` so `update_config` and
/// `reload` can't interleave, but observers are always run after the lock
/// is released — a re-entrant observer calling back into `get_config` or
/// `register_observer` will not deadlock.
pub struct ConfigManager {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl ConfigManager {
    /// Load `path` if it exists, otherwise start from `RoutingConfig::default()`
    /// and persist it immediately so subsequent reloads see a consistent file.
    pub fn new(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let config = if path.exists() {
            Self::read_from_disk(&path)?
        } else {
            let config = RoutingConfig::default();
            Self::write_to_disk(&path, &config)?;
            config
        };

        Ok(Self {
            path,
            inner: Mutex::new(Inner {
                config,
                observers: Vec::new(),
            }),
        })
    }

    pub fn shared(self) -> SharedConfigManager {
        Arc::new(self)
    }

    /// Return a snapshot of the current config.
    pub fn get_config(&self) -> RoutingConfig {
        self.inner.lock().expect("config lock poisoned").config.clone()
    }

    /// Replace the config wholesale, persist it, and notify observers.
    pub fn update_config(&self, config: RoutingConfig) -> ConfigResult<()> {
        Self::write_to_disk(&self.path, &config)?;
        self.apply_and_notify(config);
        Ok(())
    }

    /// Upsert a single category, persist, and notify observers.
    pub fn upsert_category(
        &self,
        name: &str,
        routing: super::routing::CategoryRouting,
    ) -> ConfigResult<()> {
        let mut config = self.get_config();
        config.categories.insert(name.to_string(), routing);
        self.update_config(config)
    }

    /// Remove a category; errors if it didn't exist.
    pub fn remove_category(&self, name: &str) -> ConfigResult<()> {
        let mut config = self.get_config();
        if config.categories.remove(name).is_none() {
            return Err(ConfigError::UnknownCategory(name.to_string()));
        }
        self.update_config(config)
    }

    /// Re-read the file from disk, replacing the in-memory snapshot.
    pub fn reload(&self) -> ConfigResult<usize> {
        let config = Self::read_from_disk(&self.path)?;
        let count = config.categories.len();
        self.apply_and_notify(config);
        Ok(count)
    }

    /// Register an observer; observers run in registration order.
    pub fn register_observer(&self, observer: ConfigObserver) {
        self.inner
            .lock()
            .expect("config lock poisoned")
            .observers
            .push(observer);
    }

    fn apply_and_notify(&self, config: RoutingConfig) {
        // Snapshot the config and the observer list under the lock, then
        // drop the guard before invoking anything: an observer that calls
        // back into `get_config` or `register_observer` can't deadlock.
        let (config, observers) = {
            let mut inner = self.inner.lock().expect("config lock poisoned");
            inner.config = config;
            (inner.config.clone(), inner.observers.clone())
        };

        for (i, observer) in observers.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                observer(&config);
            }));
            if result.is_err() {
                warn!(observer_index = i, "config observer panicked, continuing");
            } else {
                debug!(observer_index = i, "config observer notified");
            }
        }
        info!(categories = config.categories.len(), "routing config updated");
    }

    fn read_from_disk(path: &Path) -> ConfigResult<RoutingConfig> {
        let data = fs::read_to_string(path).map_err(ConfigError::Read)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Atomic write: serialize to a temp file in the same directory, then
    /// rename over the target. Rename is atomic on the same filesystem, so a
    /// reader never observes a partially written file.
    fn write_to_disk(path: &Path, config: &RoutingConfig) -> ConfigResult<()> {
        let data = serde_json::to_string_pretty(config)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(ConfigError::Write)?;
        let tmp_path = dir.join(format!(
            ".{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("routing_config")
        ));
        fs::write(&tmp_path, data).map_err(ConfigError::Write)?;
        fs::rename(&tmp_path, path).map_err(ConfigError::Write)?;
        Ok(())
    }
}
