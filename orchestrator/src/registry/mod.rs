//! Module Registry & Credentials: tracks installed modules' lifecycle state
//! and stores their per-module API credentials encrypted at rest. Grounded
//! on spec §4.9's `module_registry`/`module_credentials` schemas.

mod credentials;

pub use credentials::{CredentialStore, EncryptionKey};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::ModuleStatus;
use crate::store;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("module '{0}' not registered")]
    NotFound(String),
    #[error("credential encryption failed")]
    Encryption,
    #[error("credential decryption failed: ciphertext may be corrupt or the key has changed")]
    Decryption,
}

pub type RegistryResult<T> = Result<T, RegistryError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub module_id: String,
    pub category: String,
    pub platform: String,
    pub manifest: serde_json::Value,
    pub status: ModuleStatus,
    pub installed_at: DateTime<Utc>,
}

/// Tracks which modules are installed and their current lifecycle status.
/// Backed by the `module_registry` table; manifest bytes are stored
/// denormalized (as JSON) alongside the row so a registry listing doesn't
/// require reading every module's `manifest.json` off disk.
pub struct ModuleRegistry {
    db_path: std::path::PathBuf,
}

impl ModuleRegistry {
    pub fn new(db_path: impl Into<std::path::PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    pub fn register(&self, category: &str, platform: &str, manifest: &serde_json::Value, status: ModuleStatus) -> RegistryResult<RegistryEntry> {
        let module_id = format!("{category}/{platform}");
        let entry = RegistryEntry {
            module_id: module_id.clone(),
            category: category.to_string(),
            platform: platform.to_string(),
            manifest: manifest.clone(),
            status,
            installed_at: Utc::now(),
        };

        let conn = store::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO module_registry (module_id, category, platform, manifest_json, status, installed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(module_id) DO UPDATE SET manifest_json = excluded.manifest_json, status = excluded.status",
            rusqlite::params![
                entry.module_id,
                entry.category,
                entry.platform,
                serde_json::to_string(&entry.manifest)?,
                status_to_str(entry.status),
                entry.installed_at.to_rfc3339(),
            ],
        )?;
        Ok(entry)
    }

    pub fn set_status(&self, module_id: &str, status: ModuleStatus) -> RegistryResult<()> {
        let conn = store::open(&self.db_path)?;
        let updated = conn.execute(
            "UPDATE module_registry SET status = ?1 WHERE module_id = ?2",
            rusqlite::params![status_to_str(status), module_id],
        )?;
        if updated == 0 {
            return Err(RegistryError::NotFound(module_id.to_string()));
        }
        Ok(())
    }

    pub fn get(&self, module_id: &str) -> RegistryResult<RegistryEntry> {
        let conn = store::open(&self.db_path)?;
        conn.query_row(
            "SELECT module_id, category, platform, manifest_json, status, installed_at FROM module_registry WHERE module_id = ?1",
            rusqlite::params![module_id],
            row_to_entry,
        )
        .map_err(|_| RegistryError::NotFound(module_id.to_string()))
    }

    pub fn list(&self) -> RegistryResult<Vec<RegistryEntry>> {
        let conn = store::open(&self.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT module_id, category, platform, manifest_json, status, installed_at FROM module_registry ORDER BY module_id",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn remove(&self, module_id: &str) -> RegistryResult<()> {
        let conn = store::open(&self.db_path)?;
        let deleted = conn.execute("DELETE FROM module_registry WHERE module_id = ?1", rusqlite::params![module_id])?;
        if deleted == 0 {
            return Err(RegistryError::NotFound(module_id.to_string()));
        }
        Ok(())
    }

    /// Bump `installed_at` to now without changing status or manifest —
    /// backs the admin surface's `reload` action for a module that didn't
    /// change but whose in-process state (e.g. a cached client) should be
    /// treated as freshly loaded.
    pub fn touch(&self, module_id: &str) -> RegistryResult<()> {
        let conn = store::open(&self.db_path)?;
        let updated = conn.execute(
            "UPDATE module_registry SET installed_at = ?1 WHERE module_id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), module_id],
        )?;
        if updated == 0 {
            return Err(RegistryError::NotFound(module_id.to_string()));
        }
        Ok(())
    }
}

fn status_to_str(status: ModuleStatus) -> &'static str {
    match status {
        ModuleStatus::Pending => "pending",
        ModuleStatus::Validating => "validating",
        ModuleStatus::Validated => "validated",
        ModuleStatus::Approved => "approved",
        ModuleStatus::Installed => "installed",
        ModuleStatus::Disabled => "disabled",
        ModuleStatus::Failed => "failed",
        ModuleStatus::Uninstalled => "uninstalled",
    }
}

fn status_from_str(s: &str) -> ModuleStatus {
    match s {
        "validating" => ModuleStatus::Validating,
        "validated" => ModuleStatus::Validated,
        "approved" => ModuleStatus::Approved,
        "installed" => ModuleStatus::Installed,
        "disabled" => ModuleStatus::Disabled,
        "failed" => ModuleStatus::Failed,
        "uninstalled" => ModuleStatus::Uninstalled,
        _ => ModuleStatus::Pending,
    }
}

fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<RegistryEntry> {
    let manifest_json: String = row.get(3)?;
    let status: String = row.get(4)?;
    let installed_at: String = row.get(5)?;
    Ok(RegistryEntry {
        module_id: row.get(0)?,
        category: row.get(1)?,
        platform: row.get(2)?,
        manifest: serde_json::from_str(&manifest_json).unwrap_or(serde_json::Value::Null),
        status: status_from_str(&status),
        installed_at: DateTime::parse_from_rfc3339(&installed_at).unwrap().with_timezone(&Utc),
    })
}
