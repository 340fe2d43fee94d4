//! Version tracking: every validated build becomes an immutable
//! `ModuleVersion` row; rollback is pure pointer movement over
//! `active_versions`, never file regeneration. Grounded on spec §3/§4.5 and
//! `original_source`'s `versioning.py` concept of one active pointer per
//! (module_id, org_id).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("no version found for module '{0}' in org '{1}'")]
    NoActiveVersion(String, String),
    #[error("version '{0}' does not exist")]
    UnknownVersion(String),
}

pub type VersionResult<T> = Result<T, VersionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ModuleVersionStatus {
    Validated,
    Active,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub version_id: String,
    pub module_id: String,
    pub org_id: String,
    pub bundle_sha256: String,
    pub status: ModuleVersionStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub source: String,
    pub validation_report: Option<serde_json::Value>,
    pub metadata: serde_json::Value,
}

pub struct VersionManager {
    db_path: std::path::PathBuf,
}

impl VersionManager {
    pub fn new(db_path: impl Into<std::path::PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    /// Record a new version, VALIDATED, not yet active.
    pub fn record_version(
        &self,
        module_id: &str,
        org_id: &str,
        bundle_sha256: &str,
        created_by: &str,
        source: &str,
        validation_report: Option<serde_json::Value>,
    ) -> VersionResult<ModuleVersion> {
        let version = ModuleVersion {
            version_id: Uuid::new_v4().to_string(),
            module_id: module_id.to_string(),
            org_id: org_id.to_string(),
            bundle_sha256: bundle_sha256.to_string(),
            status: ModuleVersionStatus::Validated,
            created_at: Utc::now(),
            created_by: created_by.to_string(),
            source: source.to_string(),
            validation_report,
            metadata: serde_json::Value::Null,
        };

        let conn = store::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO module_versions (version_id, module_id, org_id, bundle_sha256, status, created_at, created_by, source, validation_report_json, metadata_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            rusqlite::params![
                version.version_id,
                version.module_id,
                version.org_id,
                version.bundle_sha256,
                "VALIDATED",
                version.created_at.to_rfc3339(),
                version.created_by,
                version.source,
                version.validation_report.as_ref().map(serde_json::to_string).transpose()?,
                serde_json::to_string(&version.metadata)?,
            ],
        )?;
        Ok(version)
    }

    /// Move the (module_id, org_id) active pointer to `version_id`. This is
    /// the only write rollback performs — no file regeneration, no
    /// re-validation, no new artifact bundle.
    pub fn activate_version(&self, module_id: &str, org_id: &str, version_id: &str) -> VersionResult<()> {
        let conn = store::open(&self.db_path)?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM module_versions WHERE version_id = ?1 AND module_id = ?2 AND org_id = ?3",
                rusqlite::params![version_id, module_id, org_id],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            return Err(VersionError::UnknownVersion(version_id.to_string()));
        }

        conn.execute(
            "INSERT INTO active_versions (module_id, org_id, version_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(module_id, org_id) DO UPDATE SET version_id = excluded.version_id",
            rusqlite::params![module_id, org_id, version_id],
        )?;
        Ok(())
    }

    pub fn active_version_id(&self, module_id: &str, org_id: &str) -> VersionResult<String> {
        let conn = store::open(&self.db_path)?;
        conn.query_row(
            "SELECT version_id FROM active_versions WHERE module_id = ?1 AND org_id = ?2",
            rusqlite::params![module_id, org_id],
            |row| row.get(0),
        )
        .map_err(|_| VersionError::NoActiveVersion(module_id.to_string(), org_id.to_string()))
    }

    /// Rollback: activate a previously recorded version. Pure pointer
    /// movement, identical to `activate_version` — kept as a distinct,
    /// intention-revealing entry point since callers reason about "rollback"
    /// differently from "promote a new build".
    pub fn rollback(&self, module_id: &str, org_id: &str, version_id: &str) -> VersionResult<()> {
        self.activate_version(module_id, org_id, version_id)
    }
}
