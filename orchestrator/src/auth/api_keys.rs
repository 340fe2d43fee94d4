//! API key lifecycle: creation, validation, rotation with a grace window,
//! and revocation. Raw key material is returned to the caller exactly once
//! and never persisted — only its SHA-256 hash is stored.

use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::store;

use super::rbac::Role;
use super::{AuthError, AuthResult};

const DEFAULT_GRACE_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyStatus {
    Active,
    RotationPending,
    Revoked,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub key_id: String,
    pub org_id: String,
    pub user_id: String,
    pub role: Role,
    pub key_hash: String,
    pub status: ApiKeyStatus,
    pub grace_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub struct ApiKeyManager {
    db_path: PathBuf,
}

fn generate_raw_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("sk-{}", hex::encode(bytes))
}

fn hash_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::Viewer => "viewer",
        Role::Operator => "operator",
        Role::Admin => "admin",
        Role::Owner => "owner",
    }
}

fn role_from_str(s: &str) -> Role {
    match s {
        "operator" => Role::Operator,
        "admin" => Role::Admin,
        "owner" => Role::Owner,
        _ => Role::Viewer,
    }
}

fn status_to_str(status: ApiKeyStatus) -> &'static str {
    match status {
        ApiKeyStatus::Active => "active",
        ApiKeyStatus::RotationPending => "rotation_pending",
        ApiKeyStatus::Revoked => "revoked",
    }
}

fn status_from_str(s: &str) -> ApiKeyStatus {
    match s {
        "rotation_pending" => ApiKeyStatus::RotationPending,
        "revoked" => ApiKeyStatus::Revoked,
        _ => ApiKeyStatus::Active,
    }
}

impl ApiKeyManager {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    /// Returns `(raw_key, record)`. `raw_key` is shown to the caller once;
    /// only `record.key_hash` is ever persisted.
    pub fn create_key(&self, org_id: &str, user_id: &str, role: Role) -> AuthResult<(String, ApiKeyRecord)> {
        let raw_key = generate_raw_key();
        let record = ApiKeyRecord {
            key_id: Uuid::new_v4().to_string(),
            org_id: org_id.to_string(),
            user_id: user_id.to_string(),
            role,
            key_hash: hash_key(&raw_key),
            status: ApiKeyStatus::Active,
            grace_until: None,
            created_at: Utc::now(),
            last_used_at: None,
        };

        let conn = store::open(&self.db_path)?;
        conn.execute(
            "INSERT INTO api_keys (key_id, org_id, user_id, role, key_hash, status, grace_until, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
                record.key_id,
                record.org_id,
                record.user_id,
                role_to_str(record.role),
                record.key_hash,
                status_to_str(record.status),
                record.grace_until.map(|t| t.to_rfc3339()),
                record.created_at.to_rfc3339(),
                record.last_used_at.map(|t| t.to_rfc3339()),
            ],
        )?;

        Ok((raw_key, record))
    }

    /// Hash the presented key and look it up. Active keys always validate;
    /// rotation_pending keys validate until `grace_until`; revoked and
    /// expired rotation_pending keys never do.
    pub fn validate_key(&self, raw_key: &str) -> AuthResult<Option<ApiKeyRecord>> {
        let hash = hash_key(raw_key);
        let conn = store::open(&self.db_path)?;
        let record = conn
            .query_row(
                "SELECT key_id, org_id, user_id, role, key_hash, status, grace_until, created_at, last_used_at
                 FROM api_keys WHERE key_hash = ?1",
                rusqlite::params![hash],
                row_to_record,
            )
            .ok();

        let Some(record) = record else { return Ok(None) };

        let valid = match record.status {
            ApiKeyStatus::Active => true,
            ApiKeyStatus::RotationPending => record.grace_until.is_some_and(|until| Utc::now() <= until),
            ApiKeyStatus::Revoked => false,
        };

        if !valid {
            return Ok(None);
        }

        conn.execute(
            "UPDATE api_keys SET last_used_at = ?1 WHERE key_id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), record.key_id],
        )?;

        Ok(Some(record))
    }

    /// Issue a new active key for the same identity, mark the old record
    /// `rotation_pending` with a fresh grace window, so both validate
    /// during the grace period.
    pub fn rotate_key(&self, key_id: &str) -> AuthResult<String> {
        let conn = store::open(&self.db_path)?;
        let (org_id, user_id, role_str): (String, String, String) = conn
            .query_row(
                "SELECT org_id, user_id, role FROM api_keys WHERE key_id = ?1",
                rusqlite::params![key_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|_| AuthError::KeyNotFound)?;

        let grace_until = Utc::now() + Duration::days(DEFAULT_GRACE_DAYS);
        conn.execute(
            "UPDATE api_keys SET status = 'rotation_pending', grace_until = ?1 WHERE key_id = ?2",
            rusqlite::params![grace_until.to_rfc3339(), key_id],
        )?;

        let raw_key = generate_raw_key();
        let new_key_id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO api_keys (key_id, org_id, user_id, role, key_hash, status, grace_until, created_at, last_used_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'active', NULL, ?6, NULL)",
            rusqlite::params![
                new_key_id,
                org_id,
                user_id,
                role_str,
                hash_key(&raw_key),
                Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(raw_key)
    }

    pub fn revoke_key(&self, key_id: &str) -> AuthResult<()> {
        let conn = store::open(&self.db_path)?;
        conn.execute("UPDATE api_keys SET status = 'revoked' WHERE key_id = ?1", rusqlite::params![key_id])?;
        Ok(())
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<ApiKeyRecord> {
    let grace_until: Option<String> = row.get(6)?;
    let last_used_at: Option<String> = row.get(8)?;
    let created_at: String = row.get(7)?;
    let role: String = row.get(3)?;
    let status: String = row.get(5)?;

    Ok(ApiKeyRecord {
        key_id: row.get(0)?,
        org_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role_from_str(&role),
        key_hash: row.get(4)?,
        status: status_from_str(&status),
        grace_until: grace_until.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
        created_at: DateTime::parse_from_rfc3339(&created_at).unwrap().with_timezone(&Utc),
        last_used_at: last_used_at.map(|s| DateTime::parse_from_rfc3339(&s).unwrap().with_timezone(&Utc)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::init_schema;

    fn manager() -> (tempfile::TempDir, ApiKeyManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auth.sqlite3");
        let conn = store::open(&path).unwrap();
        init_schema(&conn).unwrap();
        drop(conn);
        (dir, ApiKeyManager::new(path))
    }

    #[test]
    fn created_key_validates() {
        let (_dir, manager) = manager();
        let (raw_key, record) = manager.create_key("org-1", "user-1", Role::Operator).unwrap();
        let validated = manager.validate_key(&raw_key).unwrap().unwrap();
        assert_eq!(validated.key_id, record.key_id);
        assert_eq!(validated.role, Role::Operator);
    }

    #[test]
    fn revoked_key_never_validates() {
        let (_dir, manager) = manager();
        let (raw_key, record) = manager.create_key("org-1", "user-1", Role::Viewer).unwrap();
        manager.revoke_key(&record.key_id).unwrap();
        assert!(manager.validate_key(&raw_key).unwrap().is_none());
    }

    #[test]
    fn rotation_keeps_both_keys_valid_during_grace_window() {
        let (_dir, manager) = manager();
        let (old_raw, record) = manager.create_key("org-1", "user-1", Role::Admin).unwrap();
        let new_raw = manager.rotate_key(&record.key_id).unwrap();

        assert!(manager.validate_key(&old_raw).unwrap().is_some());
        assert!(manager.validate_key(&new_raw).unwrap().is_some());
    }

    #[test]
    fn unknown_key_returns_none_not_error() {
        let (_dir, manager) = manager();
        assert!(manager.validate_key("sk-nonexistent").unwrap().is_none());
    }
}
