//! Table definitions for every persisted entity in the specification's
//! persistence layer (§4.9). `init_schema` is idempotent (`CREATE TABLE IF
//! NOT EXISTS`) so it can run at process startup against an existing
//! database without disturbing data.

use rusqlite::Connection;

use super::StoreResult;

pub fn init_schema(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS organizations (
            org_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            role TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS api_keys (
            key_id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            role TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            status TEXT NOT NULL,
            grace_until TEXT,
            created_at TEXT NOT NULL,
            last_used_at TEXT
        );

        CREATE TABLE IF NOT EXISTS usage_records (
            usage_id TEXT PRIMARY KEY,
            org_id TEXT NOT NULL,
            job_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            prompt_tokens INTEGER NOT NULL,
            completion_tokens INTEGER NOT NULL,
            total_tokens INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS module_versions (
            version_id TEXT PRIMARY KEY,
            module_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            bundle_sha256 TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL,
            source TEXT NOT NULL,
            validation_report_json TEXT,
            metadata_json TEXT
        );

        CREATE TABLE IF NOT EXISTS active_versions (
            module_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            version_id TEXT NOT NULL,
            PRIMARY KEY (module_id, org_id)
        );

        CREATE TABLE IF NOT EXISTS module_credentials (
            module_id TEXT PRIMARY KEY,
            ciphertext BLOB NOT NULL,
            nonce BLOB NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS module_registry (
            module_id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            platform TEXT NOT NULL,
            manifest_json TEXT NOT NULL,
            status TEXT NOT NULL,
            installed_at TEXT
        );

        CREATE TABLE IF NOT EXISTS intent_classes (
            intent_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            description TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS module_sets (
            set_id TEXT PRIMARY KEY,
            intent_id TEXT NOT NULL,
            module_ids_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS policy_checkpoints (
            checkpoint_id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            policy_json TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS trajectory_log (
            trajectory_id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            step INTEGER NOT NULL,
            action_json TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS reward_events (
            event_id TEXT PRIMARY KEY,
            trajectory_id TEXT NOT NULL,
            reward REAL NOT NULL,
            recorded_at TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}
