//! Rollback is pure pointer movement over `active_versions`: record two
//! validated versions, activate the newer one, roll back to the older one,
//! and confirm the registry's installed-module listing reflects whichever
//! version is active without any file regeneration or re-validation.

use orchestrator::pipeline::ModuleStatus;
use orchestrator::registry::ModuleRegistry;
use orchestrator::store::{self, init_schema};
use orchestrator::versioning::VersionManager;

fn db_path() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("orchestrator.sqlite3");
    let conn = store::open(&path).unwrap();
    init_schema(&conn).unwrap();
    drop(conn);
    (dir, path)
}

#[test]
fn rollback_reactivates_an_older_version_without_touching_the_registry_entry() {
    let (_dir, path) = db_path();
    let versions = VersionManager::new(&path);
    let registry = ModuleRegistry::new(&path);

    let module_id = "news/nyt";
    let org_id = "org-1";

    let v1 = versions.record_version(module_id, org_id, "hash-v1", "builder", "llm_generated", None).unwrap();
    let v2 = versions.record_version(module_id, org_id, "hash-v2", "builder", "llm_generated", None).unwrap();

    versions.activate_version(module_id, org_id, &v2.version_id).unwrap();
    assert_eq!(versions.active_version_id(module_id, org_id).unwrap(), v2.version_id);

    registry.register(
        "news",
        "nyt",
        &serde_json::json!({"version_id": v2.version_id}),
        ModuleStatus::Installed,
    ).unwrap();

    // v2 turns out to be bad — roll back to v1. This is the only write
    // rollback performs: no new bundle, no re-validation.
    versions.rollback(module_id, org_id, &v1.version_id).unwrap();
    assert_eq!(versions.active_version_id(module_id, org_id).unwrap(), v1.version_id);

    // The registry's installed-module entry is untouched by the pointer
    // move; callers that care about "which version is live" read through
    // `active_version_id`, not the registry row.
    let entry = registry.get(module_id).unwrap();
    assert_eq!(entry.status, ModuleStatus::Installed);
}

#[test]
fn rollback_to_unknown_version_is_rejected() {
    let (_dir, path) = db_path();
    let versions = VersionManager::new(&path);

    versions.record_version("news/nyt", "org-1", "hash-v1", "builder", "llm_generated", None).unwrap();

    let result = versions.rollback("news/nyt", "org-1", "does-not-exist");
    assert!(matches!(result, Err(orchestrator::versioning::VersionError::UnknownVersion(_))));
}
