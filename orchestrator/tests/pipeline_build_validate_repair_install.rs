//! Write → validate → repair → install, chained end to end: a generator
//! that fails once on a missing method, repairs on the second attempt,
//! validates, and installs only once the bundle hash the validator
//! attested against matches the files actually on disk. Scaffold and the
//! real LLM-backed write step are exercised separately in
//! `pipeline::scaffold`/`pipeline::writecode`'s own tests and in
//! `pipeline::run_build_pipeline`'s; this test starts from already-written
//! adapter source to keep the repair/install interaction under test on its
//! own.

use std::collections::BTreeMap;

use orchestrator::artifact::bundle_hash;
use orchestrator::audit::BuildAuditLog;
use orchestrator::pipeline::{
    attest_from_index, install_module, run_repair_loop, AuthType, InstallAttestation, ModuleManifest, ModuleStatus, RepairOutcome,
};

const BROKEN_ADAPTER: &str = "fn fetch_raw() -> String { String::new() }";
const FIXED_ADAPTER: &str = r#"
    #[register_adapter]
    fn fetch_raw() -> String { String::new() }
    fn transform(raw: String) -> String { raw }
    fn get_schema() -> String { String::new() }
"#;

#[tokio::test]
async fn repairs_once_then_installs_with_matching_attestation() {
    let mut manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);

    let modules_root = tempfile::tempdir().unwrap();
    let mut log = BuildAuditLog::new("job-build-validate-repair-install");
    let outcome = run_repair_loop(
        &mut log,
        |attempt| format!("hash-{attempt}"),
        |attempt, _prev| async move {
            if attempt == 1 { (BROKEN_ADAPTER.to_string(), None) } else { (FIXED_ADAPTER.to_string(), None) }
        },
        &manifest,
        modules_root.path(),
    )
    .await;
    assert_eq!(outcome, RepairOutcome::Validated { attempts: 2 });
    assert_eq!(log.attempts.len(), 2);

    manifest.status = ModuleStatus::Validated;

    let files: BTreeMap<String, Vec<u8>> = BTreeMap::from([("adapter.rs".to_string(), FIXED_ADAPTER.as_bytes().to_vec())]);
    let attestation = InstallAttestation { status: "VALIDATED".to_string(), bundle_sha256: Some(bundle_hash(&files)) };

    let dir = tempfile::tempdir().unwrap();
    let rejections_log = dir.path().join("install_rejections.jsonl");
    install_module(&mut manifest, &attestation, &files, &rejections_log).unwrap();

    assert_eq!(manifest.status, ModuleStatus::Installed);
    assert!(!rejections_log.exists());
}

#[tokio::test]
async fn thrashing_short_circuits_before_install_is_ever_attempted() {
    let manifest = ModuleManifest::new("nyt", "news", "nyt", AuthType::None);
    let modules_root = tempfile::tempdir().unwrap();
    let mut log = BuildAuditLog::new("job-thrash");
    let outcome = run_repair_loop(
        &mut log,
        |attempt| format!("hash-{attempt}"),
        |_attempt, _prev| async { (BROKEN_ADAPTER.to_string(), None) },
        &manifest,
        modules_root.path(),
    )
    .await;

    match outcome {
        RepairOutcome::Thrashing { attempts, last_report } => {
            assert_eq!(attempts, 2);
            // A thrashing report never reaches `Validated`, so `install_module`
            // would reject it on the manifest-status check alone.
            assert_ne!(last_report.status, orchestrator::pipeline::ValidationStatus::Validated);
        }
        other => panic!("expected thrashing, got {other:?}"),
    }
}

#[test]
fn attest_from_index_flags_tamper_before_install_guard_sees_it() {
    use orchestrator::artifact::ArtifactBundleBuilder;

    let files: BTreeMap<String, Vec<u8>> = BTreeMap::from([("adapter.rs".to_string(), b"fn main() {}".to_vec())]);
    let index = ArtifactBundleBuilder::build_from_dict(&files, "job-1", "attempt-1", "news/nyt", "validate", chrono::Utc::now());

    let on_disk: BTreeMap<String, Vec<u8>> = BTreeMap::from([("adapter.rs".to_string(), b"fn main() { /* tampered */ }".to_vec())]);
    let attestation = attest_from_index(&index, &on_disk);

    assert_eq!(attestation.status, "FAILED");
}
