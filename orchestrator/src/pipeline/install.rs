//! Install admission guard: a module only installs when its manifest is
//! validated, the freshly recomputed bundle hash matches the recorded
//! attestation, and the attestation itself says VALIDATED. Rejections are
//! structured and appended to `install_rejections.jsonl`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::artifact::{bundle_hash, ArtifactIndex};
use crate::audit::{append_install_entry, InstallAuditEntry};

use super::manifest::{AuthType, ModuleManifest, ModuleStatus};
use super::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallRejectionReason {
    NotValidated,
    FailedValidation,
    HashMismatch,
    MissingAttestationHash,
}

impl InstallRejectionReason {
    pub fn code(self) -> &'static str {
        match self {
            InstallRejectionReason::NotValidated => "not_validated",
            InstallRejectionReason::FailedValidation => "failed_validation",
            InstallRejectionReason::HashMismatch => "hash_mismatch",
            InstallRejectionReason::MissingAttestationHash => "missing_attestation_hash",
        }
    }
}

/// An attestation of a validated build: the status the validator assigned
/// and the bundle hash it validated against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallAttestation {
    pub status: String,
    pub bundle_sha256: Option<String>,
}

/// Recompute the bundle hash from `files`, compare it against the
/// attestation, and confirm both the manifest and attestation agree the
/// module validated — installing only when all three hold.
pub fn install_module(
    manifest: &mut ModuleManifest,
    attestation: &InstallAttestation,
    files: &BTreeMap<String, Vec<u8>>,
    rejections_log: &Path,
) -> Result<(), PipelineError> {
    let recomputed = bundle_hash(files);

    let rejection = if manifest.status != ModuleStatus::Validated {
        Some(InstallRejectionReason::NotValidated)
    } else if attestation.status != "VALIDATED" {
        Some(InstallRejectionReason::FailedValidation)
    } else {
        match &attestation.bundle_sha256 {
            None => Some(InstallRejectionReason::MissingAttestationHash),
            Some(hash) if *hash != recomputed => Some(InstallRejectionReason::HashMismatch),
            Some(_) => None,
        }
    };

    if let Some(reason) = rejection {
        append_install_entry(
            rejections_log,
            &InstallAuditEntry {
                timestamp: chrono::Utc::now(),
                module_id: manifest.module_id(),
                action: "install_rejected".to_string(),
                bundle_sha256: recomputed,
                reason: Some(reason.code().to_string()),
            },
        )?;
        return Err(PipelineError::InstallRejected { reason: reason.code().to_string() });
    }

    manifest.status = ModuleStatus::Installed;
    Ok(())
}

/// Self-check a freshly built `ArtifactIndex` against the files it claims to
/// describe, independent of the install admission guard above — used by the
/// validate stage before handing an attestation to `install_module`.
pub fn attest_from_index(index: &ArtifactIndex, files: &BTreeMap<String, Vec<u8>>) -> InstallAttestation {
    let matches = bundle_hash(files) == index.bundle_sha256;
    InstallAttestation {
        status: if matches { "VALIDATED".to_string() } else { "FAILED".to_string() },
        bundle_sha256: Some(index.bundle_sha256.clone()),
    }
}
