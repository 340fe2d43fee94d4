//! Bounded repair loop: write → validate → (on failure) repair, up to
//! `MAX_REPAIR_ATTEMPTS`, short-circuiting on a terminal failure or two
//! consecutive identical failure fingerprints (thrash).

use std::path::Path;

use serde::Serialize;

use crate::audit::{AttemptRecord, AttemptStage, AttemptStatus, BuildAuditLog, FailureFingerprint, FailureType};

use super::manifest::ModuleManifest;
use super::validation::{ValidationReport, ValidationStatus};

pub const MAX_REPAIR_ATTEMPTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RepairOutcome {
    Validated { attempts: u32 },
    ExhaustedAttempts { attempts: u32, last_report: ValidationReport },
    TerminalFailure { attempts: u32, failure_type: FailureType, last_report: ValidationReport },
    Thrashing { attempts: u32, last_report: ValidationReport },
}

/// Drive the write→validate→repair cycle. `attempt_source` is called with
/// the attempt number (1-based) and the previous report (`None` on the
/// first attempt) and returns a future resolving to the adapter source to
/// validate next; the caller closes over its own LLM repair call there (see
/// `pipeline::build::run_build_pipeline`, which closes over a real
/// `gateway.generate(Purpose::Repair, ...)` call).
pub async fn run_repair_loop<F, Fut>(
    audit_log: &mut BuildAuditLog,
    bundle_sha256_for: impl Fn(u32) -> String,
    mut attempt_source: F,
    manifest: &ModuleManifest,
    modules_root: &Path,
) -> RepairOutcome
where
    F: FnMut(u32, Option<&ValidationReport>) -> Fut,
    Fut: std::future::Future<Output = (String, Option<Vec<String>>)>,
{
    let mut last_report: Option<ValidationReport> = None;

    for attempt in 1..=MAX_REPAIR_ATTEMPTS {
        let (adapter_source, test_source_lines) = attempt_source(attempt, last_report.as_ref()).await;
        let test_source = test_source_lines.map(|lines| lines.join("\n"));
        let report = super::validation::validate_module(manifest, modules_root, &adapter_source, test_source.as_deref());

        let (status, failure_type) = match report.status {
            ValidationStatus::Validated => (AttemptStatus::Success, None),
            ValidationStatus::Failed => (AttemptStatus::Failed, report.dominant_failure_type()),
            ValidationStatus::Error => (AttemptStatus::Error, Some(FailureType::GatewayFailure)),
        };

        let fingerprint = if status != AttemptStatus::Success {
            Some(FailureFingerprint::compute(
                &report.static_results.iter().map(|r| r.name.clone()).collect::<Vec<_>>(),
                &[],
                &report.fix_hints.iter().map(|h| h.category.clone()).collect::<Vec<_>>(),
            ))
        } else {
            None
        };

        audit_log.add_attempt(AttemptRecord {
            attempt_number: attempt,
            bundle_sha256: bundle_sha256_for(attempt),
            stage: AttemptStage::Repair,
            status: status.clone(),
            timestamp: chrono::Utc::now(),
            validation_report: serde_json::to_value(&report).ok(),
            logs: String::new(),
            failure_fingerprint: fingerprint,
            failure_type,
            metadata: serde_json::Value::Null,
        });

        if status == AttemptStatus::Success {
            return RepairOutcome::Validated { attempts: attempt };
        }

        if let Some(failure_type) = failure_type {
            if failure_type.is_terminal() {
                return RepairOutcome::TerminalFailure { attempts: attempt, failure_type, last_report: report };
            }
        }

        if audit_log.has_consecutive_identical_failures() {
            return RepairOutcome::Thrashing { attempts: attempt, last_report: report };
        }

        last_report = Some(report);
    }

    RepairOutcome::ExhaustedAttempts {
        attempts: MAX_REPAIR_ATTEMPTS,
        last_report: last_report.expect("loop ran at least once"),
    }
}
