//! Attempt records, failure fingerprinting, and the two audit logs
//! (per-job build audit, append-only dev-mode audit). Grounded on
//! `shared/modules/audit.py`.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to read audit log: {0}")]
    Read(#[source] std::io::Error),
    #[error("failed to write audit log: {0}")]
    Write(#[source] std::io::Error),
    #[error("failed to (de)serialize audit record: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type AuditResult<T> = Result<T, AuditError>;

/// Retryable failures may be repaired by requesting another attempt from the
/// provider gateway. Terminal failures stop the repair loop immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    TestFailure,
    SchemaMismatch,
    MissingMethod,
    ImportViolation,
    SyntaxError,
    PolicyViolation,
    SecurityBlock,
    BudgetExceeded,
    GatewayFailure,
}

impl FailureType {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FailureType::PolicyViolation
                | FailureType::SecurityBlock
                | FailureType::BudgetExceeded
                | FailureType::GatewayFailure
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Success,
    Failed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStage {
    Scaffold,
    Implement,
    Tests,
    Repair,
}

/// SHA-256 over the JSON-canonical shape of a failure, truncated to its
/// first 16 hex characters. Two consecutive equal fingerprints indicate the
/// repair loop is thrashing (spec §3, §8 scenario 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureFingerprint(String);

impl FailureFingerprint {
    pub fn compute(
        error_types: &[String],
        failing_tests: &[String],
        fix_hint_categories: &[String],
    ) -> Self {
        let mut error_types = error_types.to_vec();
        let mut failing_tests = failing_tests.to_vec();
        let mut fix_hint_categories = fix_hint_categories.to_vec();
        error_types.sort();
        failing_tests.sort();
        fix_hint_categories.sort();

        let canonical = serde_json::json!({
            "error_types": error_types,
            "failing_tests": failing_tests,
            "fix_hint_categories": fix_hint_categories,
        });
        let canonical_str = serde_json::to_string(&canonical).expect("canonical JSON never fails");

        let mut hasher = Sha256::new();
        hasher.update(canonical_str.as_bytes());
        let full = hex::encode(hasher.finalize());
        Self(full[..16].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FailureFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An immutable record of a single build/repair attempt. Never mutated after
/// being appended to a `BuildAuditLog`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    pub bundle_sha256: String,
    pub stage: AttemptStage,
    pub status: AttemptStatus,
    pub timestamp: DateTime<Utc>,
    pub validation_report: Option<serde_json::Value>,
    pub logs: String,
    pub failure_fingerprint: Option<FailureFingerprint>,
    pub failure_type: Option<FailureType>,
    pub metadata: serde_json::Value,
}

/// Append-only, per-job log of every build/repair attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildAuditLog {
    pub job_id: String,
    pub attempts: Vec<AttemptRecord>,
}

impl BuildAuditLog {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            attempts: Vec::new(),
        }
    }

    /// Append a new attempt; `attempt_number` is assigned as `len + 1`,
    /// preserving the monotonic 1..N invariant regardless of caller input.
    pub fn add_attempt(&mut self, mut record: AttemptRecord) -> &AttemptRecord {
        record.attempt_number = self.attempts.len() as u32 + 1;
        self.attempts.push(record);
        self.attempts.last().expect("just pushed")
    }

    pub fn last_fingerprint(&self) -> Option<&FailureFingerprint> {
        self.attempts
            .iter()
            .rev()
            .find_map(|a| a.failure_fingerprint.as_ref())
    }

    /// True when the last two attempts both failed with the same fingerprint
    /// — the thrash-detection condition that short-circuits the repair loop.
    pub fn has_consecutive_identical_failures(&self) -> bool {
        if self.attempts.len() < 2 {
            return false;
        }
        let last_two = &self.attempts[self.attempts.len() - 2..];
        match (&last_two[0].failure_fingerprint, &last_two[1].failure_fingerprint) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn classify_failure_type(report_status: &str, category: &str) -> FailureType {
        if report_status == "ERROR" {
            return FailureType::GatewayFailure;
        }
        match category {
            "import_violation" => FailureType::ImportViolation,
            "missing_method" => FailureType::MissingMethod,
            "syntax_error" => FailureType::SyntaxError,
            "schema_error" | "schema_mismatch" => FailureType::SchemaMismatch,
            "policy_violation" => FailureType::PolicyViolation,
            "security_block" => FailureType::SecurityBlock,
            "budget_exceeded" => FailureType::BudgetExceeded,
            _ => FailureType::TestFailure,
        }
    }

    pub fn save(&self, path: &Path) -> AuditResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(AuditError::Write)
    }

    pub fn load(path: &Path) -> AuditResult<Self> {
        let data = std::fs::read_to_string(path).map_err(AuditError::Read)?;
        Ok(serde_json::from_str(&data)?)
    }
}

/// An event appended to `dev_mode_audit.jsonl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub action: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub module_id: Option<String>,
    pub draft_id: Option<String>,
    pub details: serde_json::Value,
}

/// Append-only JSONL audit trail for dev-mode actions (draft lifecycle,
/// rollback). Timestamps are monotonically non-decreasing within a process
/// because every event is stamped with `Utc::now()` at append time and the
/// writer is not reordered.
pub struct DevModeAuditLog {
    path: PathBuf,
}

impl DevModeAuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn log_action(
        &self,
        action: &str,
        actor: &str,
        module_id: Option<&str>,
        draft_id: Option<&str>,
        details: serde_json::Value,
    ) -> AuditResult<AuditEvent> {
        let event = AuditEvent {
            event_id: Uuid::new_v4().to_string(),
            action: action.to_string(),
            actor: actor.to_string(),
            timestamp: Utc::now(),
            module_id: module_id.map(str::to_string),
            draft_id: draft_id.map(str::to_string),
            details,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(AuditError::Write)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(AuditError::Write)?;
        let line = serde_json::to_string(&event)?;
        writeln!(file, "{line}").map_err(AuditError::Write)?;
        Ok(event)
    }

    pub fn get_events(&self) -> AuditResult<Vec<AuditEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.path).map_err(AuditError::Read)?;
        let reader = BufReader::new(file);
        let mut events = Vec::new();
        for line in reader.lines() {
            let line = line.map_err(AuditError::Read)?;
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str(&line)?);
        }
        Ok(events)
    }
}

/// `install_success.jsonl` / `install_rejections.jsonl` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub module_id: String,
    pub action: String,
    pub bundle_sha256: String,
    pub reason: Option<String>,
}

pub fn append_install_entry(path: &Path, entry: &InstallAuditEntry) -> AuditResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(AuditError::Write)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(AuditError::Write)?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{line}").map_err(AuditError::Write)
}
