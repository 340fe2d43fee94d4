//! Self-evolving module pipeline: build → write → validate → install, with
//! a bounded repair loop between write and validate.
//!
//! Stage dispatch is grounded on `tools/builtin/module_pipeline.py`'s
//! `CompositeTool`/`ActionStrategy` registration, adapted here as a plain
//! enum match rather than a dynamic strategy registry — the five stages are
//! fixed and known at compile time, so the registry indirection the Python
//! tool needed (for runtime tool discovery) has no counterpart here.

mod build;
mod install;
mod manifest;
mod repair;
mod scaffold;
mod validation;
mod writecode;

pub use build::{run_build_pipeline, BuildPipelineOutcome};
pub use install::{attest_from_index, install_module, InstallAttestation, InstallRejectionReason};
pub use manifest::{AuthType, HealthStatus, ModuleManifest, ModuleStatus, ValidationResults};
pub use repair::{run_repair_loop, RepairOutcome, MAX_REPAIR_ATTEMPTS};
pub use scaffold::{scaffold_module, ScaffoldRequest, ScaffoldOutput, REGISTRATION_MARKER};
pub use validation::{
    check_forbidden_imports, check_manifest_schema, check_path_allowlist, check_registration_marker,
    check_required_methods, check_syntax, validate_module, FixHint, RuntimeCheckResult, StaticCheckResult,
    ValidationReport, ValidationStatus,
};
pub use writecode::{write_code, WriteCodeOutput};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("io error: {0}")]
    Io(#[source] std::io::Error),
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("install rejected: {reason}")]
    InstallRejected { reason: String },
    #[error("sandbox error: {0}")]
    Sandbox(#[from] crate::sandbox::SandboxError),
    #[error("module {module_id} already has a manifest; use write_code to update it")]
    DuplicateModule { module_id: String },
    #[error("module {module_id} was never scaffolded; call scaffold_module first")]
    ModuleNotScaffolded { module_id: String },
    #[error("syntax error: {0}")]
    SyntaxError(String),
    #[error(transparent)]
    Gateway(#[from] crate::gateway::GatewayError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Scaffold,
    Implement,
    Validate,
    Repair,
    Install,
}
