//! Top-level error type composed from each component's error enum.
//!
//! Component code returns its own `thiserror` error; this type exists only at
//! process boundaries (HTTP handlers, RPC handlers, `main.rs`) where a single
//! type is convenient to match on or convert to a status code.

use thiserror::Error;

use crate::audit::AuditError;
use crate::auth::AuthError;
use crate::config::ConfigError;
use crate::delegation::DelegationError;
use crate::draft::DraftError;
use crate::gateway::GatewayError;
use crate::pipeline::PipelineError;
use crate::sandbox::SandboxError;
use crate::store::StoreError;
use crate::versioning::VersionError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Draft(#[from] DraftError),

    #[error(transparent)]
    Versioning(#[from] VersionError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// HTTP status class this error maps to, per the error-handling design:
    /// client-side faults are 4xx, true server faults are 5xx.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Auth(_)
                | OrchestratorError::Draft(_)
                | OrchestratorError::Pipeline(PipelineError::InstallRejected { .. })
        )
    }
}
