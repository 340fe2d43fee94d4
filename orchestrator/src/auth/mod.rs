//! API key lifecycle and RBAC. Grounded on spec §4.8; storage rides on the
//! `store` module's SQLite connections.

mod api_keys;
mod rbac;

pub use api_keys::{ApiKeyManager, ApiKeyRecord, ApiKeyStatus};
pub use rbac::{has_permission, Permission, Role};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Store(#[from] crate::store::StoreError),
    #[error("key not found")]
    KeyNotFound,
    #[error("key revoked")]
    KeyRevoked,
    #[error("key rotation grace period expired")]
    GracePeriodExpired,
    #[error("role '{0}' lacks permission '{1:?}'")]
    PermissionDenied(String, Permission),
}

pub type AuthResult<T> = Result<T, AuthError>;
