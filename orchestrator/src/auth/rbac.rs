//! Closed-set RBAC: role → permission table as a pure function, not a
//! string comparison. Grounded on spec §4.8's permission table.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Operator,
    Admin,
    Owner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadConfig,
    WriteConfig,
    ManageModules,
    ManageKeys,
}

/// Pure function over the role → permission table in spec §4.8.
pub fn has_permission(role: Role, permission: Permission) -> bool {
    match role {
        Role::Owner => true,
        Role::Admin => matches!(
            permission,
            Permission::ReadConfig | Permission::WriteConfig | Permission::ManageModules | Permission::ManageKeys
        ),
        Role::Operator => matches!(permission, Permission::ReadConfig | Permission::ManageModules),
        Role::Viewer => matches!(permission, Permission::ReadConfig),
    }
}
