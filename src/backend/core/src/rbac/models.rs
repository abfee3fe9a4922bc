//! RBAC vocabulary: the three membership roles and the fourteen permissions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a role or permission string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseRbacError {
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown permission: {0}")]
    UnknownPermission(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Role
// ═══════════════════════════════════════════════════════════════════════════════

/// Role a user holds inside one warehouse.
///
/// The lattice is `owner > manager > staff`, but grants are *not* derived
/// from that ordering; see [`super::roles`] for the exact table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Manager,
    Staff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Owner, Role::Manager, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseRbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "manager" => Ok(Self::Manager),
            "staff" => Ok(Self::Staff),
            other => Err(ParseRbacError::UnknownRole(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Permission
// ═══════════════════════════════════════════════════════════════════════════════

/// A permission represents an action on a resource family.
///
/// Permissions follow the format `family:action`, for example:
/// - `warehouse:delete`
/// - `users:invite`
/// - `inventory:update`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    WarehouseUpdate,
    WarehouseDelete,
    UsersInvite,
    UsersRemove,
    UsersView,
    RolesChange,
    StoresCreate,
    StoresUpdate,
    StoresDelete,
    StoresView,
    InventoryCreate,
    InventoryUpdate,
    InventoryDelete,
    InventoryView,
}

impl Permission {
    pub const ALL: [Permission; 14] = [
        Permission::WarehouseUpdate,
        Permission::WarehouseDelete,
        Permission::UsersInvite,
        Permission::UsersRemove,
        Permission::UsersView,
        Permission::RolesChange,
        Permission::StoresCreate,
        Permission::StoresUpdate,
        Permission::StoresDelete,
        Permission::StoresView,
        Permission::InventoryCreate,
        Permission::InventoryUpdate,
        Permission::InventoryDelete,
        Permission::InventoryView,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WarehouseUpdate => "warehouse:update",
            Self::WarehouseDelete => "warehouse:delete",
            Self::UsersInvite => "users:invite",
            Self::UsersRemove => "users:remove",
            Self::UsersView => "users:view",
            Self::RolesChange => "roles:change",
            Self::StoresCreate => "stores:create",
            Self::StoresUpdate => "stores:update",
            Self::StoresDelete => "stores:delete",
            Self::StoresView => "stores:view",
            Self::InventoryCreate => "inventory:create",
            Self::InventoryUpdate => "inventory:update",
            Self::InventoryDelete => "inventory:delete",
            Self::InventoryView => "inventory:view",
        }
    }

    /// The resource family (`warehouse`, `users`, `roles`, `stores`, `inventory`).
    pub fn family(&self) -> &'static str {
        self.as_str().split(':').next().unwrap_or_default()
    }

    /// The action within the family.
    pub fn action(&self) -> &'static str {
        self.as_str().split(':').nth(1).unwrap_or_default()
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = ParseRbacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParseRbacError::UnknownPermission(s.to_string()))
    }
}

impl TryFrom<String> for Permission {
    type Error = ParseRbacError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(p: Permission) -> Self {
        p.as_str().to_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_roundtrip() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!(
            "admin".parse::<Role>(),
            Err(ParseRbacError::UnknownRole("admin".into()))
        );
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!(
            "stores:create".parse::<Permission>().unwrap(),
            Permission::StoresCreate
        );
        assert!("stores:*".parse::<Permission>().is_err());
        assert!("".parse::<Permission>().is_err());
    }

    #[test]
    fn test_permission_family_and_action() {
        assert_eq!(Permission::RolesChange.family(), "roles");
        assert_eq!(Permission::RolesChange.action(), "change");
        assert_eq!(Permission::InventoryView.family(), "inventory");
    }

    #[test]
    fn test_permission_serde_uses_wire_names() {
        let json = serde_json::to_string(&Permission::UsersInvite).unwrap();
        assert_eq!(json, "\"users:invite\"");
        let back: Permission = serde_json::from_str("\"warehouse:delete\"").unwrap();
        assert_eq!(back, Permission::WarehouseDelete);
    }

    #[test]
    fn test_fourteen_distinct_permissions() {
        let names: std::collections::HashSet<_> =
            Permission::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(names.len(), 14);
    }
}
