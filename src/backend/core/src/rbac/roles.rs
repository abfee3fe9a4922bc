//! The fixed role → permission table.
//!
//! | Permission         | owner | manager | staff |
//! |--------------------|:-----:|:-------:|:-----:|
//! | `warehouse:update` |   ✓   |    ✓    |       |
//! | `warehouse:delete` |   ✓   |         |       |
//! | `users:invite`     |   ✓   |         |       |
//! | `users:remove`     |   ✓   |         |       |
//! | `users:view`       |   ✓   |    ✓    |       |
//! | `roles:change`     |   ✓   |         |       |
//! | `stores:create`    |   ✓   |    ✓    |       |
//! | `stores:update`    |   ✓   |    ✓    |       |
//! | `stores:delete`    |   ✓   |         |       |
//! | `stores:view`      |   ✓   |    ✓    |   ✓   |
//! | `inventory:create` |   ✓   |    ✓    |   ✓   |
//! | `inventory:update` |   ✓   |    ✓    |   ✓   |
//! | `inventory:delete` |   ✓   |         |       |
//! | `inventory:view`   |   ✓   |    ✓    |   ✓   |
//!
//! The table is compiled in; there is no runtime mutation path.

use super::models::{Permission, Role};

const OWNER: &[Permission] = &Permission::ALL;

const MANAGER: &[Permission] = &[
    Permission::WarehouseUpdate,
    Permission::UsersView,
    Permission::StoresCreate,
    Permission::StoresUpdate,
    Permission::StoresView,
    Permission::InventoryCreate,
    Permission::InventoryUpdate,
    Permission::InventoryView,
];

const STAFF: &[Permission] = &[
    Permission::StoresView,
    Permission::InventoryCreate,
    Permission::InventoryUpdate,
    Permission::InventoryView,
];

/// Every permission granted to `role`.
pub const fn permissions_for(role: Role) -> &'static [Permission] {
    match role {
        Role::Owner => OWNER,
        Role::Manager => MANAGER,
        Role::Staff => STAFF,
    }
}

/// Pure lookup against the table.
pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions_for(role).contains(&permission)
}

/// Lookup for a role stored as a raw string. Unknown roles hold nothing.
pub fn role_name_has_permission(role: &str, permission: Permission) -> bool {
    role.parse::<Role>()
        .map(|r| has_permission(r, permission))
        .unwrap_or(false)
}
