//! Per-request permission checks against a user's membership.
//!
//! The guard answers "can user U do P inside warehouse W?" by loading the
//! single `(W, U)` membership and consulting the static role matrix. A user
//! with no membership in W is denied everything there.

use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};

use super::models::Permission;
use super::roles::has_permission;
use crate::db::TenantStore;
use crate::error::{Result, WarehubError};
use crate::models::{Membership, UserId, WarehouseId};

/// Outcome of one guard evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Granted through this membership.
    Allow(Membership),
    /// Denied, with a reason for logs.
    Deny(String),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Deny(_))
    }
}

/// Authorization guard shared by every mutating and listing operation.
#[derive(Clone)]
pub struct AuthorizationGuard {
    store: Arc<dyn TenantStore>,
}

impl AuthorizationGuard {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Evaluate without turning a denial into an error.
    pub async fn decide(
        &self,
        user_id: UserId,
        warehouse_id: WarehouseId,
        permission: Permission,
    ) -> Result<AccessDecision> {
        let Some(membership) = self.store.get_membership(warehouse_id, user_id).await? else {
            return Ok(AccessDecision::Deny(format!(
                "user {} has no membership in warehouse {}",
                user_id, warehouse_id
            )));
        };

        if has_permission(membership.role, permission) {
            debug!(
                user_id = %user_id,
                warehouse_id = %warehouse_id,
                permission = %permission,
                role = %membership.role,
                "permission granted"
            );
            Ok(AccessDecision::Allow(membership))
        } else {
            Ok(AccessDecision::Deny(format!(
                "role {} lacks {} in warehouse {}",
                membership.role, permission, warehouse_id
            )))
        }
    }

    /// `true` iff the user is a member of the warehouse and their role grants
    /// `permission`.
    pub async fn check_permission(
        &self,
        user_id: UserId,
        warehouse_id: WarehouseId,
        permission: Permission,
    ) -> Result<bool> {
        Ok(self
            .decide(user_id, warehouse_id, permission)
            .await?
            .is_allowed())
    }

    /// Like [`check_permission`](Self::check_permission) but fails with
    /// `PermissionDenied` naming the permission. Returns the granting
    /// membership on success.
    pub async fn require_permission(
        &self,
        user_id: UserId,
        warehouse_id: WarehouseId,
        permission: Permission,
    ) -> Result<Membership> {
        match self.decide(user_id, warehouse_id, permission).await? {
            AccessDecision::Allow(membership) => Ok(membership),
            AccessDecision::Deny(reason) => {
                warn!(
                    user_id = %user_id,
                    warehouse_id = %warehouse_id,
                    permission = %permission,
                    reason = %reason,
                    "permission denied"
                );
                counter!(
                    "warehub_permission_denied_total",
                    "permission" => permission.as_str()
                )
                .increment(1);
                Err(WarehubError::permission_denied(permission))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::ErrorCode;
    use crate::models::{UserProfile, Warehouse};
    use crate::rbac::Role;
    use chrono::Utc;

    async fn member_with(role: Role) -> (AuthorizationGuard, UserId, WarehouseId) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let owner = store
            .upsert_user(&UserProfile::new("ext_owner", "Owner", "owner@example.com"), now)
            .await
            .unwrap();
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "Depot".into(),
            description: String::new(),
            created_by: owner.id,
            created_at: now,
        };
        store
            .create_warehouse(&warehouse, &Membership::owner(warehouse.id, owner.id, now))
            .await
            .unwrap();
        if role != Role::Owner {
            store
                .change_role(warehouse.id, owner.id, role, false)
                .await
                .unwrap();
        }
        (AuthorizationGuard::new(Arc::new(store)), owner.id, warehouse.id)
    }

    #[tokio::test]
    async fn test_owner_allowed_everything() {
        let (guard, user, warehouse) = member_with(Role::Owner).await;
        for permission in Permission::ALL {
            assert!(guard.check_permission(user, warehouse, permission).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_staff_denied_with_permission_name() {
        let (guard, user, warehouse) = member_with(Role::Staff).await;
        let err = guard
            .require_permission(user, warehouse, Permission::StoresCreate)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.denied_permission(), Some("stores:create"));
        assert_eq!(err.user_message(), "Permission denied: stores:create");
    }

    #[tokio::test]
    async fn test_non_member_denied() {
        let (guard, user, _) = member_with(Role::Owner).await;
        let other = WarehouseId::new();
        let decision = guard
            .decide(user, other, Permission::StoresView)
            .await
            .unwrap();
        assert!(decision.is_denied());
    }
}
