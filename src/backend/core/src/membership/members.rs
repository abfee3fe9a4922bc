//! Role changes, removal and member listing.

use serde::Serialize;
use tracing::{info, warn};

use super::MembershipService;
use crate::error::{Result, WarehubError};
use crate::identity::UNKNOWN_NAME;
use crate::models::{Membership, User, UserId, WarehouseId};
use crate::rbac::{Permission, Role};

/// A membership with the member's display data.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    #[serde(flatten)]
    pub membership: Membership,
    pub name: String,
    pub email: String,
}

impl MembershipService {
    /// Change `target`'s role. Nobody may change their own role.
    pub async fn change_role(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
        target: UserId,
        role: Role,
    ) -> Result<Membership> {
        self.guard
            .require_permission(actor.id, warehouse_id, Permission::RolesChange)
            .await?;
        if target == actor.id {
            return Err(WarehubError::cannot_change_self());
        }

        let membership = self
            .store
            .change_role(warehouse_id, target, role, self.protect_last_owner)
            .await?;

        info!(
            warehouse_id = %warehouse_id,
            user_id = %target,
            role = %role,
            changed_by = %actor.id,
            "member role changed"
        );
        Ok(membership)
    }

    /// Remove `target` from the warehouse. Nobody may remove themself.
    pub async fn remove_member(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
        target: UserId,
    ) -> Result<Membership> {
        self.guard
            .require_permission(actor.id, warehouse_id, Permission::UsersRemove)
            .await?;
        if target == actor.id {
            return Err(WarehubError::cannot_remove_self());
        }

        let removed = self
            .store
            .remove_membership(warehouse_id, target, self.protect_last_owner)
            .await?;

        if !self.protect_last_owner && removed.role == Role::Owner {
            let remaining = self.store.memberships_for_warehouse(warehouse_id).await?;
            if !remaining.iter().any(|m| m.role == Role::Owner) {
                warn!(warehouse_id = %warehouse_id, "last owner removed");
            }
        }

        info!(
            warehouse_id = %warehouse_id,
            user_id = %target,
            role = %removed.role,
            removed_by = %actor.id,
            "member removed"
        );
        Ok(removed)
    }

    /// Members of a warehouse; empty unless `actor` holds `users:view` there.
    pub async fn list_members(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<MemberView>> {
        if !self
            .guard
            .check_permission(actor.id, warehouse_id, Permission::UsersView)
            .await?
        {
            return Ok(Vec::new());
        }

        let memberships = self.store.memberships_for_warehouse(warehouse_id).await?;
        let mut members = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let (name, email) = match self.store.get_user(membership.user_id).await? {
                Some(user) => (user.name, user.email),
                None => (UNKNOWN_NAME.to_string(), String::new()),
            };
            members.push(MemberView {
                membership,
                name,
                email,
            });
        }
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TenantStore};
    use crate::error::ErrorCode;
    use crate::models::{UserProfile, Warehouse};
    use chrono::Utc;
    use std::sync::Arc;

    async fn setup(protect: bool) -> (MembershipService, Arc<MemoryStore>, User, User, WarehouseId) {
        let store = Arc::new(MemoryStore::new());
        let owner = store
            .upsert_user(&UserProfile::new("o", "Olive", "o@x.com"), Utc::now())
            .await
            .unwrap();
        let staff = store
            .upsert_user(&UserProfile::new("s", "Sam", "s@x.com"), Utc::now())
            .await
            .unwrap();
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "W".into(),
            description: String::new(),
            created_by: owner.id,
            created_at: Utc::now(),
        };
        store
            .create_warehouse(&warehouse, &Membership::owner(warehouse.id, owner.id, Utc::now()))
            .await
            .unwrap();

        let service = MembershipService::new(store.clone(), protect);
        let invitation = service
            .invite(&owner, warehouse.id, "s@x.com", Role::Staff)
            .await
            .unwrap();
        service.accept(&staff, invitation.id).await.unwrap();
        (service, store, owner, staff, warehouse.id)
    }

    #[tokio::test]
    async fn test_cannot_change_own_role() {
        let (service, _, owner, _, warehouse) = setup(true).await;
        let err = service
            .change_role(&owner, warehouse, owner.id, Role::Manager)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CannotChangeSelf);
    }

    #[tokio::test]
    async fn test_cannot_remove_self() {
        let (service, _, owner, _, warehouse) = setup(true).await;
        let err = service
            .remove_member(&owner, warehouse, owner.id)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CannotRemoveSelf);
    }

    #[tokio::test]
    async fn test_staff_cannot_change_roles() {
        let (service, _, owner, staff, warehouse) = setup(true).await;
        let err = service
            .change_role(&staff, warehouse, owner.id, Role::Staff)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        assert_eq!(err.denied_permission(), Some("roles:change"));
    }

    #[tokio::test]
    async fn test_promote_then_demote_original_owner() {
        let (service, store, owner, staff, warehouse) = setup(true).await;
        service
            .change_role(&owner, warehouse, staff.id, Role::Owner)
            .await
            .unwrap();
        let demoted = service
            .change_role(&staff, warehouse, owner.id, Role::Manager)
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Manager);

        let err = service
            .change_role(&owner, warehouse, staff.id, Role::Staff)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);
        let members = store.memberships_for_warehouse(warehouse).await.unwrap();
        assert_eq!(members.iter().filter(|m| m.role == Role::Owner).count(), 1);
    }

    #[tokio::test]
    async fn test_remove_member_and_listing() {
        let (service, _, owner, staff, warehouse) = setup(true).await;
        let members = service.list_members(&owner, warehouse).await.unwrap();
        assert_eq!(members.len(), 2);
        assert!(members.iter().any(|m| m.name == "Sam" && m.email == "s@x.com"));

        let removed = service.remove_member(&owner, warehouse, staff.id).await.unwrap();
        assert_eq!(removed.user_id, staff.id);
        assert_eq!(service.list_members(&owner, warehouse).await.unwrap().len(), 1);
        assert!(service.list_members(&staff, warehouse).await.unwrap().is_empty());
    }
}
