//! Invite, accept, decline and cancel.

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use super::MembershipService;
use crate::error::{Result, WarehubError};
use crate::identity::UNKNOWN_NAME;
use crate::models::{
    normalize_email, Acceptance, Invitation, InvitationId, InvitationStatus, Membership,
    MembershipId, User, WarehouseId,
};
use crate::rbac::{Permission, Role};
use crate::telemetry::{redact_email, InvitationMetrics};

/// A pending invitation annotated for the invitee.
#[derive(Debug, Clone, Serialize)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: Invitation,
    pub warehouse_name: String,
    pub inviter_name: String,
}

impl MembershipService {
    /// Invite `email` into `warehouse_id` with `role`.
    ///
    /// Any accepted or declined invitation for the same address and warehouse
    /// is replaced.
    pub async fn invite(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
        email: &str,
        role: Role,
    ) -> Result<Invitation> {
        self.guard
            .require_permission(actor.id, warehouse_id, Permission::UsersInvite)
            .await?;

        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(WarehubError::validation("A valid email address is required"));
        }

        if let Some(invitee) = self.store.find_user_by_email(&email).await? {
            if self
                .store
                .get_membership(warehouse_id, invitee.id)
                .await?
                .is_some()
            {
                return Err(WarehubError::already_member(warehouse_id));
            }
        }

        // Fast path for a clearer error; the store's uniqueness rule is authoritative.
        let pending = self.store.pending_invitations_for_email(&email).await?;
        if pending.iter().any(|i| i.warehouse_id == warehouse_id) {
            return Err(WarehubError::invitation_already_pending(warehouse_id));
        }

        let invitation = Invitation::pending(warehouse_id, &email, role, actor.id, Utc::now());
        let purged = self.store.create_invitation(&invitation).await?;
        if purged > 0 {
            debug!(
                warehouse_id = %warehouse_id,
                purged,
                "replaced terminal invitations"
            );
        }

        InvitationMetrics::record("created");
        info!(
            invitation_id = %invitation.id,
            warehouse_id = %warehouse_id,
            email = %redact_email(&email),
            role = %role,
            invited_by = %actor.id,
            "invitation created"
        );
        Ok(invitation)
    }

    /// Load an invitation and check it belongs to `actor` and is still pending.
    async fn own_pending_invitation(&self, actor: &User, id: InvitationId) -> Result<Invitation> {
        let invitation = self
            .store
            .get_invitation(id)
            .await?
            .ok_or_else(|| WarehubError::invitation_not_found(id))?;
        if !invitation.is_for(&actor.email) {
            return Err(WarehubError::not_your_invitation());
        }
        if invitation.status != InvitationStatus::Pending {
            return Err(WarehubError::invitation_not_pending(invitation.status));
        }
        Ok(invitation)
    }

    /// Accept an invitation addressed to `actor`'s e-mail.
    pub async fn accept(&self, actor: &User, id: InvitationId) -> Result<Membership> {
        let invitation = self.own_pending_invitation(actor, id).await?;
        if self
            .store
            .get_membership(invitation.warehouse_id, actor.id)
            .await?
            .is_some()
        {
            return Err(WarehubError::already_member(invitation.warehouse_id));
        }

        let membership = self
            .store
            .accept_invitation(&Acceptance {
                invitation_id: invitation.id,
                membership_id: MembershipId::new(),
                user_id: actor.id,
                joined_at: Utc::now(),
            })
            .await?;

        InvitationMetrics::record("accepted");
        info!(
            invitation_id = %invitation.id,
            warehouse_id = %membership.warehouse_id,
            user_id = %actor.id,
            role = %membership.role,
            "invitation accepted"
        );
        Ok(membership)
    }

    /// Decline an invitation addressed to `actor`'s e-mail.
    pub async fn decline(&self, actor: &User, id: InvitationId) -> Result<Invitation> {
        self.own_pending_invitation(actor, id).await?;
        let declined = self.store.decline_invitation(id).await?;

        InvitationMetrics::record("declined");
        info!(
            invitation_id = %id,
            warehouse_id = %declined.warehouse_id,
            user_id = %actor.id,
            "invitation declined"
        );
        Ok(declined)
    }

    /// Delete an invitation in any state. Requires `users:invite` on its warehouse.
    pub async fn cancel(&self, actor: &User, id: InvitationId) -> Result<()> {
        let invitation = self
            .store
            .get_invitation(id)
            .await?
            .ok_or_else(|| WarehubError::invitation_not_found(id))?;
        self.guard
            .require_permission(actor.id, invitation.warehouse_id, Permission::UsersInvite)
            .await?;

        if self.store.delete_invitation(id).await? {
            InvitationMetrics::record("revoked");
            info!(
                invitation_id = %id,
                warehouse_id = %invitation.warehouse_id,
                status = %invitation.status,
                cancelled_by = %actor.id,
                "invitation cancelled"
            );
        }
        Ok(())
    }

    /// Pending invitations addressed to `actor`, with warehouse and inviter names.
    pub async fn list_my_invitations(&self, actor: &User) -> Result<Vec<InvitationView>> {
        let pending = self.store.pending_invitations_for_email(&actor.email).await?;
        let mut views = Vec::with_capacity(pending.len());
        for invitation in pending {
            let warehouse_name = self
                .store
                .get_warehouse(invitation.warehouse_id)
                .await?
                .map(|w| w.name)
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            let inviter_name = self
                .store
                .get_user(invitation.invited_by)
                .await?
                .map(|u| u.name)
                .unwrap_or_else(|| UNKNOWN_NAME.to_string());
            views.push(InvitationView {
                invitation,
                warehouse_name,
                inviter_name,
            });
        }
        Ok(views)
    }

    /// All invitations of a warehouse; empty unless `actor` holds `users:invite` there.
    pub async fn list_warehouse_invitations(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<Invitation>> {
        if !self
            .guard
            .check_permission(actor.id, warehouse_id, Permission::UsersInvite)
            .await?
        {
            return Ok(Vec::new());
        }
        self.store.invitations_for_warehouse(warehouse_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TenantStore};
    use crate::error::ErrorCode;
    use crate::models::{UserProfile, Warehouse};
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: MembershipService,
        owner: User,
        warehouse: WarehouseId,
    }

    async fn user(store: &MemoryStore, ext: &str, email: &str) -> User {
        store
            .upsert_user(&UserProfile::new(ext, ext, email), Utc::now())
            .await
            .unwrap()
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = user(&store, "owner", "owner@example.com").await;
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "North".into(),
            description: String::new(),
            created_by: owner.id,
            created_at: Utc::now(),
        };
        store
            .create_warehouse(&warehouse, &Membership::owner(warehouse.id, owner.id, Utc::now()))
            .await
            .unwrap();
        Fixture {
            service: MembershipService::new(store.clone(), true),
            store,
            owner,
            warehouse: warehouse.id,
        }
    }

    #[tokio::test]
    async fn test_invite_rejects_duplicate_pending() {
        let f = fixture().await;
        f.service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Manager)
            .await
            .unwrap();
        let err = f
            .service
            .invite(&f.owner, f.warehouse, "A@X.com", Role::Staff)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvitationAlreadyPending);
    }

    #[tokio::test]
    async fn test_invite_rejects_existing_member() {
        let f = fixture().await;
        let err = f
            .service
            .invite(&f.owner, f.warehouse, "owner@example.com", Role::Staff)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyMember);
    }

    #[tokio::test]
    async fn test_accept_by_other_email_rejected() {
        let f = fixture().await;
        let invitation = f
            .service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Staff)
            .await
            .unwrap();
        let intruder = user(&f.store, "intruder", "b@x.com").await;
        let err = f.service.accept(&intruder, invitation.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotYourInvitation);
    }

    #[tokio::test]
    async fn test_decline_then_accept_fails() {
        let f = fixture().await;
        let invitee = user(&f.store, "a", "a@x.com").await;
        let invitation = f
            .service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Staff)
            .await
            .unwrap();

        let declined = f.service.decline(&invitee, invitation.id).await.unwrap();
        assert_eq!(declined.status, InvitationStatus::Declined);

        let err = f.service.accept(&invitee, invitation.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvitationNotPending);
        assert!(f
            .store
            .get_membership(f.warehouse, invitee.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_requires_invite_permission() {
        let f = fixture().await;
        let invitation = f
            .service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Staff)
            .await
            .unwrap();
        let outsider = user(&f.store, "out", "out@x.com").await;

        let err = f.service.cancel(&outsider, invitation.id).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::PermissionDenied);

        f.service.cancel(&f.owner, invitation.id).await.unwrap();
        assert!(f.store.get_invitation(invitation.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_my_invitations_annotated() {
        let f = fixture().await;
        let invitee = user(&f.store, "a", "a@x.com").await;
        f.service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Manager)
            .await
            .unwrap();

        let mine = f.service.list_my_invitations(&invitee).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].warehouse_name, "North");
        assert_eq!(mine[0].inviter_name, "owner");
    }

    #[tokio::test]
    async fn test_warehouse_invitations_empty_when_unauthorized() {
        let f = fixture().await;
        f.service
            .invite(&f.owner, f.warehouse, "a@x.com", Role::Staff)
            .await
            .unwrap();
        let outsider = user(&f.store, "out", "out@x.com").await;

        assert!(f
            .service
            .list_warehouse_invitations(&outsider, f.warehouse)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            f.service
                .list_warehouse_invitations(&f.owner, f.warehouse)
                .await
                .unwrap()
                .len(),
            1
        );
    }
}
