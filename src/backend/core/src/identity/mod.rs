//! Identity sync with the external auth provider.
//!
//! Users are never created by the engine itself: they arrive through
//! provider webhook events keyed by the provider's user id, and every
//! operation here is idempotent so redelivered events are harmless.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{TenantStore, UserRemoval};
use crate::error::{Result, WarehubError};
use crate::models::{User, UserId, UserProfile};
use crate::rbac::Role;
use crate::telemetry::redact_email;

/// Name recorded when the provider supplies neither first nor last name.
pub const UNKNOWN_NAME: &str = "Unknown";

// ═══════════════════════════════════════════════════════════════════════════════
// Webhook envelope
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEmail {
    pub email_address: String,
}

/// User payload as sent by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub email_addresses: Vec<ProviderEmail>,
}

impl ProviderUser {
    /// `"first last"` trimmed, or [`UNKNOWN_NAME`].
    pub fn display_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            UNKNOWN_NAME.to_string()
        } else {
            parts.join(" ")
        }
    }

    /// First listed address, normalised; empty when none is listed.
    pub fn primary_email(&self) -> &str {
        self.email_addresses
            .first()
            .map(|e| e.email_address.as_str())
            .unwrap_or("")
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile::new(self.id.clone(), self.display_name(), self.primary_email())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedUser {
    pub id: String,
}

/// Provider webhook event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum IdentityEvent {
    #[serde(rename = "user.created")]
    UserCreated(ProviderUser),
    #[serde(rename = "user.updated")]
    UserUpdated(ProviderUser),
    #[serde(rename = "user.deleted")]
    UserDeleted(DeletedUser),
}

impl IdentityEvent {
    pub fn external_auth_id(&self) -> &str {
        match self {
            Self::UserCreated(u) | Self::UserUpdated(u) => &u.id,
            Self::UserDeleted(d) => &d.id,
        }
    }
}

/// What applying an event did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Upserted { user_id: UserId },
    Deleted { user_id: UserId, memberships_removed: usize },
    /// Deletion of a user that was never synced, or already deleted.
    Ignored,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct IdentityService {
    store: Arc<dyn TenantStore>,
}

impl IdentityService {
    pub fn new(store: Arc<dyn TenantStore>) -> Self {
        Self { store }
    }

    /// Insert or update the user keyed by `external_auth_id`.
    pub async fn sync_user(&self, profile: &UserProfile) -> Result<User> {
        profile.validate()?;
        let user = self.store.upsert_user(profile, Utc::now()).await?;
        info!(
            user_id = %user.id,
            external_auth_id = %user.external_auth_id,
            email = %redact_email(&user.email),
            "user synced"
        );
        Ok(user)
    }

    /// Delete the user and their memberships. Invitations they sent stay valid.
    pub async fn delete_user(&self, external_auth_id: &str) -> Result<Option<UserRemoval>> {
        let Some(removal) = self.store.delete_user(external_auth_id).await? else {
            info!(external_auth_id = %external_auth_id, "delete for unknown user ignored");
            return Ok(None);
        };

        for membership in removal.memberships.iter().filter(|m| m.role == Role::Owner) {
            let remaining = self
                .store
                .memberships_for_warehouse(membership.warehouse_id)
                .await?;
            if !remaining.iter().any(|m| m.role == Role::Owner) {
                warn!(
                    warehouse_id = %membership.warehouse_id,
                    user_id = %removal.user.id,
                    remaining_members = remaining.len(),
                    "warehouse left without an owner after user deletion"
                );
            }
        }

        info!(
            user_id = %removal.user.id,
            memberships_removed = removal.memberships.len(),
            "user deleted"
        );
        Ok(Some(removal))
    }

    /// Apply one provider event.
    pub async fn apply_event(&self, event: &IdentityEvent) -> Result<SyncOutcome> {
        match event {
            IdentityEvent::UserCreated(payload) | IdentityEvent::UserUpdated(payload) => {
                let user = self.sync_user(&payload.profile()).await?;
                Ok(SyncOutcome::Upserted { user_id: user.id })
            }
            IdentityEvent::UserDeleted(deleted) => Ok(match self.delete_user(&deleted.id).await? {
                Some(removal) => SyncOutcome::Deleted {
                    user_id: removal.user.id,
                    memberships_removed: removal.memberships.len(),
                },
                None => SyncOutcome::Ignored,
            }),
        }
    }

    /// Resolve the acting user from the provider id; unknown ids are unauthenticated.
    pub async fn resolve(&self, external_auth_id: &str) -> Result<User> {
        self.store
            .find_user_by_external_id(external_auth_id)
            .await?
            .ok_or_else(|| WarehubError::unauthenticated("Unknown user"))
    }

    pub async fn get_user(&self, id: UserId) -> Result<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| WarehubError::user_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::error::ErrorCode;

    fn created(id: &str, first: Option<&str>, last: Option<&str>, email: &str) -> IdentityEvent {
        IdentityEvent::UserCreated(ProviderUser {
            id: id.into(),
            first_name: first.map(Into::into),
            last_name: last.map(Into::into),
            email_addresses: vec![ProviderEmail {
                email_address: email.into(),
            }],
        })
    }

    #[test]
    fn test_display_name_rules() {
        let both = ProviderUser {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            ..Default::default()
        };
        assert_eq!(both.display_name(), "Ada Lovelace");

        let first_only = ProviderUser {
            first_name: Some(" Ada ".into()),
            ..Default::default()
        };
        assert_eq!(first_only.display_name(), "Ada");

        assert_eq!(ProviderUser::default().display_name(), "Unknown");
    }

    #[test]
    fn test_event_envelope_deserializes() {
        let json = r#"{
            "type": "user.created",
            "data": {
                "id": "user_2abc",
                "first_name": "Grace",
                "last_name": null,
                "email_addresses": [{"email_address": " Grace@Navy.mil "}]
            }
        }"#;
        let event: IdentityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.external_auth_id(), "user_2abc");
        let IdentityEvent::UserCreated(payload) = event else {
            panic!("expected user.created");
        };
        let profile = payload.profile();
        assert_eq!(profile.name, "Grace");
        assert_eq!(profile.email, "grace@navy.mil");

        let deleted: IdentityEvent =
            serde_json::from_str(r#"{"type":"user.deleted","data":{"id":"user_2abc"}}"#).unwrap();
        assert!(matches!(deleted, IdentityEvent::UserDeleted(_)));
    }

    #[tokio::test]
    async fn test_update_applies_new_values() {
        let service = IdentityService::new(Arc::new(MemoryStore::new()));
        service
            .apply_event(&created("u1", Some("Old"), None, "old@example.com"))
            .await
            .unwrap();

        let update = IdentityEvent::UserUpdated(ProviderUser {
            id: "u1".into(),
            first_name: Some("New".into()),
            last_name: Some("Name".into()),
            email_addresses: vec![ProviderEmail {
                email_address: "new@example.com".into(),
            }],
        });
        service.apply_event(&update).await.unwrap();

        let user = service.resolve("u1").await.unwrap();
        assert_eq!(user.name, "New Name");
        assert_eq!(user.email, "new@example.com");
    }

    #[tokio::test]
    async fn test_events_are_idempotent() {
        let service = IdentityService::new(Arc::new(MemoryStore::new()));
        let event = created("u1", Some("A"), Some("B"), "ab@example.com");
        let first = service.apply_event(&event).await.unwrap();
        let second = service.apply_event(&event).await.unwrap();
        assert_eq!(first, second);

        let delete = IdentityEvent::UserDeleted(DeletedUser { id: "u1".into() });
        assert!(matches!(
            service.apply_event(&delete).await.unwrap(),
            SyncOutcome::Deleted { .. }
        ));
        assert_eq!(service.apply_event(&delete).await.unwrap(), SyncOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_resolve_unknown_is_unauthenticated() {
        let service = IdentityService::new(Arc::new(MemoryStore::new()));
        let err = service.resolve("nobody").await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Unauthenticated);
    }
}
