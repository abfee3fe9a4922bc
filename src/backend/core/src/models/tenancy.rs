//! Users, warehouses (tenants), memberships and invitations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::ids::{InvitationId, MembershipId, UserId, WarehouseId};
use crate::error::{Result, WarehubError};
use crate::rbac::Role;

/// Canonical form used for every e-mail comparison.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

// ═══════════════════════════════════════════════════════════════════════════════
// User
// ═══════════════════════════════════════════════════════════════════════════════

/// Identity record mirrored from the external auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Id assigned by the external identity provider. Unique.
    pub external_auth_id: String,
    pub name: String,
    /// Normalised e-mail address. Unique.
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Fields carried by an identity-sync upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub external_auth_id: String,
    pub name: String,
    pub email: String,
}

impl UserProfile {
    pub fn new(
        external_auth_id: impl Into<String>,
        name: impl Into<String>,
        email: impl AsRef<str>,
    ) -> Self {
        Self {
            external_auth_id: external_auth_id.into(),
            name: name.into(),
            email: normalize_email(email.as_ref()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.external_auth_id.trim().is_empty() {
            return Err(WarehubError::validation("External auth id cannot be empty"));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Warehouse
// ═══════════════════════════════════════════════════════════════════════════════

/// Tenant root. Owns stores, memberships and invitations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warehouse {
    pub id: WarehouseId,
    pub name: String,
    pub description: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewWarehouse {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl NewWarehouse {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(WarehubError::validation("Warehouse name cannot be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl WarehouseUpdate {
    pub fn validate(&self) -> Result<()> {
        if matches!(&self.name, Some(n) if n.trim().is_empty()) {
            return Err(WarehubError::validation("Warehouse name cannot be empty"));
        }
        Ok(())
    }

    pub fn apply(&self, warehouse: &mut Warehouse) {
        if let Some(name) = &self.name {
            warehouse.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            warehouse.description = description.clone();
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Membership
// ═══════════════════════════════════════════════════════════════════════════════

/// The authoritative (user, warehouse, role) triple.
///
/// At most one exists per `(warehouse_id, user_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub id: MembershipId,
    pub warehouse_id: WarehouseId,
    pub user_id: UserId,
    pub role: Role,
    pub invited_by: Option<UserId>,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    /// The membership every new warehouse starts with.
    pub fn owner(warehouse_id: WarehouseId, user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id: MembershipId::new(),
            warehouse_id,
            user_id,
            role: Role::Owner,
            invited_by: None,
            joined_at: now,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Invitation
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of an invitation. `Accepted` and `Declined` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvitationStatus {
    type Err = WarehubError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "declined" => Ok(Self::Declined),
            other => Err(WarehubError::internal(format!(
                "unknown invitation status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invitation {
    pub id: InvitationId,
    pub warehouse_id: WarehouseId,
    /// Normalised invitee e-mail.
    pub email: String,
    pub role: Role,
    pub invited_by: UserId,
    pub status: InvitationStatus,
    pub invited_at: DateTime<Utc>,
}

impl Invitation {
    pub fn pending(
        warehouse_id: WarehouseId,
        email: &str,
        role: Role,
        invited_by: UserId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: InvitationId::new(),
            warehouse_id,
            email: normalize_email(email),
            role,
            invited_by,
            status: InvitationStatus::Pending,
            invited_at: now,
        }
    }

    pub fn is_for(&self, email: &str) -> bool {
        self.email == normalize_email(email)
    }
}

/// Everything needed to turn a pending invitation into a membership.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub invitation_id: InvitationId,
    pub membership_id: MembershipId,
    pub user_id: UserId,
    pub joined_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.com "), "a@x.com");
    }

    #[test]
    fn test_invitation_matches_normalised_email() {
        let inv = Invitation::pending(
            WarehouseId::new(),
            "Someone@Example.com",
            Role::Staff,
            UserId::new(),
            Utc::now(),
        );
        assert_eq!(inv.email, "someone@example.com");
        assert!(inv.is_for(" someone@EXAMPLE.com"));
        assert!(!inv.is_for("other@example.com"));
        assert_eq!(inv.status, InvitationStatus::Pending);
    }

    #[test]
    fn test_status_terminality() {
        assert!(!InvitationStatus::Pending.is_terminal());
        assert!(InvitationStatus::Accepted.is_terminal());
        assert!(InvitationStatus::Declined.is_terminal());
        assert_eq!("declined".parse::<InvitationStatus>().unwrap(), InvitationStatus::Declined);
    }

    #[test]
    fn test_warehouse_update_rejects_blank_name() {
        let update = WarehouseUpdate {
            name: Some("   ".into()),
            description: None,
        };
        assert!(update.validate().is_err());
    }
}
