//! Strongly-typed identifiers for every persisted entity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a [`User`](super::User).
    UserId
);
entity_id!(
    /// Identifier of a [`Warehouse`](super::Warehouse), the tenant root.
    WarehouseId
);
entity_id!(
    /// Identifier of a [`Membership`](super::Membership).
    MembershipId
);
entity_id!(
    /// Identifier of an [`Invitation`](super::Invitation).
    InvitationId
);
entity_id!(
    /// Identifier of a [`Store`](super::Store).
    StoreId
);
entity_id!(
    /// Identifier of a [`Product`](super::Product).
    ProductId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(WarehouseId::new(), WarehouseId::new());
    }

    #[test]
    fn test_id_parse_and_display() {
        let id = StoreId::new();
        let parsed: StoreId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<StoreId>().is_err());
    }

    #[test]
    fn test_id_serializes_as_plain_uuid() {
        let raw = Uuid::new_v4();
        let json = serde_json::to_string(&ProductId::from_uuid(raw)).unwrap();
        assert_eq!(json, format!("\"{}\"", raw));
    }
}
