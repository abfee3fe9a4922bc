//! Domain entities of the warehouse → store → product hierarchy.
//!
//! Ownership is by containment; no row is shared between two parents.

mod ids;
mod inventory;
mod tenancy;

pub use ids::{InvitationId, MembershipId, ProductId, StoreId, UserId, WarehouseId};
pub use inventory::{
    AlertThresholds, NewProduct, NewStore, Product, ProductUpdate, Store, StoreType, StoreUpdate,
    DEFAULT_PRICE, DEFAULT_UNIT,
};
pub use tenancy::{
    normalize_email, Acceptance, Invitation, InvitationStatus, Membership, NewWarehouse, User,
    UserProfile, Warehouse, WarehouseUpdate,
};
