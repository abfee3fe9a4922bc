//! Persistence layer for Warehub.
//!
//! [`TenantStore`] is the transactional seam every service talks to. Each
//! method is one unit of work: multi-row operations (warehouse creation,
//! invitation acceptance, cascades) either apply completely or not at all.
//!
//! Two backends are provided:
//! - [`MemoryStore`]: all tables behind one lock; used by tests and
//!   single-node deployments
//! - [`PgStore`]: PostgreSQL through sqlx, with uniqueness enforced by
//!   constraints (see `migrations/`)

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{
    Acceptance, Invitation, InvitationId, Membership, Product, ProductId, Store, StoreId, User,
    UserId, UserProfile, Warehouse, WarehouseId,
};
use crate::rbac::Role;
use crate::storage::StorageRef;

// ═══════════════════════════════════════════════════════════════════════════════
// Unit-of-work results
// ═══════════════════════════════════════════════════════════════════════════════

/// Rows removed by a cascading delete.
///
/// Deleting rows that are already gone is a no-op, so running a cascade twice
/// yields an empty report the second time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CascadeReport {
    pub warehouses: u64,
    pub stores: u64,
    pub products: u64,
    pub memberships: u64,
    pub invitations: u64,
    /// Products removed, for index cleanup.
    pub product_ids: Vec<ProductId>,
    /// Images orphaned by the removed products.
    pub image_refs: Vec<StorageRef>,
}

impl CascadeReport {
    pub fn is_empty(&self) -> bool {
        self.warehouses == 0
            && self.stores == 0
            && self.products == 0
            && self.memberships == 0
            && self.invitations == 0
    }

    pub(crate) fn absorb_product(&mut self, product: Product) {
        self.products += 1;
        self.product_ids.push(product.id);
        if let Some(image) = product.image_ref {
            self.image_refs.push(image);
        }
    }
}

/// A deleted user and the memberships removed with them.
#[derive(Debug, Clone)]
pub struct UserRemoval {
    pub user: User,
    pub memberships: Vec<Membership>,
}

/// Read-time aggregates for one warehouse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarehouseTotals {
    pub store_count: u64,
    pub product_count: u64,
    /// Sum of `quantity` over every product under the warehouse.
    pub total_items: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Transactional document store with the indexed lookups the engine needs.
///
/// Implementations must enforce two uniqueness rules themselves rather than
/// relying on callers' pre-checks:
/// - one membership per `(warehouse_id, user_id)` → `AlreadyMember`
/// - one *pending* invitation per `(email, warehouse_id)` → `InvitationAlreadyPending`
#[async_trait]
pub trait TenantStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or update the user keyed by `external_auth_id`.
    async fn upsert_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<User>;

    /// Delete a user and their memberships. `None` if no such user.
    async fn delete_user(&self, external_auth_id: &str) -> Result<Option<UserRemoval>>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    async fn find_user_by_external_id(&self, external_auth_id: &str) -> Result<Option<User>>;

    /// Lookup by normalised e-mail.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Warehouses
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a warehouse together with its first owner membership.
    async fn create_warehouse(&self, warehouse: &Warehouse, owner: &Membership) -> Result<()>;

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>>;

    /// Persist name/description. `false` if the warehouse is gone.
    async fn update_warehouse(&self, warehouse: &Warehouse) -> Result<bool>;

    /// Memberships, invitations, products, stores, then the warehouse row.
    async fn delete_warehouse_cascade(&self, id: WarehouseId) -> Result<CascadeReport>;

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_membership(&self, warehouse_id: WarehouseId, user_id: UserId) -> Result<Option<Membership>>;

    /// Ordered by `joined_at`.
    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>>;

    /// Ordered by `joined_at`.
    async fn memberships_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Membership>>;

    /// Change a member's role. With `protect_last_owner`, demoting the only
    /// owner fails with `LastOwner`.
    async fn change_role(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        role: Role,
        protect_last_owner: bool,
    ) -> Result<Membership>;

    /// Remove a member. With `protect_last_owner`, removing the only owner
    /// fails with `LastOwner`.
    async fn remove_membership(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        protect_last_owner: bool,
    ) -> Result<Membership>;

    // ─────────────────────────────────────────────────────────────────────────
    // Invitations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a pending invitation, first purging terminal-state invitations
    /// for the same `(email, warehouse_id)`. Returns how many were purged.
    async fn create_invitation(&self, invitation: &Invitation) -> Result<u64>;

    async fn get_invitation(&self, id: InvitationId) -> Result<Option<Invitation>>;

    async fn pending_invitations_for_email(&self, email: &str) -> Result<Vec<Invitation>>;

    async fn invitations_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Invitation>>;

    /// Insert the membership and mark the invitation accepted, atomically.
    async fn accept_invitation(&self, acceptance: &Acceptance) -> Result<Membership>;

    /// Mark a pending invitation declined.
    async fn decline_invitation(&self, id: InvitationId) -> Result<Invitation>;

    /// Delete regardless of status. `false` if already gone.
    async fn delete_invitation(&self, id: InvitationId) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Stores
    // ─────────────────────────────────────────────────────────────────────────

    /// Fails with `WarehouseNotFound` when the parent is missing.
    async fn insert_store(&self, store: &Store) -> Result<()>;

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>>;

    async fn update_store(&self, store: &Store) -> Result<bool>;

    /// Ordered by `created_at`.
    async fn stores_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Store>>;

    /// Products first, then the store row.
    async fn delete_store_cascade(&self, id: StoreId) -> Result<CascadeReport>;

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    /// Fails with `StoreNotFound` when the parent is missing.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Persist every column except the search vector.
    async fn update_product(&self, product: &Product) -> Result<bool>;

    /// Ordered by `created_at`.
    async fn products_for_store(&self, store_id: StoreId) -> Result<Vec<Product>>;

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// `false` if the product no longer exists.
    async fn set_product_vector(&self, id: ProductId, vector: &[f32]) -> Result<bool>;

    async fn products_missing_vector(&self, limit: usize) -> Result<Vec<Product>>;

    /// Products that already carry a vector, ordered by id, starting after
    /// `after`. Used to reload an in-process index.
    async fn products_with_vector(&self, after: Option<ProductId>, limit: usize) -> Result<Vec<Product>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    /// Computed on read; no denormalised counters.
    async fn warehouse_totals(&self, warehouse_id: WarehouseId) -> Result<WarehouseTotals>;

    async fn store_product_count(&self, store_id: StoreId) -> Result<u64>;

    /// Get the backend name.
    fn name(&self) -> &'static str;
}
