//! Process-local [`TenantStore`].
//!
//! Every table lives behind a single `RwLock`, so each trait method is one
//! critical section and therefore atomic. The lock is never held across an
//! `.await`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{CascadeReport, TenantStore, UserRemoval, WarehouseTotals};
use crate::error::{ErrorCode, Result, WarehubError};
use crate::models::{
    normalize_email, Acceptance, Invitation, InvitationId, InvitationStatus, Membership,
    MembershipId, Product, ProductId, Store, StoreId, User, UserId, UserProfile, Warehouse,
    WarehouseId,
};
use crate::rbac::Role;

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    users_by_external: HashMap<String, UserId>,
    users_by_email: HashMap<String, UserId>,

    warehouses: HashMap<WarehouseId, Warehouse>,

    memberships: HashMap<MembershipId, Membership>,
    membership_by_pair: HashMap<(WarehouseId, UserId), MembershipId>,

    invitations: HashMap<InvitationId, Invitation>,
    /// Only pending invitations are indexed here.
    pending_invites: HashMap<(String, WarehouseId), InvitationId>,

    stores: HashMap<StoreId, Store>,
    products: HashMap<ProductId, Product>,
}

impl Tables {
    fn owner_count(&self, warehouse_id: WarehouseId) -> usize {
        self.memberships
            .values()
            .filter(|m| m.warehouse_id == warehouse_id && m.role == Role::Owner)
            .count()
    }

    fn remove_membership_row(&mut self, id: MembershipId) -> Option<Membership> {
        let membership = self.memberships.remove(&id)?;
        self.membership_by_pair
            .remove(&(membership.warehouse_id, membership.user_id));
        Some(membership)
    }

    fn remove_invitation_row(&mut self, id: InvitationId) -> Option<Invitation> {
        let invitation = self.invitations.remove(&id)?;
        let key = (invitation.email.clone(), invitation.warehouse_id);
        if self.pending_invites.get(&key) == Some(&id) {
            self.pending_invites.remove(&key);
        }
        Some(invitation)
    }

    fn remove_store_rows(&mut self, store_id: StoreId, report: &mut CascadeReport) {
        let product_ids: Vec<ProductId> = self
            .products
            .values()
            .filter(|p| p.store_id == store_id)
            .map(|p| p.id)
            .collect();
        for id in product_ids {
            if let Some(product) = self.products.remove(&id) {
                report.absorb_product(product);
            }
        }
        if self.stores.remove(&store_id).is_some() {
            report.stores += 1;
        }
    }

    fn index_user(&mut self, user: &User) {
        self.users_by_external
            .insert(user.external_auth_id.clone(), user.id);
        if !user.email.is_empty() {
            self.users_by_email.insert(user.email.clone(), user.id);
        }
    }

    fn email_taken_by_other(&self, email: &str, user_id: Option<UserId>) -> bool {
        !email.is_empty()
            && self
                .users_by_email
                .get(email)
                .is_some_and(|owner| Some(*owner) != user_id)
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| key(row));
    rows
}

fn duplicate_email() -> WarehubError {
    WarehubError::new(
        ErrorCode::DuplicateRecord,
        "Another user already has this email address",
    )
}

/// In-memory tenant store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.tables.read().users.len()
    }

    /// Rows of every kind that reference `warehouse_id`, directly or through
    /// a store. Zero after a successful cascade.
    pub fn residue_for_warehouse(&self, warehouse_id: WarehouseId) -> usize {
        let tables = self.tables.read();
        let store_ids: Vec<StoreId> = tables
            .stores
            .values()
            .filter(|s| s.warehouse_id == warehouse_id)
            .map(|s| s.id)
            .collect();
        let products = tables
            .products
            .values()
            .filter(|p| store_ids.contains(&p.store_id))
            .count();
        let memberships = tables
            .memberships
            .values()
            .filter(|m| m.warehouse_id == warehouse_id)
            .count();
        let invitations = tables
            .invitations
            .values()
            .filter(|i| i.warehouse_id == warehouse_id)
            .count();
        let warehouse = usize::from(tables.warehouses.contains_key(&warehouse_id));
        warehouse + store_ids.len() + products + memberships + invitations
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Users
    // ─────────────────────────────────────────────────────────────────────────

    async fn upsert_user(&self, profile: &UserProfile, now: DateTime<Utc>) -> Result<User> {
        let mut tables = self.tables.write();
        let email = normalize_email(&profile.email);

        if let Some(id) = tables.users_by_external.get(&profile.external_auth_id).copied() {
            if tables.email_taken_by_other(&email, Some(id)) {
                return Err(duplicate_email());
            }
            let previous_email = tables.users.get(&id).map(|u| u.email.clone());
            if let Some(old) = previous_email.filter(|old| *old != email) {
                tables.users_by_email.remove(&old);
            }
            let user = tables
                .users
                .get_mut(&id)
                .ok_or_else(|| WarehubError::user_not_found(id))?;
            user.name = profile.name.clone();
            user.email = email;
            let user = user.clone();
            tables.index_user(&user);
            return Ok(user);
        }

        if tables.email_taken_by_other(&email, None) {
            return Err(duplicate_email());
        }
        let user = User {
            id: UserId::new(),
            external_auth_id: profile.external_auth_id.clone(),
            name: profile.name.clone(),
            email,
            created_at: now,
        };
        tables.index_user(&user);
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn delete_user(&self, external_auth_id: &str) -> Result<Option<UserRemoval>> {
        let mut tables = self.tables.write();
        let Some(id) = tables.users_by_external.remove(external_auth_id) else {
            return Ok(None);
        };
        let Some(user) = tables.users.remove(&id) else {
            return Ok(None);
        };
        if tables.users_by_email.get(&user.email) == Some(&id) {
            tables.users_by_email.remove(&user.email);
        }

        let membership_ids: Vec<MembershipId> = tables
            .memberships
            .values()
            .filter(|m| m.user_id == id)
            .map(|m| m.id)
            .collect();
        let memberships = membership_ids
            .into_iter()
            .filter_map(|mid| tables.remove_membership_row(mid))
            .collect();

        Ok(Some(UserRemoval { user, memberships }))
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().users.get(&id).cloned())
    }

    async fn find_user_by_external_id(&self, external_auth_id: &str) -> Result<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users_by_external
            .get(external_auth_id)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let tables = self.tables.read();
        Ok(tables
            .users_by_email
            .get(&normalize_email(email))
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Warehouses
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_warehouse(&self, warehouse: &Warehouse, owner: &Membership) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.warehouses.contains_key(&warehouse.id) {
            return Err(WarehubError::new(
                ErrorCode::DuplicateRecord,
                "A record with this identifier already exists",
            ));
        }
        if !tables.users.contains_key(&owner.user_id) {
            return Err(WarehubError::user_not_found(owner.user_id));
        }
        tables.warehouses.insert(warehouse.id, warehouse.clone());
        tables
            .membership_by_pair
            .insert((owner.warehouse_id, owner.user_id), owner.id);
        tables.memberships.insert(owner.id, owner.clone());
        Ok(())
    }

    async fn get_warehouse(&self, id: WarehouseId) -> Result<Option<Warehouse>> {
        Ok(self.tables.read().warehouses.get(&id).cloned())
    }

    async fn update_warehouse(&self, warehouse: &Warehouse) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.warehouses.get_mut(&warehouse.id) {
            Some(row) => {
                row.name = warehouse.name.clone();
                row.description = warehouse.description.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_warehouse_cascade(&self, id: WarehouseId) -> Result<CascadeReport> {
        let mut tables = self.tables.write();
        let mut report = CascadeReport::default();

        let membership_ids: Vec<MembershipId> = tables
            .memberships
            .values()
            .filter(|m| m.warehouse_id == id)
            .map(|m| m.id)
            .collect();
        for mid in membership_ids {
            if tables.remove_membership_row(mid).is_some() {
                report.memberships += 1;
            }
        }

        let invitation_ids: Vec<InvitationId> = tables
            .invitations
            .values()
            .filter(|i| i.warehouse_id == id)
            .map(|i| i.id)
            .collect();
        for iid in invitation_ids {
            if tables.remove_invitation_row(iid).is_some() {
                report.invitations += 1;
            }
        }

        let store_ids: Vec<StoreId> = tables
            .stores
            .values()
            .filter(|s| s.warehouse_id == id)
            .map(|s| s.id)
            .collect();
        for sid in store_ids {
            tables.remove_store_rows(sid, &mut report);
        }

        if tables.warehouses.remove(&id).is_some() {
            report.warehouses = 1;
        }
        debug!(warehouse_id = %id, products = report.products, "memory cascade applied");
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Memberships
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_membership(&self, warehouse_id: WarehouseId, user_id: UserId) -> Result<Option<Membership>> {
        let tables = self.tables.read();
        Ok(tables
            .membership_by_pair
            .get(&(warehouse_id, user_id))
            .and_then(|id| tables.memberships.get(id))
            .cloned())
    }

    async fn memberships_for_user(&self, user_id: UserId) -> Result<Vec<Membership>> {
        let tables = self.tables.read();
        let rows = tables
            .memberships
            .values()
            .filter(|m| m.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |m: &Membership| (m.joined_at, m.id)))
    }

    async fn memberships_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Membership>> {
        let tables = self.tables.read();
        let rows = tables
            .memberships
            .values()
            .filter(|m| m.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |m: &Membership| (m.joined_at, m.id)))
    }

    async fn change_role(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        role: Role,
        protect_last_owner: bool,
    ) -> Result<Membership> {
        let mut tables = self.tables.write();
        let id = tables
            .membership_by_pair
            .get(&(warehouse_id, user_id))
            .copied()
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;
        let current = tables
            .memberships
            .get(&id)
            .map(|m| m.role)
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;

        if protect_last_owner
            && current == Role::Owner
            && role != Role::Owner
            && tables.owner_count(warehouse_id) <= 1
        {
            return Err(WarehubError::last_owner(warehouse_id));
        }

        let membership = tables
            .memberships
            .get_mut(&id)
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;
        membership.role = role;
        Ok(membership.clone())
    }

    async fn remove_membership(
        &self,
        warehouse_id: WarehouseId,
        user_id: UserId,
        protect_last_owner: bool,
    ) -> Result<Membership> {
        let mut tables = self.tables.write();
        let id = tables
            .membership_by_pair
            .get(&(warehouse_id, user_id))
            .copied()
            .ok_or_else(|| WarehubError::membership_not_found(user_id))?;
        let is_owner = tables
            .memberships
            .get(&id)
            .is_some_and(|m| m.role == Role::Owner);

        if protect_last_owner && is_owner && tables.owner_count(warehouse_id) <= 1 {
            return Err(WarehubError::last_owner(warehouse_id));
        }

        tables
            .remove_membership_row(id)
            .ok_or_else(|| WarehubError::membership_not_found(user_id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Invitations
    // ─────────────────────────────────────────────────────────────────────────

    async fn create_invitation(&self, invitation: &Invitation) -> Result<u64> {
        let mut tables = self.tables.write();
        if !tables.warehouses.contains_key(&invitation.warehouse_id) {
            return Err(WarehubError::warehouse_not_found(invitation.warehouse_id));
        }
        let key = (invitation.email.clone(), invitation.warehouse_id);
        if tables.pending_invites.contains_key(&key) {
            return Err(WarehubError::invitation_already_pending(invitation.warehouse_id));
        }

        let stale: Vec<InvitationId> = tables
            .invitations
            .values()
            .filter(|i| {
                i.warehouse_id == invitation.warehouse_id
                    && i.email == invitation.email
                    && i.status.is_terminal()
            })
            .map(|i| i.id)
            .collect();
        let purged = stale
            .into_iter()
            .filter_map(|id| tables.remove_invitation_row(id))
            .count() as u64;

        if invitation.status == InvitationStatus::Pending {
            tables.pending_invites.insert(key, invitation.id);
        }
        tables.invitations.insert(invitation.id, invitation.clone());
        Ok(purged)
    }

    async fn get_invitation(&self, id: InvitationId) -> Result<Option<Invitation>> {
        Ok(self.tables.read().invitations.get(&id).cloned())
    }

    async fn pending_invitations_for_email(&self, email: &str) -> Result<Vec<Invitation>> {
        let email = normalize_email(email);
        let tables = self.tables.read();
        let rows = tables
            .pending_invites
            .iter()
            .filter(|((e, _), _)| *e == email)
            .filter_map(|(_, id)| tables.invitations.get(id))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |i: &Invitation| (i.invited_at, i.id)))
    }

    async fn invitations_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Invitation>> {
        let tables = self.tables.read();
        let rows = tables
            .invitations
            .values()
            .filter(|i| i.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |i: &Invitation| (i.invited_at, i.id)))
    }

    async fn accept_invitation(&self, acceptance: &Acceptance) -> Result<Membership> {
        let mut tables = self.tables.write();
        let invitation = tables
            .invitations
            .get(&acceptance.invitation_id)
            .cloned()
            .ok_or_else(|| WarehubError::invitation_not_found(acceptance.invitation_id))?;
        if invitation.status != InvitationStatus::Pending {
            return Err(WarehubError::invitation_not_pending(invitation.status));
        }
        let pair = (invitation.warehouse_id, acceptance.user_id);
        if tables.membership_by_pair.contains_key(&pair) {
            return Err(WarehubError::already_member(invitation.warehouse_id));
        }

        let membership = Membership {
            id: acceptance.membership_id,
            warehouse_id: invitation.warehouse_id,
            user_id: acceptance.user_id,
            role: invitation.role,
            invited_by: Some(invitation.invited_by),
            joined_at: acceptance.joined_at,
        };
        tables.membership_by_pair.insert(pair, membership.id);
        tables.memberships.insert(membership.id, membership.clone());

        tables
            .pending_invites
            .remove(&(invitation.email.clone(), invitation.warehouse_id));
        if let Some(row) = tables.invitations.get_mut(&invitation.id) {
            row.status = InvitationStatus::Accepted;
        }
        Ok(membership)
    }

    async fn decline_invitation(&self, id: InvitationId) -> Result<Invitation> {
        let mut tables = self.tables.write();
        let row = tables
            .invitations
            .get_mut(&id)
            .ok_or_else(|| WarehubError::invitation_not_found(id))?;
        if row.status != InvitationStatus::Pending {
            return Err(WarehubError::invitation_not_pending(row.status));
        }
        row.status = InvitationStatus::Declined;
        let declined = row.clone();
        tables
            .pending_invites
            .remove(&(declined.email.clone(), declined.warehouse_id));
        Ok(declined)
    }

    async fn delete_invitation(&self, id: InvitationId) -> Result<bool> {
        Ok(self.tables.write().remove_invitation_row(id).is_some())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Stores
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_store(&self, store: &Store) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.warehouses.contains_key(&store.warehouse_id) {
            return Err(WarehubError::warehouse_not_found(store.warehouse_id));
        }
        tables.stores.insert(store.id, store.clone());
        Ok(())
    }

    async fn get_store(&self, id: StoreId) -> Result<Option<Store>> {
        Ok(self.tables.read().stores.get(&id).cloned())
    }

    async fn update_store(&self, store: &Store) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.stores.get_mut(&store.id) {
            Some(row) => {
                row.name = store.name.clone();
                row.store_type = store.store_type;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stores_for_warehouse(&self, warehouse_id: WarehouseId) -> Result<Vec<Store>> {
        let tables = self.tables.read();
        let rows = tables
            .stores
            .values()
            .filter(|s| s.warehouse_id == warehouse_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |s: &Store| (s.created_at, s.id)))
    }

    async fn delete_store_cascade(&self, id: StoreId) -> Result<CascadeReport> {
        let mut tables = self.tables.write();
        let mut report = CascadeReport::default();
        tables.remove_store_rows(id, &mut report);
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Products
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.stores.contains_key(&product.store_id) {
            return Err(WarehubError::store_not_found(product.store_id));
        }
        tables.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().products.get(&id).cloned())
    }

    async fn update_product(&self, product: &Product) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.products.get_mut(&product.id) {
            Some(row) => {
                let vector = row.search_vector.take();
                *row = Product {
                    search_vector: vector,
                    ..product.clone()
                };
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn products_for_store(&self, store_id: StoreId) -> Result<Vec<Product>> {
        let tables = self.tables.read();
        let rows = tables
            .products
            .values()
            .filter(|p| p.store_id == store_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |p: &Product| (p.created_at, p.id)))
    }

    async fn delete_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.write().products.remove(&id))
    }

    async fn set_product_vector(&self, id: ProductId, vector: &[f32]) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.products.get_mut(&id) {
            Some(row) => {
                row.search_vector = Some(vector.to_vec());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn products_missing_vector(&self, limit: usize) -> Result<Vec<Product>> {
        let tables = self.tables.read();
        let rows = tables
            .products
            .values()
            .filter(|p| !p.has_search_vector())
            .cloned()
            .collect();
        let mut rows = sorted_by(rows, |p: &Product| (p.created_at, p.id));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn products_with_vector(&self, after: Option<ProductId>, limit: usize) -> Result<Vec<Product>> {
        let tables = self.tables.read();
        let rows = tables
            .products
            .values()
            .filter(|p| p.has_search_vector() && after.map_or(true, |a| p.id > a))
            .cloned()
            .collect();
        let mut rows = sorted_by(rows, |p: &Product| p.id);
        rows.truncate(limit);
        Ok(rows)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    async fn warehouse_totals(&self, warehouse_id: WarehouseId) -> Result<WarehouseTotals> {
        let tables = self.tables.read();
        let store_ids: Vec<StoreId> = tables
            .stores
            .values()
            .filter(|s| s.warehouse_id == warehouse_id)
            .map(|s| s.id)
            .collect();
        let (product_count, total_items) = tables
            .products
            .values()
            .filter(|p| store_ids.contains(&p.store_id))
            .fold((0u64, 0i64), |(count, items), p| {
                (count + 1, items.saturating_add(p.quantity))
            });
        Ok(WarehouseTotals {
            store_count: store_ids.len() as u64,
            product_count,
            total_items,
        })
    }

    async fn store_product_count(&self, store_id: StoreId) -> Result<u64> {
        Ok(self
            .tables
            .read()
            .products
            .values()
            .filter(|p| p.store_id == store_id)
            .count() as u64)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewProduct, StoreType};

    async fn seeded() -> (MemoryStore, User, Warehouse) {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = store
            .upsert_user(&UserProfile::new("ext_a", "Alice", "alice@example.com"), now)
            .await
            .unwrap();
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "Main".into(),
            description: String::new(),
            created_by: user.id,
            created_at: now,
        };
        store
            .create_warehouse(&warehouse, &Membership::owner(warehouse.id, user.id, now))
            .await
            .unwrap();
        (store, user, warehouse)
    }

    #[tokio::test]
    async fn test_upsert_user_updates_in_place() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let first = store
            .upsert_user(&UserProfile::new("ext_1", "Old", "old@example.com"), now)
            .await
            .unwrap();
        let second = store
            .upsert_user(&UserProfile::new("ext_1", "New", "New@Example.com"), now)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.name, "New");
        assert_eq!(second.email, "new@example.com");
        assert_eq!(store.user_count(), 1);
        assert!(store.find_user_by_email("old@example.com").await.unwrap().is_none());
        assert!(store.find_user_by_email("NEW@example.com").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_upsert_rejects_email_of_other_user() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_user(&UserProfile::new("ext_1", "A", "same@example.com"), now)
            .await
            .unwrap();
        let err = store
            .upsert_user(&UserProfile::new("ext_2", "B", "same@example.com"), now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DuplicateRecord);
    }

    #[tokio::test]
    async fn test_pending_invitation_unique_per_pair() {
        let (store, user, warehouse) = seeded().await;
        let now = Utc::now();
        let first = Invitation::pending(warehouse.id, "b@example.com", Role::Staff, user.id, now);
        store.create_invitation(&first).await.unwrap();

        let again = Invitation::pending(warehouse.id, "B@example.com", Role::Manager, user.id, now);
        let err = store.create_invitation(&again).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvitationAlreadyPending);

        store.decline_invitation(first.id).await.unwrap();
        let purged = store.create_invitation(&again).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_invitation(first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_accept_twice_fails_not_pending() {
        let (store, owner, warehouse) = seeded().await;
        let now = Utc::now();
        let invitee = store
            .upsert_user(&UserProfile::new("ext_b", "Bob", "bob@example.com"), now)
            .await
            .unwrap();
        let invitation = Invitation::pending(warehouse.id, &invitee.email, Role::Staff, owner.id, now);
        store.create_invitation(&invitation).await.unwrap();

        let acceptance = Acceptance {
            invitation_id: invitation.id,
            membership_id: MembershipId::new(),
            user_id: invitee.id,
            joined_at: now,
        };
        let membership = store.accept_invitation(&acceptance).await.unwrap();
        assert_eq!(membership.role, Role::Staff);
        assert_eq!(membership.invited_by, Some(owner.id));

        let err = store.accept_invitation(&acceptance).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvitationNotPending);
        assert_eq!(store.memberships_for_warehouse(warehouse.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_last_owner_protected() {
        let (store, owner, warehouse) = seeded().await;
        let err = store
            .change_role(warehouse.id, owner.id, Role::Staff, true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LastOwner);
        let err = store
            .remove_membership(warehouse.id, owner.id, true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::LastOwner);

        let demoted = store
            .change_role(warehouse.id, owner.id, Role::Staff, false)
            .await
            .unwrap();
        assert_eq!(demoted.role, Role::Staff);
    }

    #[tokio::test]
    async fn test_warehouse_cascade_is_complete_and_idempotent() {
        let (store, user, warehouse) = seeded().await;
        let now = Utc::now();
        let shop = Store {
            id: StoreId::new(),
            warehouse_id: warehouse.id,
            name: "Pipes".into(),
            store_type: StoreType::Plumbing,
            created_at: now,
        };
        store.insert_store(&shop).await.unwrap();
        for sku in ["P-1", "P-2"] {
            let product = NewProduct::new("Pipe", sku, 3).into_product(shop.id, now);
            store.insert_product(&product).await.unwrap();
        }
        let invite = Invitation::pending(warehouse.id, "c@example.com", Role::Staff, user.id, now);
        store.create_invitation(&invite).await.unwrap();

        let report = store.delete_warehouse_cascade(warehouse.id).await.unwrap();
        assert_eq!(report.warehouses, 1);
        assert_eq!(report.stores, 1);
        assert_eq!(report.products, 2);
        assert_eq!(report.memberships, 1);
        assert_eq!(report.invitations, 1);
        assert_eq!(store.residue_for_warehouse(warehouse.id), 0);

        let again = store.delete_warehouse_cascade(warehouse.id).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_update_product_keeps_vector() {
        let (store, _, warehouse) = seeded().await;
        let now = Utc::now();
        let shop = Store {
            id: StoreId::new(),
            warehouse_id: warehouse.id,
            name: "Wires".into(),
            store_type: StoreType::Electric,
            created_at: now,
        };
        store.insert_store(&shop).await.unwrap();
        let mut product = NewProduct::new("Cable", "C-1", 1).into_product(shop.id, now);
        store.insert_product(&product).await.unwrap();
        store.set_product_vector(product.id, &[1.0, 0.0]).await.unwrap();

        product.quantity = 9;
        assert!(store.update_product(&product).await.unwrap());
        let row = store.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(row.quantity, 9);
        assert!(row.has_search_vector());
        assert!(store.products_missing_vector(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_store_requires_warehouse() {
        let store = MemoryStore::new();
        let orphan = Store {
            id: StoreId::new(),
            warehouse_id: WarehouseId::new(),
            name: "Nowhere".into(),
            store_type: StoreType::Chemical,
            created_at: Utc::now(),
        };
        let err = store.insert_store(&orphan).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::WarehouseNotFound);
    }
}
