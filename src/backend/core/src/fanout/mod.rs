//! Tenant-scoped reads.
//!
//! Every read starts from the caller's memberships: warehouses are resolved
//! from them, stores from the warehouses, products from the stores. Nothing
//! outside that set is ever returned, and a by-id read of something outside
//! it comes back as `None` rather than an error so tenant existence does not
//! leak.

mod search;

pub use search::SearchResult;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{FanoutConfig, SearchConfig};
use crate::db::TenantStore;
use crate::error::Result;
use crate::models::{
    Membership, Product, ProductId, Store, StoreId, User, Warehouse, WarehouseId,
};
use crate::rbac::{AuthorizationGuard, Permission, Role};
use crate::search::{Embedder, SearchProvider};
use crate::storage::ObjectStorage;
use crate::telemetry::FanoutMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════════════════════════

/// One of the caller's memberships, for the "my access" table.
#[derive(Debug, Clone, Serialize)]
pub struct MembershipView {
    pub warehouse_id: WarehouseId,
    pub warehouse_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseView {
    #[serde(flatten)]
    pub warehouse: Warehouse,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreView {
    #[serde(flatten)]
    pub store: Store,
    pub warehouse_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    #[serde(flatten)]
    pub product: Product,
    pub store_name: String,
    pub warehouse_name: String,
    pub image_url: Option<String>,
}

/// Limits applied to every fan-out.
#[derive(Debug, Clone, Copy)]
pub struct FanoutLimits {
    /// Hard cap on stores visited by one read
    pub max_stores: usize,
    /// Per-store search queries in flight at once
    pub concurrency: usize,
    pub result_cap: usize,
    pub per_store_top_k: usize,
}

impl Default for FanoutLimits {
    fn default() -> Self {
        Self::new(&FanoutConfig::default(), &SearchConfig::default())
    }
}

impl FanoutLimits {
    pub fn new(fanout: &FanoutConfig, search: &SearchConfig) -> Self {
        Self {
            max_stores: fanout.max_stores,
            concurrency: fanout.concurrency.max(1),
            result_cap: search.result_cap,
            per_store_top_k: search.per_store_top_k,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Service
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct FanoutService {
    store: Arc<dyn TenantStore>,
    guard: AuthorizationGuard,
    storage: Arc<dyn ObjectStorage>,
    search: Arc<dyn SearchProvider>,
    embedder: Arc<dyn Embedder>,
    limits: FanoutLimits,
}

impl FanoutService {
    pub fn new(
        store: Arc<dyn TenantStore>,
        storage: Arc<dyn ObjectStorage>,
        search: Arc<dyn SearchProvider>,
        embedder: Arc<dyn Embedder>,
        limits: FanoutLimits,
    ) -> Self {
        Self {
            guard: AuthorizationGuard::new(store.clone()),
            store,
            storage,
            search,
            embedder,
            limits,
        }
    }

    /// The caller's memberships with their warehouses, in join order.
    /// Memberships whose warehouse vanished are skipped.
    async fn accessible_warehouses(&self, actor: &User) -> Result<Vec<(Membership, Warehouse)>> {
        let memberships = self.store.memberships_for_user(actor.id).await?;
        let mut resolved = Vec::with_capacity(memberships.len());
        for membership in memberships {
            if let Some(warehouse) = self.store.get_warehouse(membership.warehouse_id).await? {
                resolved.push((membership, warehouse));
            }
        }
        Ok(resolved)
    }

    /// Stores the caller may read with `permission`, capped at `max_stores`.
    async fn accessible_stores(
        &self,
        actor: &User,
        permission: Permission,
    ) -> Result<Vec<(Warehouse, Store)>> {
        let mut stores = Vec::new();
        'warehouses: for (_, warehouse) in self.accessible_warehouses(actor).await? {
            if !self.guard.check_permission(actor.id, warehouse.id, permission).await? {
                continue;
            }
            for store in self.store.stores_for_warehouse(warehouse.id).await? {
                if stores.len() >= self.limits.max_stores {
                    warn!(
                        user_id = %actor.id,
                        max_stores = self.limits.max_stores,
                        "fan-out truncated at store cap"
                    );
                    break 'warehouses;
                }
                stores.push((warehouse.clone(), store));
            }
        }
        FanoutMetrics::record_breadth(stores.len());
        debug!(user_id = %actor.id, stores = stores.len(), "fan-out resolved");
        Ok(stores)
    }

    /// Resolve an image reference, logging and hiding storage failures.
    async fn image_url(&self, product: &Product) -> Option<String> {
        let image = product.image_ref.as_ref()?;
        match self.storage.get_url(image).await {
            Ok(url) => url,
            Err(err) => {
                warn!(product_id = %product.id, image_ref = %image, error = %err, "failed to resolve image url");
                None
            }
        }
    }

    async fn product_view(&self, product: Product, store: &Store, warehouse: &Warehouse) -> ProductView {
        let image_url = self.image_url(&product).await;
        ProductView {
            product,
            store_name: store.name.clone(),
            warehouse_name: warehouse.name.clone(),
            image_url,
        }
    }

    /// Store and warehouse for a store the caller can read with `permission`.
    async fn readable_store(
        &self,
        actor: &User,
        store_id: StoreId,
        permission: Permission,
    ) -> Result<Option<(Store, Warehouse)>> {
        let Some(store) = self.store.get_store(store_id).await? else {
            return Ok(None);
        };
        if !self
            .guard
            .check_permission(actor.id, store.warehouse_id, permission)
            .await?
        {
            return Ok(None);
        }
        Ok(self
            .store
            .get_warehouse(store.warehouse_id)
            .await?
            .map(|warehouse| (store, warehouse)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // "Everything I can see"
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn my_memberships(&self, actor: &User) -> Result<Vec<MembershipView>> {
        Ok(self
            .accessible_warehouses(actor)
            .await?
            .into_iter()
            .map(|(membership, warehouse)| MembershipView {
                warehouse_id: warehouse.id,
                warehouse_name: warehouse.name,
                role: membership.role,
                joined_at: membership.joined_at,
            })
            .collect())
    }

    pub async fn my_warehouses(&self, actor: &User) -> Result<Vec<WarehouseView>> {
        Ok(self
            .accessible_warehouses(actor)
            .await?
            .into_iter()
            .map(|(membership, warehouse)| WarehouseView {
                warehouse,
                role: membership.role,
            })
            .collect())
    }

    pub async fn my_stores(&self, actor: &User) -> Result<Vec<StoreView>> {
        Ok(self
            .accessible_stores(actor, Permission::StoresView)
            .await?
            .into_iter()
            .map(|(warehouse, store)| StoreView {
                store,
                warehouse_name: warehouse.name,
            })
            .collect())
    }

    pub async fn my_products(&self, actor: &User) -> Result<Vec<ProductView>> {
        let mut products = Vec::new();
        for (warehouse, store) in self.accessible_stores(actor, Permission::InventoryView).await? {
            for product in self.store.products_for_store(store.id).await? {
                products.push(self.product_view(product, &store, &warehouse).await);
            }
        }
        Ok(products)
    }

    /// Case-insensitive exact name match among the caller's warehouses.
    pub async fn find_warehouse_by_name(&self, actor: &User, name: &str) -> Result<Option<Warehouse>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .accessible_warehouses(actor)
            .await?
            .into_iter()
            .map(|(_, warehouse)| warehouse)
            .find(|w| w.name.trim().to_lowercase() == wanted))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // By-id reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Any membership can see its warehouse; every role holds `stores:view`.
    pub async fn get_warehouse(&self, actor: &User, id: WarehouseId) -> Result<Option<Warehouse>> {
        if !self
            .guard
            .check_permission(actor.id, id, Permission::StoresView)
            .await?
        {
            return Ok(None);
        }
        self.store.get_warehouse(id).await
    }

    pub async fn get_store(&self, actor: &User, id: StoreId) -> Result<Option<StoreView>> {
        Ok(self
            .readable_store(actor, id, Permission::StoresView)
            .await?
            .map(|(store, warehouse)| StoreView {
                store,
                warehouse_name: warehouse.name,
            }))
    }

    pub async fn get_product(&self, actor: &User, id: ProductId) -> Result<Option<ProductView>> {
        let Some(product) = self.store.get_product(id).await? else {
            return Ok(None);
        };
        let Some((store, warehouse)) = self
            .readable_store(actor, product.store_id, Permission::InventoryView)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(self.product_view(product, &store, &warehouse).await))
    }

    /// Stores of one warehouse; empty unless the caller holds `stores:view` there.
    pub async fn list_stores(&self, actor: &User, warehouse_id: WarehouseId) -> Result<Vec<Store>> {
        if !self
            .guard
            .check_permission(actor.id, warehouse_id, Permission::StoresView)
            .await?
        {
            return Ok(Vec::new());
        }
        self.store.stores_for_warehouse(warehouse_id).await
    }

    /// Products of one store; empty unless the caller holds `inventory:view` on it.
    pub async fn list_products(&self, actor: &User, store_id: StoreId) -> Result<Vec<ProductView>> {
        let Some((store, warehouse)) = self
            .readable_store(actor, store_id, Permission::InventoryView)
            .await?
        else {
            return Ok(Vec::new());
        };
        let mut views = Vec::new();
        for product in self.store.products_for_store(store.id).await? {
            views.push(self.product_view(product, &store, &warehouse).await);
        }
        Ok(views)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::MemoryStore;
    use crate::hierarchy::HierarchyService;
    use crate::jobs::{TaskQueue, TaskReceiver};
    use crate::membership::MembershipService;
    use crate::models::UserProfile;
    use crate::search::{HashingEmbedder, InMemoryVectorIndex, EMBEDDING_DIMENSIONS};
    use crate::storage::InMemoryObjectStorage;

    pub(crate) struct World {
        pub store: Arc<MemoryStore>,
        pub index: Arc<InMemoryVectorIndex>,
        pub hierarchy: HierarchyService,
        pub members: MembershipService,
        pub fanout: FanoutService,
        pub _tasks: TaskReceiver,
    }

    impl World {
        pub(crate) fn with_search(search: Option<Arc<dyn SearchProvider>>, limits: FanoutLimits) -> Self {
            let store = Arc::new(MemoryStore::new());
            let storage = Arc::new(InMemoryObjectStorage::default());
            let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
            let search: Arc<dyn SearchProvider> = match search {
                Some(search) => search,
                None => index.clone(),
            };
            let (queue, tasks) = TaskQueue::bounded(256);
            Self {
                hierarchy: HierarchyService::new(store.clone(), storage.clone(), index.clone(), queue),
                members: MembershipService::new(store.clone(), true),
                fanout: FanoutService::new(
                    store.clone(),
                    storage,
                    search,
                    Arc::new(HashingEmbedder::default()),
                    limits,
                ),
                store,
                index,
                _tasks: tasks,
            }
        }

        pub(crate) fn new() -> Self {
            Self::with_search(None, FanoutLimits::default())
        }

        pub(crate) async fn user(&self, ext: &str) -> User {
            self.store
                .upsert_user(
                    &UserProfile::new(ext, ext, format!("{ext}@example.com")),
                    Utc::now(),
                )
                .await
                .unwrap()
        }
    }
}
