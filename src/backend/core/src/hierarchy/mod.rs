//! Warehouse → Store → Product lifecycle.
//!
//! Every mutation is gated by the [`AuthorizationGuard`]; products resolve
//! their store to find the warehouse whose membership is checked. Deletes
//! cascade lowest level first inside one store transaction, then the
//! derived state outside the store is cleaned up best-effort:
//!
//! ```text
//!  delete_warehouse ─► TenantStore::delete_warehouse_cascade  (atomic, re-runnable)
//!                         │
//!                         ├─► SearchProvider::remove   per removed product
//!                         ├─► ObjectStorage::delete    per orphaned image
//!                         └─► TaskQueue::forget        per removed product
//! ```

mod products;
mod retry;
mod stores;
mod warehouses;

pub use retry::CascadeRetry;

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::db::{CascadeReport, TenantStore, WarehouseTotals};
use crate::error::{Result, WarehubError};
use crate::jobs::TaskQueue;
use crate::models::{Store, StoreId, User, WarehouseId};
use crate::rbac::{AuthorizationGuard, Permission};
use crate::search::SearchProvider;
use crate::storage::{ObjectStorage, StorageRef};
use crate::telemetry::CascadeMetrics;

/// Guarded structural operations over the tenant hierarchy.
#[derive(Clone)]
pub struct HierarchyService {
    store: Arc<dyn TenantStore>,
    guard: AuthorizationGuard,
    storage: Arc<dyn ObjectStorage>,
    search: Arc<dyn SearchProvider>,
    queue: TaskQueue,
    retry: CascadeRetry,
}

/// Aggregates for a single store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreTotals {
    pub product_count: u64,
}

impl HierarchyService {
    pub fn new(
        store: Arc<dyn TenantStore>,
        storage: Arc<dyn ObjectStorage>,
        search: Arc<dyn SearchProvider>,
        queue: TaskQueue,
    ) -> Self {
        Self {
            guard: AuthorizationGuard::new(store.clone()),
            store,
            storage,
            search,
            queue,
            retry: CascadeRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: CascadeRetry) -> Self {
        self.retry = retry;
        self
    }

    /// Load a store and require `permission` on its warehouse.
    async fn guarded_store(&self, actor: &User, store_id: StoreId, permission: Permission) -> Result<Store> {
        let store = self
            .store
            .get_store(store_id)
            .await?
            .ok_or_else(|| WarehubError::store_not_found(store_id))?;
        self.guard
            .require_permission(actor.id, store.warehouse_id, permission)
            .await?;
        Ok(store)
    }

    /// Post-commit cleanup of state the store transaction cannot reach.
    async fn after_cascade(&self, report: &CascadeReport) {
        CascadeMetrics::record(report);

        for product_id in &report.product_ids {
            self.queue.forget(*product_id);
            if let Err(err) = self.search.remove(*product_id).await {
                warn!(product_id = %product_id, error = %err, "failed to remove product from search index");
            }
        }
        for image in &report.image_refs {
            self.discard_image(image).await;
        }
    }

    /// Best-effort delete; a failure never fails the triggering write.
    async fn discard_image(&self, image: &StorageRef) {
        match self.storage.delete(image).await {
            Ok(()) => debug!(image_ref = %image, "image deleted"),
            Err(err) => warn!(image_ref = %image, error = %err, "failed to delete image"),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Aggregates
    // ─────────────────────────────────────────────────────────────────────────

    /// Store count, product count and total item quantity, computed on read.
    /// `None` unless `actor` holds `stores:view` on the warehouse.
    pub async fn warehouse_totals(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
    ) -> Result<Option<WarehouseTotals>> {
        if !self
            .guard
            .check_permission(actor.id, warehouse_id, Permission::StoresView)
            .await?
        {
            return Ok(None);
        }
        Ok(Some(self.store.warehouse_totals(warehouse_id).await?))
    }

    /// `None` when the store is missing or `actor` lacks `inventory:view` on it.
    pub async fn store_totals(&self, actor: &User, store_id: StoreId) -> Result<Option<StoreTotals>> {
        let Some(store) = self.store.get_store(store_id).await? else {
            return Ok(None);
        };
        if !self
            .guard
            .check_permission(actor.id, store.warehouse_id, Permission::InventoryView)
            .await?
        {
            return Ok(None);
        }
        Ok(Some(StoreTotals {
            product_count: self.store.store_product_count(store_id).await?,
        }))
    }
}
