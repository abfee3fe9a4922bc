use chrono::Utc;
use tracing::info;

use super::HierarchyService;
use crate::db::CascadeReport;
use crate::error::{Result, WarehubError};
use crate::models::{NewStore, Store, StoreId, StoreUpdate, User, WarehouseId};
use crate::rbac::Permission;

impl HierarchyService {
    pub async fn create_store(
        &self,
        actor: &User,
        warehouse_id: WarehouseId,
        input: NewStore,
    ) -> Result<Store> {
        self.guard
            .require_permission(actor.id, warehouse_id, Permission::StoresCreate)
            .await?;
        input.validate()?;

        let store = Store {
            id: StoreId::new(),
            warehouse_id,
            name: input.name.trim().to_string(),
            store_type: input.store_type,
            created_at: Utc::now(),
        };
        self.store.insert_store(&store).await?;

        info!(
            store_id = %store.id,
            warehouse_id = %warehouse_id,
            store_type = %store.store_type,
            "store created"
        );
        Ok(store)
    }

    pub async fn update_store(&self, actor: &User, id: StoreId, update: StoreUpdate) -> Result<Store> {
        let mut store = self.guarded_store(actor, id, Permission::StoresUpdate).await?;
        update.validate()?;
        update.apply(&mut store);
        if !self.store.update_store(&store).await? {
            return Err(WarehubError::store_not_found(id));
        }

        info!(store_id = %id, warehouse_id = %store.warehouse_id, "store updated");
        Ok(store)
    }

    /// Delete a store and all of its products.
    pub async fn delete_store(&self, actor: &User, id: StoreId) -> Result<CascadeReport> {
        let store = self.guarded_store(actor, id, Permission::StoresDelete).await?;

        let report = self
            .retry
            .run("delete_store", move || self.store.delete_store_cascade(id))
            .await?;
        self.after_cascade(&report).await;

        info!(
            store_id = %id,
            warehouse_id = %store.warehouse_id,
            products = report.products,
            "store deleted"
        );
        Ok(report)
    }
}
