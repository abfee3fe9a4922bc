use chrono::Utc;
use tracing::info;

use super::HierarchyService;
use crate::db::CascadeReport;
use crate::error::{Result, WarehubError};
use crate::models::{Membership, NewWarehouse, User, Warehouse, WarehouseId, WarehouseUpdate};
use crate::rbac::Permission;

impl HierarchyService {
    /// Create a warehouse owned by `actor`. The owner membership is written
    /// in the same unit of work.
    pub async fn create_warehouse(&self, actor: &User, input: NewWarehouse) -> Result<Warehouse> {
        input.validate()?;
        let now = Utc::now();
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: input.name.trim().to_string(),
            description: input.description,
            created_by: actor.id,
            created_at: now,
        };
        let owner = Membership::owner(warehouse.id, actor.id, now);
        self.store.create_warehouse(&warehouse, &owner).await?;

        info!(
            warehouse_id = %warehouse.id,
            created_by = %actor.id,
            "warehouse created"
        );
        Ok(warehouse)
    }

    pub async fn update_warehouse(
        &self,
        actor: &User,
        id: WarehouseId,
        update: WarehouseUpdate,
    ) -> Result<Warehouse> {
        self.guard
            .require_permission(actor.id, id, Permission::WarehouseUpdate)
            .await?;
        update.validate()?;

        let mut warehouse = self
            .store
            .get_warehouse(id)
            .await?
            .ok_or_else(|| WarehubError::warehouse_not_found(id))?;
        update.apply(&mut warehouse);
        if !self.store.update_warehouse(&warehouse).await? {
            return Err(WarehubError::warehouse_not_found(id));
        }

        info!(warehouse_id = %id, updated_by = %actor.id, "warehouse updated");
        Ok(warehouse)
    }

    /// Delete a warehouse with every store, product, membership and invitation under it.
    pub async fn delete_warehouse(&self, actor: &User, id: WarehouseId) -> Result<CascadeReport> {
        self.guard
            .require_permission(actor.id, id, Permission::WarehouseDelete)
            .await?;

        let report = self
            .retry
            .run("delete_warehouse", move || self.store.delete_warehouse_cascade(id))
            .await?;
        self.after_cascade(&report).await;

        info!(
            warehouse_id = %id,
            deleted_by = %actor.id,
            stores = report.stores,
            products = report.products,
            memberships = report.memberships,
            invitations = report.invitations,
            "warehouse deleted"
        );
        Ok(report)
    }
}
