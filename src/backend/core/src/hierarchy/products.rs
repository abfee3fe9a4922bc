use chrono::Utc;
use tracing::{info, warn};

use super::HierarchyService;
use crate::db::CascadeReport;
use crate::error::{Result, WarehubError};
use crate::models::{NewProduct, Product, ProductId, ProductUpdate, Store, StoreId, User};
use crate::rbac::Permission;
use crate::telemetry::CascadeMetrics;

impl HierarchyService {
    /// Load a product and its store, requiring `permission` on the warehouse
    /// the store belongs to.
    async fn guarded_product(
        &self,
        actor: &User,
        product_id: ProductId,
        permission: Permission,
    ) -> Result<(Product, Store)> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| WarehubError::product_not_found(product_id))?;
        let store = self
            .guarded_store(actor, product.store_id, permission)
            .await?;
        Ok((product, store))
    }

    /// Create a product and schedule its search vector.
    pub async fn create_product(
        &self,
        actor: &User,
        store_id: StoreId,
        input: NewProduct,
    ) -> Result<Product> {
        let store = self
            .guarded_store(actor, store_id, Permission::InventoryCreate)
            .await?;
        input.validate()?;

        let product = input.into_product(store.id, Utc::now());
        self.store.insert_product(&product).await?;
        self.queue.schedule_embedding(product.id);

        info!(
            product_id = %product.id,
            store_id = %store.id,
            warehouse_id = %store.warehouse_id,
            sku = %product.sku,
            "product created"
        );
        Ok(product)
    }

    /// Patch a product. Text changes reschedule the search vector; a
    /// replaced or removed image is deleted from object storage.
    pub async fn update_product(
        &self,
        actor: &User,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product> {
        let (mut product, store) = self
            .guarded_product(actor, id, Permission::InventoryUpdate)
            .await?;
        update.validate()?;

        let replaced_image = update.apply(&mut product, Utc::now());
        if !self.store.update_product(&product).await? {
            return Err(WarehubError::product_not_found(id));
        }

        if update.touches_search_text() {
            self.queue.schedule_embedding(id);
        }
        if let Some(image) = replaced_image {
            self.discard_image(&image).await;
        }

        info!(
            product_id = %id,
            store_id = %store.id,
            warehouse_id = %store.warehouse_id,
            "product updated"
        );
        Ok(product)
    }

    pub async fn delete_product(&self, actor: &User, id: ProductId) -> Result<Product> {
        let (_, store) = self
            .guarded_product(actor, id, Permission::InventoryDelete)
            .await?;

        let Some(product) = self.store.delete_product(id).await? else {
            return Err(WarehubError::product_not_found(id));
        };

        let mut report = CascadeReport::default();
        report.absorb_product(product.clone());
        CascadeMetrics::record(&report);

        self.queue.forget(id);
        if let Err(err) = self.search.remove(id).await {
            warn!(product_id = %id, error = %err, "failed to remove product from search index");
        }
        if let Some(image) = &product.image_ref {
            self.discard_image(image).await;
        }

        info!(
            product_id = %id,
            store_id = %store.id,
            warehouse_id = %store.warehouse_id,
            "product deleted"
        );
        Ok(product)
    }
}
