//! Search-vector regeneration for a single product.

use std::sync::Arc;
use tracing::debug;

use crate::db::TenantStore;
use crate::error::{Result, WarehubError};
use crate::models::{Product, ProductId};
use crate::search::{Embedder, SearchProvider};

/// What a regeneration attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingOutcome {
    /// Vector stored and pushed to the index.
    Written,
    /// A newer regeneration for the product was scheduled.
    Superseded,
    /// The product was deleted before the vector could be stored.
    Vanished,
}

impl EmbeddingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Superseded => "superseded",
            Self::Vanished => "vanished",
        }
    }
}

/// Embedder, product store and index wired together.
#[derive(Clone)]
pub struct EmbeddingPipeline {
    store: Arc<dyn TenantStore>,
    embedder: Arc<dyn Embedder>,
    provider: Arc<dyn SearchProvider>,
}

impl EmbeddingPipeline {
    pub fn new(
        store: Arc<dyn TenantStore>,
        embedder: Arc<dyn Embedder>,
        provider: Arc<dyn SearchProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            provider,
        }
    }

    pub fn store(&self) -> &Arc<dyn TenantStore> {
        &self.store
    }

    /// Embed the product's current text, store the vector and index it.
    pub async fn regenerate(&self, product_id: ProductId) -> Result<EmbeddingOutcome> {
        let Some(product) = self.store.get_product(product_id).await? else {
            return Ok(EmbeddingOutcome::Vanished);
        };

        let vector = self.embedder.embed(&product.embedding_text()).await?;
        if vector.len() != self.embedder.dimensions() {
            return Err(WarehubError::embedding(format!(
                "embedder returned {} dimensions, expected {}",
                vector.len(),
                self.embedder.dimensions()
            )));
        }

        if !self.store.set_product_vector(product_id, &vector).await? {
            return Ok(EmbeddingOutcome::Vanished);
        }
        self.provider
            .upsert(product_id, product.store_id, vector)
            .await?;

        // A delete that committed after the vector write has already cleaned
        // the index; undo the entry this upsert put back.
        if self.store.get_product(product_id).await?.is_none() {
            self.provider.remove(product_id).await?;
            debug!(product_id = %product_id, "product deleted during regeneration");
            return Ok(EmbeddingOutcome::Vanished);
        }

        debug!(product_id = %product_id, store_id = %product.store_id, "search vector written");
        Ok(EmbeddingOutcome::Written)
    }

    /// Load a product's stored vector into the provider without re-embedding.
    /// Returns `false` when the product carries no vector.
    pub async fn reindex(&self, product: &Product) -> Result<bool> {
        let Some(vector) = product.search_vector.clone().filter(|v| !v.is_empty()) else {
            return Ok(false);
        };
        self.provider.upsert(product.id, product.store_id, vector).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Membership, NewProduct, Store, StoreId, StoreType, UserProfile, Warehouse, WarehouseId};
    use crate::search::{HashingEmbedder, InMemoryVectorIndex, SearchHit, EMBEDDING_DIMENSIONS};
    use async_trait::async_trait;
    use chrono::Utc;

    /// Deletes the product (the way a concurrent cascade would) while its
    /// vector is being upserted, then cleans the index like the cascade does.
    struct DeletingIndex {
        store: Arc<MemoryStore>,
        inner: Arc<InMemoryVectorIndex>,
    }

    #[async_trait]
    impl SearchProvider for DeletingIndex {
        async fn query(&self, vector: &[f32], store_filter: StoreId, top_k: usize) -> Result<Vec<SearchHit>> {
            self.inner.query(vector, store_filter, top_k).await
        }

        async fn upsert(&self, product_id: ProductId, store_id: StoreId, vector: Vec<f32>) -> Result<()> {
            self.store.delete_product(product_id).await?;
            self.inner.remove(product_id).await?;
            self.inner.upsert(product_id, store_id, vector).await
        }

        async fn remove(&self, product_id: ProductId) -> Result<()> {
            self.inner.remove(product_id).await
        }

        fn name(&self) -> &'static str {
            "deleting"
        }
    }

    async fn product_in(store: &MemoryStore) -> Product {
        let user = store
            .upsert_user(&UserProfile::new("u", "U", "u@x.com"), Utc::now())
            .await
            .unwrap();
        let warehouse = Warehouse {
            id: WarehouseId::new(),
            name: "W".into(),
            description: String::new(),
            created_by: user.id,
            created_at: Utc::now(),
        };
        store
            .create_warehouse(&warehouse, &Membership::owner(warehouse.id, user.id, Utc::now()))
            .await
            .unwrap();
        let shop = Store {
            id: StoreId::new(),
            warehouse_id: warehouse.id,
            name: "S".into(),
            store_type: StoreType::Electric,
            created_at: Utc::now(),
        };
        store.insert_store(&shop).await.unwrap();
        let product = NewProduct::new("Breaker", "BR-1", 3).into_product(shop.id, Utc::now());
        store.insert_product(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn test_regenerate_writes_vector_and_indexes() {
        let store = Arc::new(MemoryStore::new());
        let product = product_in(&store).await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline = EmbeddingPipeline::new(store.clone(), Arc::new(HashingEmbedder::default()), index.clone());

        assert_eq!(pipeline.regenerate(product.id).await.unwrap(), EmbeddingOutcome::Written);
        assert!(index.contains(product.id));
        let stored = store.get_product(product.id).await.unwrap().unwrap();
        assert!(stored.has_search_vector());
    }

    #[tokio::test]
    async fn test_delete_during_upsert_leaves_no_index_entry() {
        let store = Arc::new(MemoryStore::new());
        let product = product_in(&store).await;
        let inner = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let provider = Arc::new(DeletingIndex {
            store: store.clone(),
            inner: inner.clone(),
        });
        let pipeline = EmbeddingPipeline::new(store.clone(), Arc::new(HashingEmbedder::default()), provider);

        assert_eq!(pipeline.regenerate(product.id).await.unwrap(), EmbeddingOutcome::Vanished);
        assert!(store.get_product(product.id).await.unwrap().is_none());
        assert!(!inner.contains(product.id));
        assert_eq!(inner.len(), 0);
    }

    #[tokio::test]
    async fn test_reindex_skips_products_without_vector() {
        let store = Arc::new(MemoryStore::new());
        let product = product_in(&store).await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline = EmbeddingPipeline::new(store.clone(), Arc::new(HashingEmbedder::default()), index.clone());

        assert!(!pipeline.reindex(&product).await.unwrap());
        assert!(index.is_empty());
    }
}
