//! One-shot regeneration of missing search vectors.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

use super::{EmbeddingOutcome, EmbeddingPipeline};
use crate::error::Result;

/// Result of a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Products that received a vector.
    pub processed: u64,
    pub errors: u64,
}

/// Generate vectors for every product that lacks one.
///
/// Each product is attempted at most once per run. Products that failed
/// stay in the missing set, so each page is over-fetched by the number
/// already attempted and those are skipped.
pub async fn backfill_embeddings(
    pipeline: &EmbeddingPipeline,
    batch_size: usize,
) -> Result<BackfillReport> {
    let batch_size = batch_size.max(1);
    let mut report = BackfillReport::default();
    let mut attempted = HashSet::new();

    loop {
        let limit = attempted.len().saturating_add(batch_size);
        let fresh: Vec<_> = pipeline
            .store()
            .products_missing_vector(limit)
            .await?
            .into_iter()
            .filter(|p| !attempted.contains(&p.id))
            .take(batch_size)
            .collect();
        if fresh.is_empty() {
            break;
        }

        for product in fresh {
            attempted.insert(product.id);
            match pipeline.regenerate(product.id).await {
                Ok(EmbeddingOutcome::Written) => report.processed += 1,
                Ok(_) => {}
                Err(err) => {
                    report.errors += 1;
                    warn!(product_id = %product.id, error = %err, "backfill failed for product");
                }
            }
        }
    }

    info!(
        processed = report.processed,
        errors = report.errors,
        "embedding backfill finished"
    );
    Ok(report)
}

/// Push every stored vector into the pipeline's search provider.
///
/// An in-process index starts empty; this reloads it from the vectors
/// already persisted so products embedded before a restart stay searchable.
/// Returns the number of products indexed.
pub async fn reindex_stored_vectors(pipeline: &EmbeddingPipeline, batch_size: usize) -> Result<u64> {
    let batch_size = batch_size.max(1);
    let mut indexed = 0u64;
    let mut after = None;

    loop {
        let batch = pipeline
            .store()
            .products_with_vector(after, batch_size)
            .await?;
        let Some(last) = batch.last() else {
            break;
        };
        after = Some(last.id);

        for product in &batch {
            if pipeline.reindex(product).await? {
                indexed += 1;
            }
        }
        if batch.len() < batch_size {
            break;
        }
    }

    info!(indexed, "search index reloaded from stored vectors");
    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TenantStore};
    use crate::error::WarehubError;
    use crate::models::{Membership, NewProduct, Store, StoreId, StoreType, UserProfile, Warehouse, WarehouseId};
    use crate::search::{Embedder, HashingEmbedder, InMemoryVectorIndex, EMBEDDING_DIMENSIONS};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Arc;

    /// Refuses any text mentioning "broken".
    struct PickyEmbedder(HashingEmbedder);

    #[async_trait]
    impl Embedder for PickyEmbedder {
        async fn embed(&self, text: &str) -> crate::error::Result<Vec<f32>> {
            if text.to_lowercase().contains("broken") {
                return Err(WarehubError::embedding("model rejected input"));
            }
            self.0.embed(text).await
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions()
        }
    }

    async fn seeded(names: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
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
            store_type: StoreType::Plumbing,
            created_at: Utc::now(),
        };
        store.insert_store(&shop).await.unwrap();
        let base = Utc::now();
        for (i, name) in names.iter().enumerate() {
            let created_at = base + chrono::Duration::seconds(i as i64);
            let product = NewProduct::new(*name, format!("P-{i}"), 1).into_product(shop.id, created_at);
            store.insert_product(&product).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_backfill_fills_every_missing_vector() {
        let store = seeded(&["Pipe 0", "Pipe 1", "Pipe 2", "Pipe 3", "Pipe 4"]).await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline =
            EmbeddingPipeline::new(store.clone(), Arc::new(HashingEmbedder::default()), index.clone());

        let report = backfill_embeddings(&pipeline, 2).await.unwrap();
        assert_eq!(report, BackfillReport { processed: 5, errors: 0 });
        assert_eq!(index.len(), 5);
        assert!(store.products_missing_vector(10).await.unwrap().is_empty());

        let again = backfill_embeddings(&pipeline, 2).await.unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn test_backfill_reaches_products_behind_a_full_page_of_failures() {
        // Both failing rows sort ahead of the good one and fill a whole page.
        let store = seeded(&["Broken valve", "Broken tap", "Copper elbow"]).await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline = EmbeddingPipeline::new(
            store.clone(),
            Arc::new(PickyEmbedder(HashingEmbedder::default())),
            index.clone(),
        );

        let report = backfill_embeddings(&pipeline, 2).await.unwrap();
        assert_eq!(report, BackfillReport { processed: 1, errors: 2 });
        assert_eq!(index.len(), 1);
        assert_eq!(store.products_missing_vector(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_reindex_restores_vectors_into_a_fresh_index() {
        let store = seeded(&["Pipe 0", "Pipe 1", "Pipe 2"]).await;
        let embedder = Arc::new(HashingEmbedder::default());
        let before_restart = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline = EmbeddingPipeline::new(store.clone(), embedder.clone(), before_restart.clone());
        backfill_embeddings(&pipeline, 10).await.unwrap();

        let after_restart = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let pipeline = EmbeddingPipeline::new(store.clone(), embedder, after_restart.clone());
        // Nothing is missing, so a backfill alone leaves the new index empty.
        assert_eq!(backfill_embeddings(&pipeline, 10).await.unwrap().processed, 0);
        assert_eq!(after_restart.len(), 0);

        assert_eq!(reindex_stored_vectors(&pipeline, 2).await.unwrap(), 3);
        assert_eq!(after_restart.len(), 3);
        for product in store.products_with_vector(None, 10).await.unwrap() {
            assert!(after_restart.contains(product.id));
        }
    }
}
