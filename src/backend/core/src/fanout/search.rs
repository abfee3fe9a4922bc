//! Semantic product search across the caller's stores.

use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use super::{FanoutService, ProductView};
use crate::error::Result;
use crate::models::{Store, StoreId, User, Warehouse};
use crate::rbac::Permission;
use crate::search::SearchHit;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    #[serde(flatten)]
    pub product: ProductView,
    pub score: f32,
}

impl FanoutService {
    /// Search every store the caller can read inventory in.
    ///
    /// Hits are concatenated in membership → store order, not re-ranked
    /// across stores. The first hit for a product wins and the result is
    /// cut at the configured cap.
    pub async fn semantic_search(&self, actor: &User, query: &str) -> Result<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || self.limits.result_cap == 0 {
            return Ok(Vec::new());
        }

        let stores = self.accessible_stores(actor, Permission::InventoryView).await?;
        if stores.is_empty() {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed(query).await?;

        let hits = self.query_stores(&vector, &stores).await;
        let by_id: HashMap<StoreId, &(Warehouse, Store)> =
            stores.iter().map(|entry| (entry.1.id, entry)).collect();

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for (store_id, hit) in hits {
            if results.len() >= self.limits.result_cap {
                break;
            }
            if !seen.insert(hit.product_id) {
                continue;
            }
            let Some(product) = self.store.get_product(hit.product_id).await? else {
                debug!(product_id = %hit.product_id, "search hit for deleted product dropped");
                continue;
            };
            // The index is keyed by store; trust the row, not the hit.
            let Some((warehouse, store)) = by_id.get(&product.store_id).copied() else {
                debug!(product_id = %product.id, store_id = %store_id, "search hit outside accessible stores dropped");
                continue;
            };
            let product = self.product_view(product, store, warehouse).await;
            results.push(SearchResult {
                product,
                score: hit.score,
            });
        }

        debug!(
            user_id = %actor.id,
            stores = stores.len(),
            results = results.len(),
            "semantic search finished"
        );
        Ok(results)
    }

    /// Per-store provider queries, `concurrency` at a time, in store order.
    /// A failing store contributes nothing.
    async fn query_stores(
        &self,
        vector: &[f32],
        stores: &[(Warehouse, Store)],
    ) -> Vec<(StoreId, SearchHit)> {
        let mut hits = Vec::new();
        for chunk in stores.chunks(self.limits.concurrency) {
            let queries = chunk.iter().map(|(_, store)| async move {
                let result = self
                    .search
                    .query(vector, store.id, self.limits.per_store_top_k)
                    .await;
                (store.id, result)
            });
            for (store_id, result) in join_all(queries).await {
                match result {
                    Ok(store_hits) => hits.extend(store_hits.into_iter().map(|h| (store_id, h))),
                    Err(err) => warn!(
                        store_id = %store_id,
                        provider = self.search.name(),
                        error = %err,
                        "search provider failed for store"
                    ),
                }
            }
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::World;
    use super::super::FanoutLimits;
    use crate::error::{Result, WarehubError};
    use crate::models::{NewProduct, NewStore, NewWarehouse, ProductId, StoreId, StoreType};
    use crate::search::{SearchHit, SearchProvider};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// Provider returning canned hits per store.
    #[derive(Default)]
    struct ScriptedProvider {
        hits: Mutex<HashMap<StoreId, Vec<SearchHit>>>,
        failing: Mutex<Vec<StoreId>>,
    }

    impl ScriptedProvider {
        fn script(&self, store: StoreId, products: &[ProductId]) {
            let hits = products
                .iter()
                .enumerate()
                .map(|(i, id)| SearchHit {
                    product_id: *id,
                    score: 1.0 - i as f32 * 0.1,
                })
                .collect();
            self.hits.lock().insert(store, hits);
        }
    }

    #[async_trait]
    impl SearchProvider for ScriptedProvider {
        async fn query(&self, _vector: &[f32], store: StoreId, top_k: usize) -> Result<Vec<SearchHit>> {
            if self.failing.lock().contains(&store) {
                return Err(WarehubError::search_provider("scripted failure"));
            }
            let mut hits = self.hits.lock().get(&store).cloned().unwrap_or_default();
            hits.truncate(top_k);
            Ok(hits)
        }

        async fn upsert(&self, _: ProductId, _: StoreId, _: Vec<f32>) -> Result<()> {
            Ok(())
        }

        async fn remove(&self, _: ProductId) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn two_stores(w: &World, owner: &crate::models::User) -> (StoreId, StoreId, ProductId, ProductId) {
        let warehouse = w
            .hierarchy
            .create_warehouse(owner, NewWarehouse::new("W", ""))
            .await
            .unwrap();
        let s1 = w
            .hierarchy
            .create_store(owner, warehouse.id, NewStore::new("S1", StoreType::Electric))
            .await
            .unwrap();
        let s2 = w
            .hierarchy
            .create_store(owner, warehouse.id, NewStore::new("S2", StoreType::Electric))
            .await
            .unwrap();
        let p = w
            .hierarchy
            .create_product(owner, s1.id, NewProduct::new("Breaker", "B-1", 1))
            .await
            .unwrap();
        let q = w
            .hierarchy
            .create_product(owner, s2.id, NewProduct::new("Switch", "S-1", 1))
            .await
            .unwrap();
        (s1.id, s2.id, p.id, q.id)
    }

    #[tokio::test]
    async fn test_duplicate_hits_collapse() {
        let provider = Arc::new(ScriptedProvider::default());
        let w = World::with_search(Some(provider.clone()), FanoutLimits::default());
        let owner = w.user("owner").await;
        let (s1, s2, p, q) = two_stores(&w, &owner).await;
        provider.script(s1, &[p]);
        provider.script(s2, &[p, q]);

        let results = w.fanout.semantic_search(&owner, "breaker").await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.product.product.id).collect();
        assert_eq!(ids, vec![p, q]);
        assert_eq!(results[0].product.store_name, "S1");
    }

    #[tokio::test]
    async fn test_empty_query_returns_nothing() {
        let provider = Arc::new(ScriptedProvider::default());
        let w = World::with_search(Some(provider.clone()), FanoutLimits::default());
        let owner = w.user("owner").await;
        let (s1, _, p, _) = two_stores(&w, &owner).await;
        provider.script(s1, &[p]);

        assert!(w.fanout.semantic_search(&owner, "   ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_store_is_skipped() {
        let provider = Arc::new(ScriptedProvider::default());
        let w = World::with_search(Some(provider.clone()), FanoutLimits::default());
        let owner = w.user("owner").await;
        let (s1, s2, p, q) = two_stores(&w, &owner).await;
        provider.script(s1, &[p]);
        provider.script(s2, &[q]);
        provider.failing.lock().push(s1);

        let results = w.fanout.semantic_search(&owner, "switch").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].product.product.id, q);
    }

    #[tokio::test]
    async fn test_result_cap_and_dead_hits() {
        let provider = Arc::new(ScriptedProvider::default());
        let limits = FanoutLimits {
            result_cap: 1,
            ..FanoutLimits::default()
        };
        let w = World::with_search(Some(provider.clone()), limits);
        let owner = w.user("owner").await;
        let (s1, s2, p, q) = two_stores(&w, &owner).await;
        provider.script(s1, &[ProductId::new(), p]);
        provider.script(s2, &[q]);

        let results = w.fanout.semantic_search(&owner, "anything").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].product.product.id, p);
    }

    #[tokio::test]
    async fn test_outsider_gets_nothing() {
        let provider = Arc::new(ScriptedProvider::default());
        let w = World::with_search(Some(provider.clone()), FanoutLimits::default());
        let owner = w.user("owner").await;
        let outsider = w.user("outsider").await;
        let (s1, _, p, _) = two_stores(&w, &owner).await;
        provider.script(s1, &[p]);

        assert!(w.fanout.semantic_search(&outsider, "breaker").await.unwrap().is_empty());
    }
}
