//! In-memory vector index with exact cosine ranking.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{SearchHit, SearchProvider};
use crate::error::{Result, WarehubError};
use crate::models::{ProductId, StoreId};

#[derive(Debug, Clone)]
struct IndexedVector {
    store_id: StoreId,
    vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: Arc<DashMap<ProductId, IndexedVector>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.entries.contains_key(&product_id)
    }

    fn check_width(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimensions {
            return Err(WarehubError::search_provider(format!(
                "vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(())
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

#[async_trait]
impl SearchProvider for InMemoryVectorIndex {
    async fn query(&self, vector: &[f32], store_filter: StoreId, top_k: usize) -> Result<Vec<SearchHit>> {
        self.check_width(vector)?;

        let mut hits: Vec<SearchHit> = self
            .entries
            .iter()
            .filter(|e| e.value().store_id == store_filter)
            .map(|e| SearchHit {
                product_id: *e.key(),
                score: cosine_similarity(vector, &e.value().vector),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, product_id: ProductId, store_id: StoreId, vector: Vec<f32>) -> Result<()> {
        self.check_width(&vector)?;
        self.entries.insert(product_id, IndexedVector { store_id, vector });
        Ok(())
    }

    async fn remove(&self, product_id: ProductId) -> Result<()> {
        self.entries.remove(&product_id);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
