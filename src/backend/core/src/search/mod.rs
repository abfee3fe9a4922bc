//! Semantic search collaborators.
//!
//! - **Embedder**: turns product/query text into a fixed-width vector
//! - **SearchProvider**: approximate nearest-neighbour index filtered by store
//!
//! Both are consumed as black boxes. The in-process implementations here
//! back tests and single-node deployments.

mod embedder;
mod index;

pub use embedder::HashingEmbedder;
pub use index::InMemoryVectorIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{ProductId, StoreId};

/// Width of every search vector.
pub const EMBEDDING_DIMENSIONS: usize = 768;

/// One result from a provider query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub product_id: ProductId,
    pub score: f32,
}

/// Nearest-neighbour index over product vectors.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Top `top_k` products of `store_filter` closest to `vector`, best first.
    async fn query(&self, vector: &[f32], store_filter: StoreId, top_k: usize) -> Result<Vec<SearchHit>>;

    /// Insert or replace the vector for a product.
    async fn upsert(&self, product_id: ProductId, store_id: StoreId, vector: Vec<f32>) -> Result<()>;

    /// Drop a product from the index. Missing products are ignored.
    async fn remove(&self, product_id: ProductId) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Text → vector model.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;
}
