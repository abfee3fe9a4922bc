//! Deferred work for Warehub.
//!
//! Product writes commit first and then schedule search-vector regeneration
//! through [`TaskQueue::run_async`]; nobody waits on the result.
//!
//! ```text
//!  product write ──► TaskQueue (bounded mpsc) ──► EmbeddingWorker ──► Embedder
//!                      │                                 │
//!                      └─ per-product generation ◄───────┘ skip if superseded
//!                                                        └─► TenantStore + SearchProvider
//! ```
//!
//! Vectors lost to a dropped task are recovered by [`backfill_embeddings`];
//! the in-process index is reloaded after a restart by
//! [`reindex_stored_vectors`].

mod backfill;
mod embedding;
mod queue;
mod worker;

pub use backfill::{backfill_embeddings, reindex_stored_vectors, BackfillReport};
pub use embedding::{EmbeddingOutcome, EmbeddingPipeline};
pub use queue::{BackgroundTask, QueueStats, TaskQueue, TaskReceiver};
pub use worker::{EmbeddingWorker, WorkerConfig, WorkerHandle, WorkerStats};
