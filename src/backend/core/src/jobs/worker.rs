//! Embedding worker consuming the task queue.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{BackgroundTask, EmbeddingOutcome, EmbeddingPipeline, TaskQueue, TaskReceiver};
use crate::config::WorkerSettings;
use crate::telemetry::EmbeddingJobMetrics;

/// Configuration for the embedding worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Maximum concurrent task executions
    pub concurrency: usize,
    /// How long shutdown waits for in-flight tasks
    pub shutdown_timeout: Duration,
    /// Worker name/identifier
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            shutdown_timeout: settings.shutdown_timeout,
            name: settings.name.clone(),
        }
    }
}

/// Statistics for the embedding worker.
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    pub processed: Arc<AtomicU64>,
    pub written: Arc<AtomicU64>,
    pub skipped: Arc<AtomicU64>,
    pub failed: Arc<AtomicU64>,
    pub active: Arc<AtomicU64>,
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Superseded or vanished tasks.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn active(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    stats: WorkerStats,
    join: JoinHandle<()>,
    timeout: Duration,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// Signal shutdown and wait for in-flight tasks, up to the configured timeout.
    pub async fn stop(self) {
        self.shutdown();
        if tokio::time::timeout(self.timeout, self.join).await.is_err() {
            warn!("embedding worker did not stop within timeout");
        }
    }
}

/// Worker that regenerates search vectors for queued products.
pub struct EmbeddingWorker {
    config: WorkerConfig,
    stats: WorkerStats,
    pipeline: EmbeddingPipeline,
    queue: TaskQueue,
}

impl EmbeddingWorker {
    pub fn new(config: WorkerConfig, pipeline: EmbeddingPipeline, queue: TaskQueue) -> Self {
        Self {
            config,
            stats: WorkerStats::new(),
            pipeline,
            queue,
        }
    }

    /// Start the worker, returning a handle for control.
    pub fn start(self, mut receiver: TaskReceiver) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let timeout = self.config.shutdown_timeout;
        let worker = Arc::new(self);

        let join = tokio::spawn(async move {
            let concurrency = worker.config.concurrency;
            let semaphore = Arc::new(Semaphore::new(concurrency));

            info!(
                worker = %worker.config.name,
                concurrency,
                "Embedding worker started"
            );

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!(worker = %worker.config.name, "Worker shutting down");
                            break;
                        }
                    }
                    task = receiver.recv() => {
                        let Some(task) = task else {
                            info!(worker = %worker.config.name, "Task queue closed");
                            break;
                        };
                        let Ok(permit) = semaphore.clone().acquire_owned().await else {
                            break;
                        };
                        let worker = worker.clone();
                        tokio::spawn(async move {
                            worker.handle(task).await;
                            drop(permit);
                        });
                    }
                }
            }

            // Wait for in-flight tasks.
            let _ = semaphore.acquire_many(concurrency as u32).await;
            info!(worker = %worker.config.name, "Worker stopped");
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            stats,
            join,
            timeout,
        }
    }

    /// Run one task to completion, recording the outcome.
    pub async fn handle(&self, task: BackgroundTask) {
        self.stats.active.fetch_add(1, Ordering::Relaxed);
        let outcome = self.execute(task).await;
        self.stats.active.fetch_sub(1, Ordering::Relaxed);
        self.stats.processed.fetch_add(1, Ordering::Relaxed);

        match outcome {
            Ok(outcome) => {
                let counter = match outcome {
                    EmbeddingOutcome::Written => &self.stats.written,
                    EmbeddingOutcome::Superseded | EmbeddingOutcome::Vanished => &self.stats.skipped,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                EmbeddingJobMetrics::record(outcome.as_str());
            }
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                EmbeddingJobMetrics::record("failed");
                error!(
                    worker = %self.config.name,
                    task = task.name(),
                    error = %err,
                    "background task failed"
                );
            }
        }
    }

    async fn execute(&self, task: BackgroundTask) -> crate::error::Result<EmbeddingOutcome> {
        match task {
            BackgroundTask::RegenerateEmbedding {
                product_id,
                generation,
            } => {
                if !self.queue.is_current(product_id, generation) {
                    debug!(product_id = %product_id, generation, "superseded regeneration skipped");
                    return Ok(EmbeddingOutcome::Superseded);
                }
                self.pipeline.regenerate(product_id).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryStore, TenantStore};
    use crate::models::{
        Membership, NewProduct, NewStore, ProductId, StoreType, UserProfile, Warehouse, WarehouseId,
    };
    use crate::search::{HashingEmbedder, InMemoryVectorIndex, EMBEDDING_DIMENSIONS};
    use chrono::Utc;

    async fn seeded() -> (Arc<MemoryStore>, ProductId) {
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
        let shop = NewStore::new("S", StoreType::Electric);
        let shop = crate::models::Store {
            id: crate::models::StoreId::new(),
            warehouse_id: warehouse.id,
            name: shop.name,
            store_type: shop.store_type,
            created_at: Utc::now(),
        };
        store.insert_store(&shop).await.unwrap();
        let product = NewProduct::new("Copper wire", "CW-1", 5).into_product(shop.id, Utc::now());
        store.insert_product(&product).await.unwrap();
        (store, product.id)
    }

    fn worker(store: Arc<MemoryStore>, index: Arc<InMemoryVectorIndex>, queue: TaskQueue) -> EmbeddingWorker {
        let pipeline = EmbeddingPipeline::new(store, Arc::new(HashingEmbedder::default()), index);
        EmbeddingWorker::new(WorkerConfig::default(), pipeline, queue)
    }

    #[test]
    fn test_worker_config_from_settings() {
        let config = WorkerConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.name, "embedding-worker");
    }

    #[tokio::test]
    async fn test_handle_writes_vector() {
        let (store, product_id) = seeded().await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let (queue, mut rx) = TaskQueue::bounded(4);
        let worker = worker(store.clone(), index.clone(), queue.clone());

        queue.schedule_embedding(product_id);
        worker.handle(rx.recv().await.unwrap()).await;

        assert_eq!(worker.stats.written(), 1);
        assert!(store.get_product(product_id).await.unwrap().unwrap().has_search_vector());
        assert!(index.contains(product_id));
    }

    #[tokio::test]
    async fn test_superseded_task_is_skipped() {
        let (store, product_id) = seeded().await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let (queue, mut rx) = TaskQueue::bounded(4);
        let worker = worker(store.clone(), index.clone(), queue.clone());

        queue.schedule_embedding(product_id);
        queue.schedule_embedding(product_id);
        worker.handle(rx.recv().await.unwrap()).await;
        assert_eq!(worker.stats.skipped(), 1);
        assert!(!index.contains(product_id));

        worker.handle(rx.recv().await.unwrap()).await;
        assert_eq!(worker.stats.written(), 1);
    }

    #[tokio::test]
    async fn test_deleted_product_vanishes() {
        let (store, product_id) = seeded().await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let (queue, mut rx) = TaskQueue::bounded(4);
        let worker = worker(store.clone(), index.clone(), queue.clone());

        queue.schedule_embedding(product_id);
        store.delete_product(product_id).await.unwrap();
        worker.handle(rx.recv().await.unwrap()).await;

        assert_eq!(worker.stats.skipped(), 1);
        assert!(!index.contains(product_id));
    }

    #[tokio::test]
    async fn test_started_worker_stops_on_shutdown() {
        let (store, product_id) = seeded().await;
        let index = Arc::new(InMemoryVectorIndex::new(EMBEDDING_DIMENSIONS));
        let (queue, rx) = TaskQueue::bounded(4);
        let handle = worker(store.clone(), index.clone(), queue.clone()).start(rx);

        queue.schedule_embedding(product_id);
        for _ in 0..100 {
            if handle.stats().processed() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.stats().written(), 1);
        handle.stop().await;
    }
}
