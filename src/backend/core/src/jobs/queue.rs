//! Fire-and-forget task queue.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::models::ProductId;
use crate::telemetry::EmbeddingJobMetrics;

/// Deferred work triggered by a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum BackgroundTask {
    /// Recompute a product's search vector. Only the task carrying the
    /// product's latest generation is allowed to write.
    RegenerateEmbedding { product_id: ProductId, generation: u64 },
}

impl BackgroundTask {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RegenerateEmbedding { .. } => "regenerate_embedding",
        }
    }
}

/// Queue counters.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub scheduled: Arc<AtomicU64>,
    pub dropped: Arc<AtomicU64>,
}

impl QueueStats {
    pub fn scheduled(&self) -> u64 {
        self.scheduled.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Receiving half, handed to the worker.
#[derive(Debug)]
pub struct TaskReceiver {
    inner: mpsc::Receiver<BackgroundTask>,
}

impl TaskReceiver {
    pub async fn recv(&mut self) -> Option<BackgroundTask> {
        self.inner.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BackgroundTask> {
        self.inner.try_recv().ok()
    }
}

/// Sending half, cloned into every service that schedules work.
///
/// Scheduling never blocks and never fails the caller: a full or closed
/// queue logs the task and drops it.
#[derive(Debug, Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<BackgroundTask>,
    generations: Arc<DashMap<ProductId, u64>>,
    stats: QueueStats,
}

impl TaskQueue {
    pub fn bounded(capacity: usize) -> (Self, TaskReceiver) {
        let (sender, inner) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            generations: Arc::new(DashMap::new()),
            stats: QueueStats::default(),
        };
        (queue, TaskReceiver { inner })
    }

    /// Enqueue without waiting. Returns whether the task was accepted.
    pub fn run_async(&self, task: BackgroundTask) -> bool {
        match self.sender.try_send(task) {
            Ok(()) => {
                self.stats.scheduled.fetch_add(1, Ordering::Relaxed);
                debug!(task = task.name(), "task scheduled");
                true
            }
            Err(err) => {
                let reason = match err {
                    TrySendError::Full(_) => "queue full",
                    TrySendError::Closed(_) => "queue closed",
                };
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                EmbeddingJobMetrics::record("dropped");
                warn!(task = task.name(), reason, ?task, "background task dropped");
                false
            }
        }
    }

    /// Schedule a vector regeneration, superseding any earlier one still queued.
    pub fn schedule_embedding(&self, product_id: ProductId) -> bool {
        let generation = {
            let mut entry = self.generations.entry(product_id).or_insert(0);
            *entry += 1;
            *entry
        };

        let accepted = self.run_async(BackgroundTask::RegenerateEmbedding {
            product_id,
            generation,
        });
        if !accepted {
            // Let an already queued task for this product still count as current.
            if let Some(mut entry) = self.generations.get_mut(&product_id) {
                if *entry == generation {
                    *entry -= 1;
                }
            }
        }
        accepted
    }

    pub fn latest_generation(&self, product_id: ProductId) -> u64 {
        self.generations.get(&product_id).map(|g| *g).unwrap_or(0)
    }

    pub fn is_current(&self, product_id: ProductId, generation: u64) -> bool {
        self.latest_generation(product_id) == generation
    }

    /// Drop generation tracking for a deleted product.
    pub fn forget(&self, product_id: ProductId) {
        self.generations.remove(&product_id);
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}
