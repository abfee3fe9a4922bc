//! Service wiring shared by the server binary and the integration tests.

use std::sync::Arc;

use crate::api::AppState;
use crate::config::Config;
use crate::db::TenantStore;
use crate::error::Result;
use crate::fanout::{FanoutLimits, FanoutService};
use crate::hierarchy::{CascadeRetry, HierarchyService};
use crate::identity::IdentityService;
use crate::jobs::{EmbeddingPipeline, EmbeddingWorker, TaskQueue, TaskReceiver, WorkerConfig};
use crate::membership::MembershipService;
use crate::search::{Embedder, HashingEmbedder, InMemoryVectorIndex, SearchProvider};
use crate::storage::{InMemoryObjectStorage, ObjectStorage};
use crate::telemetry::MetricsRegistry;

/// Everything a running server needs. The worker is not started yet.
pub struct App {
    pub state: AppState,
    pub pipeline: EmbeddingPipeline,
    pub worker: EmbeddingWorker,
    pub receiver: TaskReceiver,
}

impl App {
    /// Wire the services over `store` with the in-process search index and
    /// object storage.
    pub fn assemble(store: Arc<dyn TenantStore>, config: &Config, metrics: MetricsRegistry) -> Result<Self> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(HashingEmbedder::new(config.search.embedding_dimensions)?);
        let search: Arc<dyn SearchProvider> =
            Arc::new(InMemoryVectorIndex::new(config.search.embedding_dimensions));
        let storage: Arc<dyn ObjectStorage> = Arc::new(InMemoryObjectStorage::default());
        Ok(Self::with_providers(store, config, metrics, embedder, search, storage))
    }

    pub fn with_providers(
        store: Arc<dyn TenantStore>,
        config: &Config,
        metrics: MetricsRegistry,
        embedder: Arc<dyn Embedder>,
        search: Arc<dyn SearchProvider>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let (queue, receiver) = TaskQueue::bounded(config.worker.queue_capacity);
        let pipeline = EmbeddingPipeline::new(store.clone(), embedder.clone(), search.clone());
        let worker = EmbeddingWorker::new(
            WorkerConfig::from(&config.worker),
            pipeline.clone(),
            queue.clone(),
        );

        let hierarchy = HierarchyService::new(store.clone(), storage.clone(), search.clone(), queue)
            .with_retry(CascadeRetry::with_attempts(config.hierarchy.cascade_retry_attempts));
        let fanout = FanoutService::new(
            store.clone(),
            storage,
            search,
            embedder,
            FanoutLimits::new(&config.fanout, &config.search),
        );

        let state = AppState {
            identity: IdentityService::new(store.clone()),
            memberships: MembershipService::new(store.clone(), config.policy.protect_last_owner),
            hierarchy,
            fanout,
            metrics,
            store,
        };

        Self {
            state,
            pipeline,
            worker,
            receiver,
        }
    }
}
