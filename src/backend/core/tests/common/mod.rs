//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use warehub_core::app::App;
use warehub_core::config::Config;
use warehub_core::db::MemoryStore;
use warehub_core::jobs::TaskReceiver;
use warehub_core::models::{User, UserProfile};
use warehub_core::search::{Embedder, HashingEmbedder, SearchProvider};
use warehub_core::storage::InMemoryObjectStorage;
use warehub_core::telemetry::MetricsRegistry;
use warehub_core::api::AppState;

/// A fully wired in-memory deployment. The embedding worker is not running;
/// queued tasks sit in `tasks`.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
    pub tasks: TaskReceiver,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(MemoryStore::new());
        let app = App::assemble(store.clone(), &config, MetricsRegistry::disabled())
            .expect("default config assembles");
        Self {
            store,
            state: app.state,
            tasks: app.receiver,
        }
    }

    pub fn with_search(search: Arc<dyn SearchProvider>) -> Self {
        let config = Config::default();
        let store = Arc::new(MemoryStore::new());
        let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::default());
        let app = App::with_providers(
            store.clone(),
            &config,
            MetricsRegistry::disabled(),
            embedder,
            search,
            Arc::new(InMemoryObjectStorage::default()),
        );
        Self {
            store,
            state: app.state,
            tasks: app.receiver,
        }
    }

    /// Sync a user through the identity service.
    pub async fn user(&self, ext: &str, email: &str) -> User {
        self.state
            .identity
            .sync_user(&UserProfile::new(ext, ext, email))
            .await
            .expect("user sync")
    }
}
