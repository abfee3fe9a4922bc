//! Warehub Server - Main entry point

use std::sync::Arc;

use warehub_core::{
    api,
    app::App,
    config::{Config, StoreBackend},
    db::{MemoryStore, PgStore, TenantStore},
    jobs::{backfill_embeddings, reindex_stored_vectors},
    telemetry,
};

const BACKFILL_BATCH_SIZE: usize = 100;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    let telemetry = telemetry::init_telemetry(&config.observability.telemetry())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = ?config.database.backend,
        "Starting Warehub server"
    );

    let store: Arc<dyn TenantStore> = match config.database.backend {
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Postgres => {
            let pg = PgStore::connect(&config.database).await?;
            if config.database.run_migrations {
                pg.migrate().await?;
            }
            tracing::info!("Connected to database");
            Arc::new(pg)
        }
    };

    let App {
        state,
        pipeline,
        worker,
        receiver,
    } = App::assemble(store, &config, telemetry.metrics.clone())?;
    let worker = worker.start(receiver);

    // The vector index is in-process: reload the persisted vectors first,
    // then embed whatever is still missing.
    tokio::spawn(async move {
        if let Err(e) = reindex_stored_vectors(&pipeline, BACKFILL_BATCH_SIZE).await {
            tracing::error!(error = %e, "search index reload failed");
        }
        if let Err(e) = backfill_embeddings(&pipeline, BACKFILL_BATCH_SIZE).await {
            tracing::error!(error = %e, "embedding backfill failed");
        }
    });

    let app = api::build_router(state, config.server.request_timeout);

    let addr = config.bind_address();
    tracing::info!(address = %addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    worker.stop().await;
    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
