//! Payment Gateway Back Office - Main Application Entry Point
//!
//! Runs the REST API, the queue workers, or both, depending on `RUN_MODE`.
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations (or fall back to
//!    the in-memory store and queue when `DATABASE_URL` is unset)
//! 3. Start the payment, refund and webhook workers
//! 4. Build HTTP router with routes and middleware
//! 5. Serve until SIGINT/SIGTERM, then drain in-flight jobs

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use payment_gateway_backoffice::app::{self, AppState};
use payment_gateway_backoffice::config::Config;
use payment_gateway_backoffice::db::{self, DbPool};
use payment_gateway_backoffice::queue::{InMemoryJobQueue, JobQueue, PgJobQueue};
use payment_gateway_backoffice::services::simulator::Simulator;
use payment_gateway_backoffice::store::{InMemoryStore, PgStore, Store};
use payment_gateway_backoffice::workers::{WorkerConfig, Workers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        run_mode = ?config.run_mode,
        test_mode = config.test_mode,
        "Configuration loaded"
    );

    let (store, queue, pool) = connect(&config).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let workers = if config.run_mode.runs_workers() {
        let simulator = Arc::new(Simulator::new(
            config.simulation_mode(),
            config.test_processing_delay(),
        ));
        let workers = Workers::start(
            store.clone(),
            queue.clone(),
            simulator,
            WorkerConfig::from(&config),
            shutdown.clone(),
        )
        .await
        .context("failed to start workers")?;
        Some(workers)
    } else {
        None
    };

    if config.run_mode.serves_api() {
        let state = AppState::new(store, queue, workers.is_some());
        let router = app::router(state);

        let addr = format!("0.0.0.0:{}", config.server_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Server listening on {}", addr);

        let token = shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
    } else {
        shutdown.cancelled().await;
    }

    if let Some(workers) = workers {
        tracing::info!("Waiting for in-flight jobs");
        workers.join().await;
    }

    if let Some(pool) = pool {
        pool.close().await;
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

type Backends = (Arc<dyn Store>, Arc<dyn JobQueue>, Option<DbPool>);

async fn connect(config: &Config) -> anyhow::Result<Backends> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using in-memory store and queue");
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::with_test_merchant().await);
        let queue: Arc<dyn JobQueue> = Arc::new(InMemoryJobQueue::new());
        return Ok((store, queue, None));
    };

    let pool = db::create_pool(database_url, config.database_max_connections).await?;
    tracing::info!("Database pool created");

    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PgJobQueue::new(pool.clone()));
    Ok((store, queue, Some(pool)))
}

/// Cancel `shutdown` on Ctrl-C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
