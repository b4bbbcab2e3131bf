//! zonecost controller
//!
//! Watches pods, replica sets, deployments and nodes, and writes a zone-aware
//! `pod-deletion-cost` onto the pods of opted-in deployments.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zonecost_controller::{
    api,
    cluster::ClusterStore,
    config,
    kube::KubeClient,
    registry::{self, AllocatorRegistry},
    state::AppState,
    watcher::ResyncWatcher,
    worker::{AllocationWorker, WorkerConfig},
    zone::ZoneAllocator,
};
use zonecost_reconcile::PendingAssignments;

/// Capacity of the watcher → worker event channel.
const EVENT_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::from_env()?;

    // Prefer RUST_LOG, fall back to ZONECOST_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting zonecost controller");
    info!(
        api_url = %config.kube.api_url,
        namespace = config.kube.namespace.as_deref().unwrap_or("*"),
        health_addr = %config.health_addr,
        "Configuration loaded"
    );

    let kube = Arc::new(KubeClient::new(&config.kube)?);
    let store = Arc::new(ClusterStore::new());
    let pending = Arc::new(PendingAssignments::new());

    let mut allocators = AllocatorRegistry::new();
    if registry::zone_enabled(&config.algorithms) {
        allocators.register(Arc::new(ZoneAllocator::new(
            store.clone(),
            kube.clone(),
            pending,
        )))?;
    }
    if allocators.is_empty() {
        warn!(algorithms = ?config.algorithms, "No allocation algorithm enabled");
    }
    info!(allocators = ?allocators.names(), "Allocators registered");
    let allocators = Arc::new(allocators);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let state = AppState::new();

    let watcher = ResyncWatcher::new(
        kube.clone(),
        store.clone(),
        events_tx,
        state.clone(),
        config.resync_interval,
    );
    let watcher_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move { watcher.run(shutdown_rx).await }
    });

    let worker = Arc::new(AllocationWorker::new(
        store.clone(),
        allocators,
        WorkerConfig {
            max_concurrent: config.max_concurrent,
            ..WorkerConfig::default()
        },
    ));
    let worker_handle = tokio::spawn(worker.run(events_rx, shutdown_rx.clone()));

    let app = api::create_router(state);
    let listener = tokio::net::TcpListener::bind(&config.health_addr).await?;
    info!(addr = %config.health_addr, "Health endpoints listening");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                zonecost_controller::shutdown::signalled(&shutdown_rx).await;
                info!("HTTP server shutting down");
            })
            .await
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    let _ = shutdown_tx.send(true);

    info!("Waiting for tasks to shut down...");
    let shutdown_timeout = Duration::from_secs(10);

    if tokio::time::timeout(shutdown_timeout, watcher_handle).await.is_err() {
        warn!("Resync watcher did not shut down in time");
    }
    if tokio::time::timeout(shutdown_timeout, worker_handle).await.is_err() {
        warn!("Allocation worker did not shut down in time");
    }

    info!("Controller shutdown complete");
    Ok(())
}
