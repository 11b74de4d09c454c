//! Service entrypoint: loads configuration, opens the durable store, starts
//! one egress worker per destination side plus the periodic sweep task, and
//! runs until SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_core::config::Config;
use bridge_core::mapping::MappingRegistry;
use bridge_core::ports::BufferApi;
use bridge_core::transform::Transformer;
use bridge_core::types::Side;
use bridge_store::{open_pool, parse_priority_limits, SqliteBufferStore};
use bridge_workers::adapters::{EnterpriseAdapter, InMemoryEgressAdapter, NullEnterpriseClient};
use bridge_workers::{EgressWorker, IngressRouter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.yaml"));

    let config = Config::load(&config_path)?;
    init_tracing(&config);

    tracing::info!(config_path = %config_path.display(), "starting bridge");

    let pool = open_pool(&config.buffer.db_path, config.buffer.wal_enabled).await?;
    let priority_limits = parse_priority_limits(&config.buffer.priority_limits);
    let store = Arc::new(SqliteBufferStore::new(
        pool,
        config.buffer.max_size,
        chrono::Duration::minutes(config.buffer.ttl_minutes),
        priority_limits,
    ));

    let reset = store.reset_processing().await?;
    if reset > 0 {
        tracing::warn!(reset, "reset in-flight messages from a previous run to pending");
    }

    let mappings = Arc::new(MappingRegistry::load(config.mapping_entries()?)?);
    tracing::info!(count = mappings.len(), "loaded mapping registry");

    let transformer = Arc::new(Transformer::new(None));
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(true);

    let buffer: Arc<dyn BufferApi> = store.clone();
    let mut worker_handles = Vec::new();

    // Real pub/sub, variable-server, and enterprise wire clients are the
    // kind of protocol-specific integration this crate treats as a plug-in
    // seam (`EgressAdapter`); until one is wired in, each destination runs
    // against an in-memory adapter so the buffer/worker/transform pipeline
    // is fully exercised end to end.
    for destination in [Side::Pubsub, Side::Variable, Side::Enterprise] {
        let adapter = Arc::new(InMemoryEgressAdapter::new());
        let mut worker = EgressWorker::new(
            buffer.clone(),
            adapter,
            transformer.clone(),
            mappings.clone(),
            destination,
            config.buffer.batch_size,
            Duration::from_millis(200),
            shutdown_rx.clone(),
        );
        worker_handles.push(tokio::spawn(async move { worker.run().await }));
    }

    // Ingress side: pub/sub and variable adapters are expected to push
    // observed value changes into `ingress_tx` from a subscription
    // callback; the enterprise side has no such callback and is driven by
    // a poll loop instead. Both funnel into the same `IngressRouter`, which
    // is the one place mapping-direction filtering and enqueueing happens.
    let (ingress_tx, ingress_rx) = tokio::sync::mpsc::channel(256);
    let ingress_router = IngressRouter::new(buffer.clone(), mappings.clone(), config.buffer.retry_max_attempts);
    worker_handles.push(tokio::spawn(async move { ingress_router.run(ingress_rx).await }));

    if config.enterprise.enabled {
        let resources: Vec<String> = mappings
            .iter()
            .filter(|m| m.source_side == Side::Enterprise || m.destination_side == Side::Enterprise)
            .map(|m| {
                if m.source_side == Side::Enterprise {
                    m.source_address.clone()
                } else {
                    m.destination_address.clone()
                }
            })
            .collect();

        if resources.is_empty() {
            tracing::warn!("enterprise integration enabled but no mapping references the enterprise side");
        } else {
            // The real enterprise HTTP client is the kind of wire-level
            // protocol client this crate treats as a plug-in seam; until one
            // is wired in, the poll loop runs against a client that never
            // has anything to push or fetch.
            let enterprise_adapter = Arc::new(EnterpriseAdapter::new(
                NullEnterpriseClient,
                config.enterprise.retry.clone(),
                config.enterprise.auth.clone(),
            ));
            let poll_interval = Duration::from_secs(config.enterprise.poll_interval_secs);
            let poll_rx = shutdown_rx.clone();
            let poll_tx = ingress_tx.clone();
            worker_handles.push(tokio::spawn(async move {
                enterprise_adapter.run_poll_loop(resources, poll_interval, poll_tx, poll_rx).await;
            }));
        }
    }
    drop(ingress_tx);

    let sweep_store = store.clone();
    let cleanup_interval = Duration::from_secs(config.buffer.cleanup_interval_secs);
    let mut sweep_rx = shutdown_rx.clone();
    let sweep_handle = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(cleanup_interval) => {
                    match sweep_store.sweep().await {
                        Ok(report) => tracing::info!(
                            expired = report.expired,
                            completed_deleted = report.completed_deleted,
                            expired_deleted = report.expired_deleted,
                            "sweep complete"
                        ),
                        Err(e) => tracing::error!(error = %e, "sweep failed"),
                    }
                }
                _ = sweep_rx.changed() => {
                    if !*sweep_rx.borrow() {
                        return;
                    }
                }
            }
        }
    });

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining workers");
    shutdown_tx.send(false).ok();

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = sweep_handle.await;

    tracing::info!("bridge stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(config.logging.env_filter_directive())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match &config.logging.file_path {
        Some(path) => {
            let directory = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
            let file_name = std::path::Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| "bridge.log".to_string());
            let file_appender = tracing_appender::rolling::daily(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            // Leaked deliberately: the guard must outlive the subscriber, and the
            // subscriber is installed for the lifetime of the process.
            Box::leak(Box::new(guard));
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking).init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}
