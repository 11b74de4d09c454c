//! Operator CLI: stats, pending, failed, monitor, cleanup, reset, export,
//! report. Exit code 0 on success, non-zero on usage or I/O error.

mod report;

use std::path::PathBuf;
use std::sync::Arc;

use bridge_core::config::Config;
use bridge_core::ports::{AnalyticsStore, BufferApi};
use bridge_store::{open_pool, parse_priority_limits, SqliteBufferStore};
use bridge_workers::OperatorSurface;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bridge-cli", about = "Operator surface for the integration bridge")]
struct Cli {
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print status counts, route counts, oldest-pending, dead-letter count.
    Stats,
    /// List next-to-lease messages in lease order.
    Pending {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// List dead-letter rows newest-first.
    Failed {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Live refresh of rates and alerts every `interval` seconds.
    Monitor {
        #[arg(long, default_value_t = 5)]
        interval: u64,
    },
    /// Delete completed/expired/dead-letter rows older than `days`.
    Cleanup {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
    /// Reset any `processing` row to `pending`.
    Reset,
    /// Write a JSON snapshot of status counts, hourly buckets, and top addresses.
    Export {
        #[arg(long)]
        output: PathBuf,
    },
    /// Write an HTML operator report (performance + anomalies + prediction).
    Report {
        #[arg(long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {e}");
            return 2;
        }
    };

    let pool = match open_pool(&config.buffer.db_path, config.buffer.wal_enabled).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("failed to open store: {e}");
            return 3;
        }
    };

    let priority_limits = parse_priority_limits(&config.buffer.priority_limits);
    let store: Arc<SqliteBufferStore> = Arc::new(SqliteBufferStore::new(
        pool,
        config.buffer.max_size,
        chrono::Duration::minutes(config.buffer.ttl_minutes),
        priority_limits,
    ));

    match execute(&cli.command, store, &config).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

async fn execute(command: &Command, store: Arc<SqliteBufferStore>, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::Stats => cmd_stats(store.as_ref()).await,
        Command::Pending { limit } => cmd_pending(store.as_ref(), *limit).await,
        Command::Failed { limit } => cmd_failed(store.as_ref(), *limit).await,
        Command::Monitor { interval } => cmd_monitor(store, config, *interval).await,
        Command::Cleanup { days } => cmd_cleanup(store.as_ref(), *days).await,
        Command::Reset => cmd_reset(store.as_ref()).await,
        Command::Export { output } => cmd_export(store, output).await,
        Command::Report { output } => cmd_report(store, config, output).await,
    }
}

async fn cmd_stats(store: &SqliteBufferStore) -> anyhow::Result<()> {
    let stats = store.stats().await?;
    println!("pending:    {}", stats.pending);
    println!("processing: {}", stats.processing);
    println!("completed:  {}", stats.completed);
    println!("failed:     {}", stats.failed);
    println!("expired:    {}", stats.expired);
    println!("oldest pending: {:?}", stats.oldest_pending);
    println!("utilization: {:.1}%", stats.utilization_pct);
    println!("by route:");
    for route in &stats.by_route {
        println!("  {} -> {}: {}", route.source, route.destination, route.count);
    }
    let dead_letters = store.export_dead_letters(None).await?;
    println!("dead-letter count: {}", dead_letters.len());
    Ok(())
}

async fn cmd_pending(store: &SqliteBufferStore, limit: u32) -> anyhow::Result<()> {
    let messages = store.pending(limit).await?;
    for m in messages {
        println!(
            "id={} priority={:?} source={} destination={} topic_or_node={} created_at={}",
            m.id, m.priority, m.source, m.destination, m.topic_or_node, m.created_at
        );
    }
    Ok(())
}

async fn cmd_failed(store: &SqliteBufferStore, limit: u32) -> anyhow::Result<()> {
    let dead_letters = store.export_dead_letters(Some(limit)).await?;
    for dl in dead_letters {
        println!(
            "id={} original_id={} {}->{} error={:?} failed_at={} retry_count={}",
            dl.id, dl.original_id, dl.source, dl.destination, dl.error_message, dl.failed_at, dl.retry_count
        );
    }
    Ok(())
}

async fn cmd_reset(store: &SqliteBufferStore) -> anyhow::Result<()> {
    let count = store.reset_processing().await?;
    println!("reset {count} processing row(s) to pending");
    Ok(())
}

async fn cmd_cleanup(store: &SqliteBufferStore, days: i64) -> anyhow::Result<()> {
    let report = store.cleanup(days).await?;
    println!(
        "deleted completed={} expired={} failed={}",
        report.completed_deleted, report.expired_deleted, report.failed_deleted
    );
    Ok(())
}

async fn cmd_export(store: Arc<SqliteBufferStore>, output: &PathBuf) -> anyhow::Result<()> {
    let stats = store.stats().await?;
    let buckets = store.hourly_buckets(24).await?;
    let top_addresses = store.top_addresses(10).await?;

    let snapshot = serde_json::json!({
        "status_counts": {
            "pending": stats.pending,
            "processing": stats.processing,
            "completed": stats.completed,
            "failed": stats.failed,
            "expired": stats.expired,
        },
        "hourly_stats": buckets.iter().map(|b| serde_json::json!({
            "hour_start": b.hour_start,
            "created": b.created,
            "completed": b.completed,
            "failed": b.failed,
        })).collect::<Vec<_>>(),
        "top_addresses": top_addresses.iter().map(|a| serde_json::json!({
            "topic_or_node": a.topic_or_node,
            "count": a.count,
        })).collect::<Vec<_>>(),
    });

    std::fs::write(output, serde_json::to_string_pretty(&snapshot)?)?;
    println!("wrote export snapshot to {}", output.display());
    Ok(())
}

async fn cmd_report(store: Arc<SqliteBufferStore>, config: &Config, output: &PathBuf) -> anyhow::Result<()> {
    let analytics: Arc<dyn AnalyticsStore> = store.clone();
    let buffer: Arc<dyn BufferApi> = store.clone();
    let surface = OperatorSurface::new(buffer, analytics, config.monitoring.clone());

    let performance = surface.performance_report(24).await?;
    let anomalies = surface.detect_anomalies().await?;
    let predictions = surface.predict_load(6).await?;

    let html = report::render_html(&performance, &anomalies, &predictions);
    std::fs::write(output, html)?;
    println!("wrote operator report to {}", output.display());
    Ok(())
}

async fn cmd_monitor(store: Arc<SqliteBufferStore>, config: &Config, interval: u64) -> anyhow::Result<()> {
    let analytics: Arc<dyn AnalyticsStore> = store.clone();
    let buffer: Arc<dyn BufferApi> = store.clone();
    let surface = OperatorSurface::new(buffer, analytics, config.monitoring.clone());

    let mut last_completed = store.stats().await?.messages_processed;
    let mut last_failed = store.stats().await?.messages_failed;

    loop {
        tokio::time::sleep(std::time::Duration::from_secs(interval)).await;

        let stats = store.stats().await?;
        let delta_completed = stats.messages_processed - last_completed;
        let delta_failed = stats.messages_failed - last_failed;
        last_completed = stats.messages_processed;
        last_failed = stats.messages_failed;

        println!(
            "pending={} processing={} Δcompleted/s={:.2} Δfailed/s={:.2}",
            stats.pending,
            stats.processing,
            delta_completed as f64 / interval as f64,
            delta_failed as f64 / interval as f64,
        );

        for anomaly in surface.detect_anomalies().await? {
            println!("ALERT [{:?}] {:?}: {}", anomaly.severity, anomaly.kind, anomaly.detail);
        }
    }
}
