//! Booking sync - forwards new booking contacts to a newsletter
//!
//! Polls the booking API on a fixed interval, filters to bookings created
//! after the automation cutoff that have not been forwarded yet, and submits
//! each contact to the newsletter endpoint exactly once.
//!
//! Module structure:
//! - `domain/` - Core types and the eligibility filter
//! - `io/` - External interfaces (booking API, newsletter, state files, HTTP)
//! - `services/` - Orchestrator and scheduler
//! - `infra/` - Configuration and metrics

use anyhow::Context;
use booking_sync::infra::{Config, Metrics};
use booking_sync::io::http_api::{self, VERSION};
use booking_sync::io::{ActivityLog, HttpBookingSource, ProcessedStore, Submitter};
use booking_sync::services::{SyncOrchestrator, SyncScheduler};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Booking sync - forwards new booking contacts to a newsletter
#[derive(Parser, Debug)]
#[command(name = "booking-sync", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Run a single sync cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %VERSION, "booking_sync_starting");

    let args = Args::parse();

    // Configuration problems are fatal here rather than mid-cycle
    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load(&config_path)
        .with_context(|| format!("invalid configuration in {}", config_path))?;

    info!(
        config_file = %config.config_file(),
        source_url = %config.source_base_url(),
        subscribe_url = %config.subscribe_url(),
        fallback = %config.fallback_url().is_some(),
        interval_secs = %config.interval_secs(),
        pacing_ms = %config.pacing_ms(),
        cutoff = %config.automation_cutoff().to_rfc3339(),
        processed_file = %config.processed_file(),
        server_port = %config.server_port(),
        "config_loaded"
    );

    let source = HttpBookingSource::new(&config).context("failed to build booking API client")?;
    let submitter = Submitter::from_config(&config).context("failed to build newsletter client")?;
    if submitter.is_empty() {
        anyhow::bail!("no newsletter submission strategy configured");
    }
    info!(strategies = ?submitter.strategy_names(), "submitter_ready");
    let store = ProcessedStore::open(config.processed_file());
    let activity = Arc::new(ActivityLog::new(config.activity_log_file()));
    let metrics = Arc::new(Metrics::new());

    activity.record(&format!(
        "Service started; forwarding bookings created after {}, {} already processed",
        config.automation_cutoff().to_rfc3339(),
        store.len()
    ));

    let orchestrator = Arc::new(SyncOrchestrator::new(
        Arc::new(source),
        submitter,
        store,
        config.automation_cutoff(),
        Duration::from_millis(config.pacing_ms()),
        metrics.clone(),
        activity.clone(),
    ));

    if args.once {
        let outcome = orchestrator.run_cycle(booking_sync::domain::CycleTrigger::Manual).await;
        if let Some(report) = outcome.report() {
            info!(submitted = %report.submitted, failed = %report.failed, "single_cycle_complete");
        }
        metrics.snapshot().log();
        return Ok(());
    }

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start operational HTTP server (if port > 0)
    let server_port = config.server_port();
    if server_port > 0 {
        let ops_orchestrator = orchestrator.clone();
        let ops_shutdown = shutdown_rx.clone();
        let interval_secs = config.interval_secs();
        tokio::spawn(async move {
            let served = http_api::start_ops_server(
                server_port,
                ops_orchestrator,
                interval_secs,
                ops_shutdown,
            )
            .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "ops_server_error");
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx;
    let signal_orchestrator = orchestrator.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        signal_orchestrator.request_shutdown();
        let _ = shutdown_signal.send(true);
    });

    // Run scheduler until shutdown
    let scheduler =
        SyncScheduler::new(orchestrator.clone(), Duration::from_secs(config.interval_secs()));
    scheduler.run(shutdown_rx).await;

    metrics.snapshot().log();
    activity.record("Service stopped");
    info!("booking_sync_shutdown_complete");
    Ok(())
}
