//! FlashSystem Exporter
//!
//! Serves capacity, efficiency and health metrics for the FlashSystem arrays
//! listed in the pool configuration. Every scrape of `/metrics` runs one poll
//! cycle; conditions go to the FlashSystemCluster resources, or to the log in
//! standalone mode.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use flashsystem_exporter::{
    run_health_server, run_metrics_server, ArrayRegistry, Error, ExporterConfig,
    FileConfigSource, FileSecretResolver, HealthState, HttpTransportFactory, KubeStatusSink,
    LogStatusSink, Poller, RegistryEvent, Result, StatusSink,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// FlashSystem Exporter - capacity and health telemetry for FlashSystem arrays
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Array to storage-class/pool mapping (JSON or YAML)
    #[arg(long, env = "POOL_CONFIG_PATH", default_value = "/config/pools")]
    pool_config: String,

    /// Directory holding one sub-directory per array secret
    #[arg(long, env = "SECRETS_DIR", default_value = "/secrets")]
    secrets_dir: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:9100")]
    metrics_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Namespace of the FlashSystemCluster resources
    #[arg(long, env = "WATCH_NAMESPACE")]
    namespace: Option<String>,

    /// Export per-volume capacity (one extra request per volume)
    #[arg(long, env = "COLLECT_VOLUMES")]
    collect_volumes: bool,

    /// Per-request timeout towards the arrays
    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value = "15")]
    request_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    /// Run in standalone mode (no Kubernetes)
    #[arg(long, env = "STANDALONE")]
    standalone: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    info!("Starting FlashSystem Exporter");
    info!("  Version: {}", flashsystem_exporter::VERSION);
    info!("  Pool config: {}", args.pool_config);
    info!("  Metrics: {}", args.metrics_addr);
    info!("  Volume metrics: {}", args.collect_volumes);
    info!("  Standalone mode: {}", args.standalone);

    let config = ExporterConfig {
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        collect_volumes: args.collect_volumes,
        ..Default::default()
    };

    let sink: Arc<dyn StatusSink> = if args.standalone {
        Arc::new(LogStatusSink::new())
    } else {
        let client = kube::Client::try_default().await?;
        let namespace = args
            .namespace
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        info!("  Namespace: {}", namespace);
        Arc::new(KubeStatusSink::new(client, namespace))
    };

    let registry = Arc::new(ArrayRegistry::new(
        Arc::new(FileSecretResolver::new(&args.secrets_dir)),
        Arc::new(HttpTransportFactory::new(config.clone())),
        sink.clone(),
        config.auth_alert_threshold,
    ));
    let poller = Arc::new(Poller::new(
        Arc::new(FileConfigSource::new(&args.pool_config)),
        registry.clone(),
        sink,
        config.collect_volumes,
    ));
    let health = Arc::new(HealthState::new());
    let shutdown = CancellationToken::new();

    // Log registry membership changes
    let mut events = registry.subscribe();
    let events_shutdown = shutdown.clone();
    let events_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = events_shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(skipped)) => warn!("Dropped {} registry events", skipped),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_task = tokio::spawn(run_health_server_logged(
        health_addr,
        health.clone(),
        shutdown.clone(),
    ));

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    let metrics_shutdown = shutdown.clone();
    let metrics_task = tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, poller, health, metrics_shutdown.clone()).await {
            error!("Metrics server error: {}", e);
            metrics_shutdown.cancel();
        }
    });

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.map_err(|e| Error::Internal(format!("Failed to listen for shutdown signal: {}", e)))?;
            info!("Shutdown signal received");
        }
        _ = shutdown.cancelled() => warn!("Server stopped, shutting down"),
    }
    shutdown.cancel();

    for task in [events_task, health_task, metrics_task] {
        if let Err(e) = task.await {
            error!("Task failed during shutdown: {}", e);
        }
    }

    info!("Exporter shutdown complete");
    Ok(())
}

async fn run_health_server_logged(addr: String, health: Arc<HealthState>, shutdown: CancellationToken) {
    if let Err(e) = run_health_server(&addr, health, shutdown).await {
        error!("Health server error: {}", e);
    }
}

fn log_event(event: &RegistryEvent) {
    match event {
        RegistryEvent::ArrayAdded { array, ready } => info!(array = %array, ready, "Array added"),
        RegistryEvent::ArrayDropped { array } => info!(array = %array, "Array dropped"),
        RegistryEvent::ArrayNotReady { array, reason } => {
            warn!(array = %array, reason = %reason, "Array not ready")
        }
        RegistryEvent::ArrayExcluded { array, reason } => {
            warn!(array = %array, "Array excluded: {}", reason)
        }
        RegistryEvent::ArrayRetained { array } => debug!(array = %array, "Array retained"),
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let directive = |d: &str| -> Result<Directive> {
        d.parse()
            .map_err(|e| Error::Configuration(format!("Invalid log directive {}: {}", d, e)))
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive(directive("hyper=warn")?)
        .add_directive(directive("kube=info")?)
        .add_directive(directive("reqwest=warn")?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}
