//! Entry point for every edge-node service. The chosen subcommand builds
//! its context (configuration, store, clients) explicitly and fails fast;
//! nothing is lazily initialized. Exit codes: 0 graceful, 1 configuration
//! or startup failure, 2 fatal runtime failure.

mod cli;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use dotenvy::dotenv;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use cli::{Cli, Command, ServiceArgs, SyncArgs, WatchdogArgs};
use vss_edge_api::watchdog::{CommandRestartHook, LogOnlyRestartHook, RestartHook, Watchdog};
use vss_edge_control::ControlPlaneClient;
use vss_edge_core::{telemetry, EdgeConfig, EdgeError, EdgeResult};
use vss_edge_ingest::events::AggregatorClient;
use vss_edge_ingest::IngestSupervisor;
use vss_edge_store::Store;
use vss_edge_sync::{PackageVerifier, SyncWorker};
use vss_edge_uploader::Uploader;

#[tokio::main]
async fn main() {
    dotenv().ok();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Validate { config } => validate(&config),
        Command::Aggregator(args) => run_aggregator(args).await,
        Command::Uploader(args) => run_uploader(args).await,
        Command::Sync(args) => run_sync(args).await,
        Command::Ingest(args) => run_ingest(args).await,
        Command::Control(args) => run_control(args).await,
        Command::Watchdog(args) => run_watchdog(args).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            error!("{e}");
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

/// `vss-edge validate <config.yaml>`: exit 0 on a valid file, exit 1 with
/// a path-qualified message otherwise.
fn validate(config_path: &Path) -> EdgeResult<()> {
    match EdgeConfig::from_file(config_path) {
        Ok(_) => {
            println!(
                "Configuration file '{}' is valid.",
                config_path.display()
            );
            Ok(())
        }
        Err(e) => Err(EdgeError::Config {
            message: format!(
                "Configuration validation failed for '{}': {e}",
                config_path.display()
            ),
        }),
    }
}

fn load_config(path: &Path) -> EdgeResult<Arc<EdgeConfig>> {
    Ok(Arc::new(EdgeConfig::from_file(path)?))
}

fn open_store(config: &EdgeConfig) -> EdgeResult<Store> {
    let store = Store::open(&config.storage.db_path)?;
    store.initialize()?;
    Ok(store)
}

/// Shutdown signal shared by a service's background tasks, flipped on
/// SIGINT/SIGTERM-equivalent (ctrl-c).
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = tx.send(true);
        }
    });
    rx
}

async fn run_aggregator(args: ServiceArgs) -> EdgeResult<()> {
    let config = load_config(&args.config)?;
    telemetry::init_logging("aggregator");
    let store = open_store(&config)?;
    let port = args.port.unwrap_or(config.services.aggregator);

    vss_edge_api::aggregator::run(config, store, port)
        .await
        .map_err(|e| EdgeError::Fatal {
            message: format!("aggregator server failed: {e}"),
        })
}

async fn run_uploader(args: ServiceArgs) -> EdgeResult<()> {
    let config = load_config(&args.config)?;
    telemetry::init_logging("uploader");
    let store = open_store(&config)?;
    let port = args.port.unwrap_or(config.services.uploader);

    let uploader = Uploader::new(config, store.clone())?;
    let health = tokio::spawn(vss_edge_uploader::server::run_health_server(store, port));

    let result = uploader.run(shutdown_channel()).await;
    health.abort();
    result
}

async fn run_sync(args: SyncArgs) -> EdgeResult<()> {
    let config = load_config(&args.service.config)?;
    telemetry::init_logging("sync");
    let store = open_store(&config)?;
    let port = args.service.port.unwrap_or(config.services.sync);

    let verifier =
        PackageVerifier::from_key_file(&args.signing_key).map_err(|e| EdgeError::Config {
            message: format!("package signing key: {e}"),
        })?;
    let worker = SyncWorker::new(config, store.clone(), verifier)?;

    let (force_tx, force_rx) = mpsc::channel(1);
    let server = tokio::spawn(vss_edge_sync::server::run_server(store, force_tx, port));

    let result = worker.run(shutdown_channel(), force_rx).await;
    server.abort();
    result
}

async fn run_ingest(args: ServiceArgs) -> EdgeResult<()> {
    let config = load_config(&args.config)?;
    telemetry::init_logging("ingest");
    let port = args.port.unwrap_or(config.services.ingest);
    let aggregator = AggregatorClient::new(config.services.aggregator);

    let mut supervisor = IngestSupervisor::new(config);
    let shutdown = shutdown_channel();
    let workers = supervisor.spawn_all(shutdown.clone());
    let supervisor = Arc::new(supervisor);

    let result = vss_edge_ingest::server::run_server(supervisor, aggregator, port)
        .await
        .map_err(|e| EdgeError::Fatal {
            message: format!("ingest server failed: {e}"),
        });

    // The HTTP server exits on the same signal the workers observe; give
    // the workers time to wind down their process groups.
    for handle in workers {
        let _ = tokio::time::timeout(std::time::Duration::from_secs(10), handle).await;
    }
    result
}

async fn run_control(args: ServiceArgs) -> EdgeResult<()> {
    let config = load_config(&args.config)?;
    telemetry::init_logging("control");
    let store = open_store(&config)?;
    let port = args.port.unwrap_or(config.services.control);

    let client = ControlPlaneClient::new(config, store);
    let health = tokio::spawn(vss_edge_control::server::run_health_server(port));

    let result = client.run(shutdown_channel()).await.map_err(EdgeError::from);
    health.abort();
    result
}

async fn run_watchdog(args: WatchdogArgs) -> EdgeResult<()> {
    let config = load_config(&args.service.config)?;
    telemetry::init_logging("watchdog");
    let port = args.service.port.unwrap_or(config.services.watchdog);

    let hook: Box<dyn RestartHook> = match args.restart_command {
        Some(command_template) => Box::new(CommandRestartHook { command_template }),
        None => Box::new(LogOnlyRestartHook),
    };
    let watchdog = Arc::new(Watchdog::new(&config, hook));

    let shutdown = shutdown_channel();
    let checker = tokio::spawn(watchdog.clone().run(shutdown));

    let result = vss_edge_api::watchdog::run_server(watchdog, port)
        .await
        .map_err(|e| EdgeError::Fatal {
            message: format!("watchdog server failed: {e}"),
        });
    checker.abort();
    result
}
