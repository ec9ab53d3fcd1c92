//! Command-line surface of the edge agent. One binary, one subcommand per
//! service, plus `validate` for configuration checks.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "vss-edge",
    version,
    about = "Edge-node agent for the VSS video surveillance system"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Validate a device configuration file and exit.
    Validate {
        /// Path to the YAML configuration file.
        config: PathBuf,
    },
    /// Run the aggregator API service.
    Aggregator(ServiceArgs),
    /// Run the upload worker.
    Uploader(ServiceArgs),
    /// Run the model/KB sync worker.
    Sync(SyncArgs),
    /// Run the ingest supervisor.
    Ingest(ServiceArgs),
    /// Run the control-plane (message bus) client.
    Control(ServiceArgs),
    /// Run the watchdog.
    Watchdog(WatchdogArgs),
}

#[derive(Debug, Args)]
pub struct ServiceArgs {
    /// Path to the device configuration file.
    #[arg(long, default_value = "/etc/vss/config.yaml")]
    pub config: PathBuf,

    /// Override the service's HTTP port.
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Debug, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Hex-encoded Ed25519 public key used to verify package signatures.
    #[arg(long, default_value = "/etc/vss/keys/package_signing.pub")]
    pub signing_key: PathBuf,
}

#[derive(Debug, Args)]
pub struct WatchdogArgs {
    #[command(flatten)]
    pub service: ServiceArgs,

    /// Restart command template invoked for CRITICAL services;
    /// `{service}` is substituted (e.g. "systemctl restart vss-{service}").
    #[arg(long)]
    pub restart_command: Option<String>,
}
