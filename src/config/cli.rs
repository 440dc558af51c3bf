//! Command-line argument definitions for testpod.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

/// Command-line interface for testpod.
#[derive(Debug, Parser)]
#[command(name = "testpod")]
#[command(
    author,
    version,
    about = "Ephemeral containerised service dependencies for integration tests"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to the container engine and verify it responds.
    Check,

    /// Connect to a running service and issue a single liveness probe.
    Ping(PingArgs),

    /// Provision a service container, probe it once and remove it.
    Run(RunArgs),
}

/// Arguments for the `ping` subcommand.
#[derive(Debug, Parser)]
pub struct PingArgs {
    /// Service address (`host:port`). Defaults to `DATABASE_URL`.
    #[arg(long)]
    pub address: Option<String>,
}

/// Arguments for the `run` subcommand.
#[derive(Debug, Parser)]
pub struct RunArgs {
    /// Image to provision, e.g. `redis:7-alpine`.
    #[arg(long)]
    pub image: Option<String>,

    /// Internal port spec to resolve, e.g. `6379/tcp`.
    #[arg(long)]
    pub port: Option<String>,
}
