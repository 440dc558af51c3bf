//! Configuration for the testpod harness and CLI.
//!
//! Settings are merged with `ortho_config` from four layers, lowest to
//! highest: defaults, a TOML file, `TESTPOD_*` environment variables and
//! command-line flags.
//!
//! The configuration file is discovered at `~/.config/testpod/config.toml`
//! by default, or `.testpod.toml` in the working or home directory.
//!
//! # Example Configuration
//!
//! ```toml
//! engine_socket = "unix:///var/run/docker.sock"
//!
//! [tls]
//! verify = false
//!
//! [readiness]
//! timeout_ms = 30000
//! poll_interval_ms = 50
//!
//! [pool]
//! max_idle = 3
//! max_active = 64
//! idle_timeout_secs = 60
//! connect_timeout_ms = 5000
//! wait_timeout_ms = 5000
//!
//! [service]
//! image = "redis:7-alpine"
//! port = "6379/tcp"
//! ```

mod cli;
mod loader;
mod types;

#[cfg(test)]
mod tests;

pub use cli::{Cli, Commands, PingArgs, RunArgs};
pub use loader::{env_var_names, load_config, load_config_with_env};
pub use types::{
    DATABASE_URL_ENV, DEFAULT_SERVICE_PORT, HarnessConfig, PoolConfig, ReadinessConfig,
    ServiceConfig, TlsConfig,
};
