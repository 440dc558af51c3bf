//! `testpod` command-line entry point.
//!
//! Uses `eyre` at the application boundary, converting domain errors into
//! human-readable reports. Logs go to stderr through `tracing-subscriber`,
//! filtered by `RUST_LOG` (default `info`).
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/testpod/config.toml` or `TESTPOD_CONFIG_PATH`)
//! 3. Environment variables (`TESTPOD_*`)
//! 4. Command-line arguments

use std::sync::Arc;

use clap::Parser;
use eyre::{Report, Result as EyreResult};
use mockable::DefaultEnv;
use testpod::config::{Cli, Commands, HarnessConfig, load_config};
use testpod::endpoint::Endpoint;
use testpod::engine::{EngineConnector, SocketResolver, TlsMaterials};
use testpod::error::Result as TestpodResult;
use testpod::harness::{Harness, HarnessSettings};
use testpod::pool::ServicePool;
use testpod::service::{RedisDialer, ServiceConnection};
use tracing_subscriber::EnvFilter;

fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    run(&cli, &config).map_err(Report::from)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Dispatch the subcommand, keeping domain errors until the boundary.
fn run(cli: &Cli, config: &HarnessConfig) -> TestpodResult<()> {
    match &cli.command {
        Commands::Check => check_engine(config),
        Commands::Ping(_) => ping_service(config),
        Commands::Run(_) => run_service(config),
    }
}

fn engine_tls(
    config: &HarnessConfig,
    resolver: &SocketResolver<'_, DefaultEnv>,
) -> TestpodResult<Option<TlsMaterials>> {
    resolver.resolve_tls(config.tls.verify, config.tls.cert_path.as_deref())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn check_engine(config: &HarnessConfig) -> TestpodResult<()> {
    let env = DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    let tls = engine_tls(config, &resolver)?;
    let socket = EngineConnector::resolve_socket(config.engine_socket.as_deref(), &resolver);

    EngineConnector::connect_and_verify(
        config.engine_socket.as_deref(),
        &resolver,
        tls.as_ref(),
    )?;

    println!("Container engine at {socket} is responding.");
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn ping_service(config: &HarnessConfig) -> TestpodResult<()> {
    let env = DefaultEnv::new();
    let service_endpoint = config.service.endpoint(&env)?;
    let pool_settings = config.pool.settings()?;
    let rt = EngineConnector::create_runtime()?;

    rt.block_on(async {
        let pool = ServicePool::build(
            Arc::new(RedisDialer::new()),
            service_endpoint.clone(),
            pool_settings,
        )
        .await?;
        let mut conn = pool.get().await?;
        conn.probe().await?;
        conn.release().await?;
        pool.close();
        TestpodResult::Ok(())
    })?;

    println!("Service at {service_endpoint} answered the probe.");
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
fn run_service(config: &HarnessConfig) -> TestpodResult<()> {
    let image = config.service.image_reference()?;
    let pool_settings = config.pool.settings()?;
    let readiness = config.readiness.policy()?;

    let env = DefaultEnv::new();
    let resolver = SocketResolver::new(&env);
    let tls = engine_tls(config, &resolver)?;
    let socket = EngineConnector::resolve_socket(config.engine_socket.as_deref(), &resolver);
    let rt = EngineConnector::create_runtime()?;

    let service_endpoint: Endpoint = rt.block_on(async {
        let docker = EngineConnector::connect_and_verify_async(
            config.engine_socket.as_deref(),
            &resolver,
            tls.as_ref(),
        )
        .await?;
        let harness = Harness::new(
            docker,
            RedisDialer::new(),
            HarnessSettings {
                readiness,
                runtime_host_hint: Some(socket),
            },
        );

        harness
            .with_service(&image, &config.service.port, pool_settings, |pool| async move {
                let mut conn = pool.get().await?;
                conn.probe().await?;
                conn.release().await?;
                TestpodResult::Ok(pool.endpoint().clone())
            })
            .await
    })?;

    println!("Service from {image} answered at {service_endpoint}; container removed.");
    Ok(())
}
