//! Process entrypoint. Follows `astria-bridge-withdrawer/src/main.rs`'s
//! shape (install error hook, load config, init telemetry, build the
//! service, wait for SIGTERM) adapted to `color-eyre`/`tracing-subscriber`
//! directly rather than the internal `astria-eyre`/`telemetry` crates those
//! services depend on (see DESIGN.md).

use std::process::ExitCode;

use auction_platform::{
    cli::Cli,
    config::Config,
    metrics_init,
};
use clap::Parser as _;
use tokio::signal::unix::{
    signal,
    SignalKind,
};
use tracing::{
    error,
    info,
    warn,
};

#[tokio::main]
async fn main() -> ExitCode {
    color_eyre::install().expect("color-eyre hook must be the first hook installed");

    let cfg = match Config::from_env() {
        Ok(cfg) => Cli::parse().apply(cfg),
        Err(error) => {
            eprintln!("failed to read configuration:\n{error:?}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = auction_platform::telemetry::init(&cfg.log_level) {
        eprintln!("failed to initialize telemetry:\n{error:?}");
        return ExitCode::FAILURE;
    }

    metrics_init::describe();

    info!(
        config = serde_json::to_string(&cfg).expect("Config always serializes"),
        "starting auction platform"
    );

    let mut sigterm = signal(SignalKind::terminate()).expect("setting a SIGTERM listener should always work on Unix");

    let (service, shutdown_handle) = match (auction_platform::Builder { config: cfg }).build().await {
        Ok(built) => built,
        Err(error) => {
            error!(%error, "failed to build auction platform service");
            return ExitCode::FAILURE;
        }
    };

    let service_handle = tokio::spawn(service.run());
    let shutdown_token = shutdown_handle.token();

    tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, issuing shutdown to all tasks");
            shutdown_handle.shutdown();
        }
        () = shutdown_token.cancelled() => {
            warn!("stopped waiting for SIGTERM");
        }
    }

    if let Err(error) = service_handle.await {
        error!(%error, "failed to join main service task");
    }

    info!("auction platform stopped");
    ExitCode::SUCCESS
}
