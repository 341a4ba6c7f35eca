//! LapFuel Monitor
//!
//! Drives the fuel engine against a telemetry provider and serves the live
//! delta, curve and status over HTTP.

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use lapfuel_adapters::{DemoProvider, IRacingProvider, IbtReplayProvider};
use lapfuel_core::{FuelEngine, JsonFileStore, TelemetryProvider};
use lapfuel_server::{api, config, manager, state};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    Iracing,
    Demo,
    Replay,
}

/// per-lap fuel usage monitor for iRacing
#[derive(Parser, Debug)]
#[clap(version, about)]
struct Cli {
    /// config file (default: <config dir>/lapfuel/config.json)
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// telemetry source
    #[clap(short = 'p', long, value_enum, default_value_t = ProviderKind::Iracing)]
    provider: ProviderKind,

    /// .ibt file to play back with `--provider replay`
    #[clap(long)]
    replay: Option<PathBuf>,

    /// HTTP port, overrides the config
    #[clap(long)]
    port: Option<u16>,
}

fn build_provider(cli: &Cli) -> Result<Box<dyn TelemetryProvider>> {
    Ok(match cli.provider {
        ProviderKind::Iracing => Box::new(IRacingProvider::new()),
        ProviderKind::Demo => Box::new(DemoProvider::new()),
        ProviderKind::Replay => match &cli.replay {
            Some(path) => Box::new(IbtReplayProvider::new(path.clone())),
            None => bail!("--provider replay needs --replay <file.ibt>"),
        },
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting LapFuel v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut monitor_config = config::MonitorConfig::load(&config_path);
    if let Some(port) = cli.port {
        monitor_config.port = port;
    }

    let provider = build_provider(&cli)?;
    let store = JsonFileStore::new(&monitor_config.data_file);
    info!("Fuel data file: {}", store.path().display());
    let engine = FuelEngine::new(monitor_config.engine, store);
    let port = monitor_config.port;

    let (state, commands) = state::AppState::new(monitor_config, Some(config_path));
    let app = api::create_router(state.clone());

    let cancel = CancellationToken::new();
    let monitor = tokio::spawn(manager::run(
        state.clone(),
        provider,
        engine,
        commands,
        cancel.clone(),
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Error waiting for Ctrl+C: {}", e);
                    }
                    info!("Received Ctrl+C");
                }
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    cancel.cancel();
    if let Err(e) = monitor.await {
        error!("Monitor task failed: {}", e);
    }

    info!("LapFuel stopped");
    Ok(())
}
