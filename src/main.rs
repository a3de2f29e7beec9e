//! Service-mesh sidecar.
//!
//! ```text
//!   registry agent                      mesh-sidecar                       data plane
//!  ┌──────────────┐  blocking read  ┌──────────────────┐
//!  │ /v1/agent/   │◀────────────────│  ConfigWatcher   │
//!  │ connect/     │────────────────▶│   (first Config) │
//!  │ proxy/{id}   │                 └────────┬─────────┘
//!  └──────────────┘                          │ resolve upstreams
//!                                            ▼ render bootstrap
//!                                   ┌──────────────────┐   exec, /dev/fd/N  ┌──────────┐
//!                                   │     Sidecar      │───────────────────▶│  envoy   │
//!                                   └──────────────────┘   (same PID)       └──────────┘
//! ```

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast;

use mesh_sidecar::bootstrap::BootstrapParams;
use mesh_sidecar::cli::Cli;
use mesh_sidecar::config::loader::{check_settings, load_proxy_config, load_settings};
use mesh_sidecar::config::settings::Settings;
use mesh_sidecar::config::{AgentConfigWatcher, ConfigWatcher, StaticConfigWatcher};
use mesh_sidecar::error::SidecarError;
use mesh_sidecar::lifecycle::signals::spawn_signal_handler;
use mesh_sidecar::lifecycle::{DataPlane, Shutdown, Sidecar};
use mesh_sidecar::observability::{init_logging, init_metrics};
use mesh_sidecar::registry::AgentClient;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "mesh-sidecar exiting");
            eprintln!("mesh-sidecar: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), SidecarError> {
    let mut settings = match &cli.config {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    cli.apply_to(&mut settings);
    check_settings(&settings)?;

    init_logging(&settings.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "mesh-sidecar starting");

    if settings.observability.metrics_enabled {
        // Validated above.
        if let Ok(addr) = settings.observability.metrics_address.parse() {
            init_metrics(addr)?;
        }
    }

    let shutdown = Shutdown::new();
    // Subscribed before the handler exists, so an early signal is not missed.
    let mut stop = shutdown.subscribe();
    let signals = spawn_signal_handler(shutdown.clone());

    let Some(mut watcher) = build_watcher(&settings, &mut stop).await? else {
        return Ok(());
    };

    let sidecar = Sidecar::new(
        DataPlane::from_settings(&settings.data_plane),
        BootstrapParams::from_settings(&settings),
    );

    let result = if cli.bootstrap {
        print_bootstrap(&sidecar, watcher.as_mut(), &mut stop).await
    } else {
        sidecar.run(watcher.as_mut(), stop).await
    };

    watcher.close();
    signals.abort();
    result
}

/// Build the watcher for the configured source. `None` means shutdown was
/// requested while the initial registry read was in flight.
async fn build_watcher(
    settings: &Settings,
    stop: &mut broadcast::Receiver<()>,
) -> Result<Option<Box<dyn ConfigWatcher>>, SidecarError> {
    if let Some(path) = &settings.static_config_path {
        let config = load_proxy_config(path)?;
        tracing::info!(path = %path.display(), service = %config.proxied_service_name, "Using static proxy config");
        let watcher: Box<dyn ConfigWatcher> = Box::new(StaticConfigWatcher::new(config));
        return Ok(Some(watcher));
    }

    let client = Arc::new(AgentClient::new(
        &settings.registry.address,
        settings.registry.token.clone(),
    )?);
    tracing::info!(
        registry = %client.address(),
        proxy_id = %settings.proxy_id,
        "Watching proxy registration"
    );

    let options = settings.registry.watch_options();
    tokio::select! {
        _ = stop.recv() => Ok(None),
        watcher = AgentConfigWatcher::new(client, &settings.proxy_id, options) => {
            let watcher: Box<dyn ConfigWatcher> = Box::new(watcher?);
            Ok(Some(watcher))
        }
    }
}

async fn print_bootstrap(
    sidecar: &Sidecar<DataPlane>,
    watcher: &mut dyn ConfigWatcher,
    stop: &mut broadcast::Receiver<()>,
) -> Result<(), SidecarError> {
    let Some(config) = sidecar.first_config(watcher, stop).await? else {
        return Ok(());
    };
    let bootstrap = sidecar.prepare(&config)?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bootstrap).map_err(SidecarError::Output)?;
    stdout.write_all(b"\n").map_err(SidecarError::Output)?;
    Ok(())
}
