//! Startup orchestration.
//!
//! # Responsibilities
//! - Wait for the first configuration from the watcher
//! - Resolve upstream descriptors and render the bootstrap
//! - Hand over to the data plane by replacing the process image
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal and maps to an exit status
//! - Nothing survives the hand-over; the new image rebuilds all state itself
//! - A shutdown signal before the first config exits cleanly

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::bootstrap::{render_bootstrap, BootstrapParams};
use crate::config::watcher::ConfigWatcher;
use crate::config::Config;
use crate::error::SidecarError;
use crate::lifecycle::exec::Launcher;

/// Drives one sidecar from first config to data-plane launch.
pub struct Sidecar<L> {
    launcher: L,
    params: BootstrapParams,
}

impl<L: Launcher> Sidecar<L> {
    pub fn new(launcher: L, params: BootstrapParams) -> Self {
        Self { launcher, params }
    }

    /// Wait for the first configuration, or `None` if shutdown came first.
    pub async fn first_config<W>(
        &self,
        watcher: &mut W,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Option<Arc<Config>>, SidecarError>
    where
        W: ConfigWatcher + ?Sized,
    {
        tracing::info!(state = "starting", "Waiting for proxy configuration");

        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!(state = "idle", "Shutdown requested before first configuration");
                Ok(None)
            }
            config = watcher.watch().recv() => match config {
                Some(config) => Ok(Some(config)),
                None => Err(SidecarError::WatcherClosed),
            },
        }
    }

    /// Resolve upstreams and render the bootstrap for `config`.
    pub fn prepare(&self, config: &Config) -> Result<Vec<u8>, SidecarError> {
        for upstream in &config.upstreams {
            let resolver = upstream.resolver()?;
            tracing::debug!(
                resolver = %resolver,
                local_bind = %format!("{}:{}", upstream.local_bind_address, upstream.local_bind_port),
                "Upstream descriptor"
            );
        }

        Ok(render_bootstrap(config, &self.params)?)
    }

    /// Run until the data plane replaces this process.
    ///
    /// Returns `Ok(())` only when shutdown arrives before any configuration.
    /// Every other return is a failure; on success the call never returns.
    pub async fn run<W>(&self, watcher: &mut W, mut shutdown: broadcast::Receiver<()>) -> Result<(), SidecarError>
    where
        W: ConfigWatcher + ?Sized,
    {
        let Some(config) = self.first_config(watcher, &mut shutdown).await? else {
            return Ok(());
        };

        let bootstrap = self.prepare(&config)?;

        // The watcher's task dies with this image; stop it first so nothing
        // is mid-read when exec happens.
        watcher.close();

        tracing::info!(
            state = "launching",
            service = %config.proxied_service_name,
            upstreams = config.upstreams.len(),
            "Handing over to data plane"
        );

        match self.launcher.launch(&bootstrap) {
            Ok(never) => match never {},
            Err(e) => {
                tracing::error!(error = %e, "Data plane launch failed; no process was started");
                Err(e.into())
            }
        }
    }
}
