//! Top-level error type and process exit codes.

use thiserror::Error;

use crate::bootstrap::BootstrapError;
use crate::config::loader::ConfigError;
use crate::config::watcher::WatchError;
use crate::lifecycle::exec::ExecError;
use crate::observability::logging::LoggingError;
use crate::registry::RegistryError;
use crate::resolver::ResolveError;

/// Exit status for configuration problems (sysexits `EX_CONFIG`).
pub const EXIT_CONFIG: u8 = 78;

/// Exit status when the registry or proxy registration is unavailable (`EX_UNAVAILABLE`).
pub const EXIT_UNAVAILABLE: u8 = 69;

/// Exit status when the data plane could not be exec'd (`EX_OSERR`).
pub const EXIT_EXEC: u8 = 71;

/// Exit status when printing the bootstrap fails (`EX_IOERR`).
pub const EXIT_IO: u8 = 74;

/// Anything that stops the sidecar from handing over to the data plane.
#[derive(Debug, Error)]
pub enum SidecarError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Watch(#[from] WatchError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("metrics setup failed: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("config watcher closed before delivering a configuration")]
    WatcherClosed,

    #[error("failed to write bootstrap: {0}")]
    Output(#[source] std::io::Error),
}

impl SidecarError {
    /// Process exit status for this error.
    ///
    /// Exec failures get their own status so a supervisor can tell "the data
    /// plane could not start" apart from configuration or registry trouble.
    pub fn exit_code(&self) -> u8 {
        match self {
            SidecarError::Exec(_) => EXIT_EXEC,
            SidecarError::Registry(_) | SidecarError::WatcherClosed => EXIT_UNAVAILABLE,
            SidecarError::Watch(WatchError::Decode(_)) => EXIT_CONFIG,
            SidecarError::Watch(_) => EXIT_UNAVAILABLE,
            SidecarError::Output(_) => EXIT_IO,
            SidecarError::Config(_)
            | SidecarError::Resolve(_)
            | SidecarError::Bootstrap(_)
            | SidecarError::Logging(_)
            | SidecarError::Metrics(_) => EXIT_CONFIG,
        }
    }
}
