//! Data-plane process launch by image replacement.
//!
//! # Responsibilities
//! - Hand the bootstrap bytes to the data plane through an inherited descriptor
//! - Build the exact, order-sensitive argument vector
//! - Replace the current process image; nothing runs afterwards on success
//!
//! # Design Decisions
//! - No fork: PID and parent are preserved, so the supervisor keeps tracking us
//! - The descriptor is made inheritable only immediately before exec
//! - Hot restart in the data plane is always disabled; reloads happen by exec

use std::convert::Infallible;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::settings::DataPlaneSettings;

/// Pins the bootstrap schema version the data plane parses.
pub const V2_CONFIG_ONLY: &str = "--v2-config-only";

/// Turns off the data plane's own hot-restart machinery.
pub const DISABLE_HOT_RESTART: &str = "--disable-hot-restart";

/// Flag preceding the bootstrap path.
pub const CONFIG_PATH: &str = "--config-path";

/// Errors launching the data plane. Any of these means the current image is
/// still running and no data plane was started.
#[derive(Debug, Error)]
pub enum ExecError {
    /// Creating or filling the bootstrap descriptor failed.
    #[error("failed to prepare bootstrap descriptor: {0}")]
    Bootstrap(#[source] io::Error),

    /// Clearing close-on-exec on the descriptor failed.
    #[error("failed to make bootstrap descriptor inheritable: {0}")]
    Inherit(#[source] io::Error),

    /// The exec call itself failed (missing binary, permissions, E2BIG, ...).
    #[error("failed to exec '{}': {source}", .binary.display())]
    Exec {
        binary: PathBuf,
        #[source]
        source: io::Error,
    },

    /// This platform has no in-place process replacement.
    #[error("process image replacement is not supported on this platform")]
    Unsupported,
}

/// Argument vector passed to the data plane after argv[0].
///
/// `pre_args ++ [--v2-config-only, --disable-hot-restart, --config-path, <path>] ++ extra_args`
pub fn data_plane_args(pre_args: &[String], config_path: &str, extra_args: &[String]) -> Vec<String> {
    let mut args = Vec::with_capacity(pre_args.len() + extra_args.len() + 4);
    args.extend(pre_args.iter().cloned());
    args.extend([
        V2_CONFIG_ONLY.to_string(),
        DISABLE_HOT_RESTART.to_string(),
        CONFIG_PATH.to_string(),
        config_path.to_string(),
    ]);
    args.extend(extra_args.iter().cloned());
    args
}

/// Something that can start the data plane with a bootstrap document.
pub trait Launcher {
    /// Start the data plane. Returns only on failure.
    fn launch(&self, bootstrap: &[u8]) -> Result<Infallible, ExecError>;
}

/// The external data-plane binary and its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPlane {
    pub binary: PathBuf,
    pub pre_args: Vec<String>,
    pub extra_args: Vec<String>,
}

impl DataPlane {
    pub fn new(binary: impl Into<PathBuf>, pre_args: Vec<String>, extra_args: Vec<String>) -> Self {
        Self {
            binary: binary.into(),
            pre_args,
            extra_args,
        }
    }

    pub fn from_settings(settings: &DataPlaneSettings) -> Self {
        Self::new(
            settings.binary.clone(),
            settings.pre_args.clone(),
            settings.extra_args.clone(),
        )
    }
}

impl Launcher for DataPlane {
    fn launch(&self, bootstrap: &[u8]) -> Result<Infallible, ExecError> {
        exec_data_plane(&self.binary, &self.pre_args, &self.extra_args, bootstrap)
    }
}

/// Replace the current process with `binary`, handing it `bootstrap` through
/// an inherited descriptor.
///
/// argv[0] is `binary`; the remaining arguments are [`data_plane_args`]. The
/// environment is inherited. On success this never returns.
#[cfg(unix)]
pub fn exec_data_plane(
    binary: &Path,
    pre_args: &[String],
    extra_args: &[String],
    bootstrap: &[u8],
) -> Result<Infallible, ExecError> {
    use std::os::unix::process::CommandExt;
    use std::process::Command;

    use crate::lifecycle::descriptor::BootstrapFd;

    let fd = BootstrapFd::new(bootstrap).map_err(ExecError::Bootstrap)?;
    let args = data_plane_args(pre_args, &fd.path(), extra_args);

    tracing::info!(
        binary = %binary.display(),
        args = ?args,
        bootstrap_bytes = bootstrap.len(),
        "Replacing process image with data plane"
    );

    let mut command = Command::new(binary);
    command.args(&args);

    fd.set_inheritable(true).map_err(ExecError::Inherit)?;
    let source = command.exec();

    // Still running the old image. Don't leak the descriptor into anything
    // this process spawns while it reports the failure.
    let _ = fd.set_inheritable(false);
    Err(ExecError::Exec {
        binary: binary.to_path_buf(),
        source,
    })
}

#[cfg(not(unix))]
pub fn exec_data_plane(
    binary: &Path,
    _pre_args: &[String],
    _extra_args: &[String],
    _bootstrap: &[u8],
) -> Result<Infallible, ExecError> {
    tracing::error!(binary = %binary.display(), "Cannot replace process image on this platform");
    Err(ExecError::Unsupported)
}
