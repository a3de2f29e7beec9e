//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     First config → Resolve upstreams → Render bootstrap → Launch
//!
//! Launch (exec.rs, descriptor.rs):
//!     Bootstrap bytes → Anonymous fd → exec(data plane, /dev/fd/N)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT before launch → Shutdown → Exit cleanly
//! ```
//!
//! # Design Decisions
//! - Launch replaces the process image; there is no child to supervise
//! - Only the first configuration is used; later updates belong to the data plane

#[cfg(unix)]
pub mod descriptor;
pub mod exec;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use exec::{data_plane_args, exec_data_plane, DataPlane, ExecError, Launcher};
pub use shutdown::Shutdown;
pub use startup::Sidecar;
