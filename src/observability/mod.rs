//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Watcher, registry client, launcher:
//!     → logging.rs (structured events on stderr)
//!     → metrics.rs (counters and gauges, optional Prometheus endpoint)
//! ```
//!
//! # Design Decisions
//! - The process lives only until the data plane is exec'd, so metrics are
//!   off by default and mostly useful while a registration is missing
//! - Log state transitions as fields (`state = "starting"`) rather than prose

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LoggingError};
pub use metrics::init_metrics;
