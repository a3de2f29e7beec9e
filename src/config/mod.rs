//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Registry (blocking read)
//!     → decode.rs (allow-list decode of the open-ended config map)
//!     → schema.rs (apply defaults, exactly once)
//!     → watcher.rs (diff against last produced, publish if distinct)
//!     → Arc<Config> on a capacity-one channel
//!
//! Static file:
//!     loader.rs (parse & deserialize) → schema.rs defaults → StaticConfigWatcher
//!
//! Sidecar settings:
//!     loader.rs → CLI overrides → validation.rs → Settings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once emitted; a change is a new `Arc<Config>`
//! - Defaults are idempotent so re-applying them is harmless
//! - A bad update never replaces the last good config
//! - Validation separates syntactic (serde) from semantic checks

pub mod decode;
pub mod loader;
pub mod schema;
pub mod settings;
pub mod validation;
pub mod watcher;

pub use decode::{decode_registration, DecodeError};
pub use schema::{Config, PublicListenerConfig, UpstreamConfig};
pub use settings::Settings;
pub use watcher::{AgentConfigWatcher, ConfigWatcher, StaticConfigWatcher, WatchError, WatchOptions};
