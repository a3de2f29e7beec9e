//! Resilience helpers.
//!
//! Registry reads that fail are retried with capped exponential backoff;
//! the watcher never gives up on its own.

pub mod backoff;

pub use backoff::calculate_backoff;
