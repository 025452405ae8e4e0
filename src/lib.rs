//! substream - watches certificate transparency logs for new subdomains.
//!
//! The library wires a certstream feed through label extraction, noise
//! filtering, and frequency tracking, then hands the resulting notifications
//! to the configured outputs.
pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod deduplication;
pub mod formatting;
pub mod internal_metrics;
pub mod network;
pub mod noise;
pub mod notification;
pub mod outputs;
pub mod pipeline;
pub mod scope;
pub mod store;
pub mod suffix;
pub mod task_manager;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export core types for convenience
pub use core::*;
