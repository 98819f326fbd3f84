//! Command implementations for the CLI
//!
//! - start: serve the dashboard and run the scheduler
//! - test: validate configuration, optionally the credentials too
//! - snapshot: build one snapshot and print it
//! - config: configuration display and validation

pub mod config;
pub mod snapshot;
pub mod start;
