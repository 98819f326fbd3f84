pub mod aggregator;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod service;
pub mod signals;
pub mod sources;

#[cfg(test)]
mod test_utils;

pub use logging::init_tracing;
