use anyhow::Result;
use colored::Colorize;
use cost_dashboard::{config, init_tracing, server};
use std::path::Path;
use tracing::info;

/// Execute the start command
///
/// Configuration is loaded and validated before anything is fetched; an
/// invalid configuration aborts start-up.
pub async fn execute(config_path: &Path) -> Result<()> {
    println!("{}", "Starting cost dashboard...".green());

    let cfg = config::load_config(config_path)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    info!(config = %config_path.display(), "Configuration loaded");

    server::start_server(cfg).await
}
