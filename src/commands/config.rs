use anyhow::Result;
use colored::Colorize;
use cost_dashboard::config::{self, Config};
use cost_dashboard::logging::mask_secret;
use std::path::Path;
use tracing::info;

/// Execute the config show command
///
/// Displays the current configuration with secrets masked
pub fn show(config_path: &Path) -> Result<()> {
    println!("{}", "Loading configuration...".yellow());
    info!("Loading configuration for display");

    let cfg = config::load_config(config_path)?;
    let sanitized = sanitize_secrets(&cfg);

    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(&sanitized)?;
    println!("{}", toml_string);

    Ok(())
}

/// Execute the config validate command
pub fn validate(config_path: &Path) -> Result<()> {
    println!("{}", "Validating configuration...".yellow());

    let cfg = config::load_config(config_path)?;

    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Tenant: {}", cfg.credentials.tenant_id);
    println!("  Client: {}", cfg.credentials.client_id);
    println!("  Region: {}", cfg.sources.region);

    info!("Configuration validation successful");
    Ok(())
}

/// Mask the client secret for safe display
fn sanitize_secrets(cfg: &Config) -> Config {
    let mut sanitized = cfg.clone();
    sanitized.credentials.client_secret = mask_secret(&cfg.credentials.client_secret);
    sanitized
}
