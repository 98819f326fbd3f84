use anyhow::Result;
use cost_dashboard::{config, service::DashboardService};
use std::path::Path;
use tracing::info;

/// Execute the snapshot command
///
/// Runs a single aggregation against the live sources and prints the
/// resulting snapshot to stdout.
pub async fn execute(config_path: &Path, pretty: bool) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    let service = DashboardService::new(&cfg)?;

    let snapshot = service.refresh().await?;
    info!(
        models = snapshot.models.len(),
        degraded = snapshot.health.is_degraded(),
        "Snapshot built"
    );

    let json = if pretty {
        serde_json::to_string_pretty(snapshot.as_ref())?
    } else {
        serde_json::to_string(snapshot.as_ref())?
    };
    println!("{}", json);

    Ok(())
}
