use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::models::SourceStatus;

/// Install the Prometheus recorder; fails if one is already installed
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "dashboard_source_fetches_total",
        "Source fetches by source and resulting data status"
    );
    describe_histogram!(
        "dashboard_source_fetch_duration_seconds",
        "Source fetch duration in seconds, including fallback handling"
    );
    describe_counter!(
        "dashboard_token_exchanges_total",
        "Client-credentials token exchanges by outcome"
    );
    describe_counter!(
        "dashboard_snapshot_builds_total",
        "Snapshot builds by outcome"
    );
    describe_histogram!(
        "dashboard_snapshot_build_duration_seconds",
        "Snapshot build duration in seconds"
    );
    describe_gauge!(
        "dashboard_subscribers",
        "Currently connected push subscribers"
    );
    describe_counter!(
        "dashboard_broadcast_deliveries_total",
        "Snapshot deliveries to push subscribers by outcome"
    );
    describe_gauge!(
        "dashboard_info",
        "Dashboard version information"
    );

    gauge!("dashboard_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record one source fetch and the status of the data it produced
pub fn record_source_fetch(source: &'static str, status: SourceStatus) {
    counter!(
        "dashboard_source_fetches_total",
        "source" => source,
        "status" => status.as_str(),
    )
    .increment(1);
}

pub fn record_source_latency(source: &'static str, duration: Duration) {
    histogram!(
        "dashboard_source_fetch_duration_seconds",
        "source" => source,
    )
    .record(duration.as_secs_f64());
}

pub fn record_token_exchange(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    counter!("dashboard_token_exchanges_total", "outcome" => outcome).increment(1);
}

/// Record a snapshot build; `outcome` is `published` or `failed`
pub fn record_snapshot_build(outcome: &'static str, duration: Duration) {
    counter!("dashboard_snapshot_builds_total", "outcome" => outcome).increment(1);
    histogram!("dashboard_snapshot_build_duration_seconds").record(duration.as_secs_f64());
}

pub fn set_subscribers(count: usize) {
    gauge!("dashboard_subscribers").set(count as f64);
}

pub fn record_broadcast(delivered: u64, dropped: u64) {
    counter!("dashboard_broadcast_deliveries_total", "outcome" => "delivered").increment(delivered);
    counter!("dashboard_broadcast_deliveries_total", "outcome" => "dropped").increment(dropped);
}
