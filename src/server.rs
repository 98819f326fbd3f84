use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    handlers::{self, AppState},
    metrics,
    scheduler::Scheduler,
    service::DashboardService,
    signals::setup_signal_handlers,
};

/// Start the dashboard server
///
/// This function:
/// 1. Initializes metrics
/// 2. Sets up signal handlers for graceful shutdown
/// 3. Builds the service and starts the scheduler
/// 4. Binds to the configured address
/// 5. Serves requests until a shutdown signal arrives
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let service = Arc::new(DashboardService::new(&config)?);
    let scheduler_handles = Scheduler::new(service.clone(), &config).spawn(&shutdown_tx);

    let app = create_router(AppState { service }, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting cost dashboard on {}", addr);
    info!(
        "Configuration: region {}, refresh every {}s, sparkline {:?}",
        config.sources.region,
        config.schedule.refresh_interval_seconds,
        config.dashboard.sparkline
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutdown signal received, draining connections...");
        })
        .await?;

    for handle in scheduler_handles {
        handle.await?;
    }
    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, metrics_handle: Arc<PrometheusHandle>) -> Router {
    let api_routes = Router::new()
        .route("/api/dashboard", get(handlers::dashboard::get_dashboard))
        .route("/api/pricing", get(handlers::dashboard::get_pricing))
        .route("/api/usage", get(handlers::dashboard::get_usage))
        .route("/api/exchange-rates", get(handlers::dashboard::get_exchange_rates))
        .route("/api/test-config", post(handlers::dashboard::test_config))
        .route("/api/ws", get(handlers::push::ws_handler))
        .route("/ready", get(handlers::health::readiness_check))
        .with_state(state);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
