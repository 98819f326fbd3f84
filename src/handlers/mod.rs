pub mod dashboard;
pub mod health;
pub mod metrics_handler;
pub mod push;

use std::sync::Arc;

use crate::service::DashboardService;

/// State shared by the dashboard, push and readiness handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DashboardService>,
}
