//! Pull API: the merged snapshot and the individual source outputs

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

use super::AppState;
use crate::config::CredentialsConfig;
use crate::error::AppError;
use crate::models::{DashboardSnapshot, ExchangeRates, Fetched, PriceRecord, UsageRecord};

/// GET /api/dashboard - current snapshot, built on demand when missing or stale
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<Arc<DashboardSnapshot>>, AppError> {
    Ok(Json(state.service.dashboard().await?))
}

/// GET /api/pricing
pub async fn get_pricing(State(state): State<AppState>) -> Json<Fetched<Vec<PriceRecord>>> {
    Json(state.service.pricing().await)
}

/// GET /api/usage - usage records ordered by model
pub async fn get_usage(State(state): State<AppState>) -> Json<Fetched<Vec<UsageRecord>>> {
    let fetched = state.service.usage().await;
    let mut records: Vec<UsageRecord> = fetched.data.into_values().collect();
    records.sort_by_key(|r| r.canonical_model);
    Json(Fetched::fallback(records, fetched.status))
}

/// GET /api/exchange-rates
pub async fn get_exchange_rates(State(state): State<AppState>) -> Json<Fetched<ExchangeRates>> {
    Json(state.service.exchange_rates().await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConfigRequest {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// POST /api/test-config - token exchange only, errors are reported as-is
pub async fn test_config(
    State(state): State<AppState>,
    Json(request): Json<TestConfigRequest>,
) -> Result<Json<Value>, AppError> {
    info!(
        tenant_id = %request.tenant_id,
        client_id = %request.client_id,
        "Testing candidate credentials"
    );

    let credentials = CredentialsConfig {
        tenant_id: request.tenant_id,
        client_id: request.client_id,
        client_secret: request.client_secret,
        subscription_id: String::new(),
    };
    state.service.test_credentials(&credentials).await?;

    Ok(Json(json!({ "success": true })))
}
