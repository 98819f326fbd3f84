//! USD exchange rates
//!
//! The scheduler refreshes rates on their own, slower interval. Snapshot
//! builds reuse the cached rates while they are younger than that
//! interval, so the rate source is not queried on every build.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::{ensure_success, request_error, RateSource};
use crate::error::AppError;
use crate::metrics;
use crate::models::{ExchangeRates, Fetched, SourceStatus};

#[derive(Debug, Deserialize)]
struct RateResponse {
    #[serde(alias = "conversion_rates")]
    rates: HashMap<String, f64>,
    time_last_update_unix: Option<i64>,
}

/// Extract the tracked rates; both must be present and positive
fn parse_rates(body: &str, now: DateTime<Utc>) -> Result<ExchangeRates, AppError> {
    let parsed: RateResponse = serde_json::from_str(body)?;

    let rate = |code: &str| {
        parsed
            .rates
            .get(code)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
            .ok_or_else(|| AppError::ParseError(format!("rate for {} missing or invalid", code)))
    };

    let last_update = parsed
        .time_last_update_unix
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or(now);

    Ok(ExchangeRates {
        usd_czk: rate("CZK")?,
        usd_eur: rate("EUR")?,
        last_update,
    })
}

#[derive(Debug, Clone)]
struct RateState {
    rates: ExchangeRates,
    status: SourceStatus,
    attempted_at: Option<DateTime<Utc>>,
}

pub struct ExchangeRateFetcher {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
    /// Cached rates older than this are refreshed by a snapshot build
    max_age: Duration,
    state: ArcSwap<RateState>,
}

impl ExchangeRateFetcher {
    pub fn new(client: reqwest::Client, url: String, timeout: Duration, max_age: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
            max_age,
            state: ArcSwap::from_pointee(RateState {
                rates: ExchangeRates::default(),
                status: SourceStatus::Default,
                attempted_at: None,
            }),
        }
    }

    /// Cached rates without touching the network
    pub fn current(&self) -> Fetched<ExchangeRates> {
        let state = self.state.load();
        Fetched::fallback(state.rates.clone(), state.status)
    }

    async fn fetch_live(&self) -> Result<ExchangeRates, AppError> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(request_error)?;
        parse_rates(&body, Utc::now())
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        let state = self.state.load();
        match state.attempted_at {
            Some(at) => (now - at).to_std().map(|age| age < self.max_age).unwrap_or(true),
            None => false,
        }
    }
}

#[async_trait]
impl RateSource for ExchangeRateFetcher {
    async fn fetch_rate(&self) -> Fetched<ExchangeRates> {
        let started = Instant::now();
        let result = self.fetch_live().await;
        metrics::record_source_latency("exchange_rate", started.elapsed());

        let previous = self.state.load_full();
        let next = match result {
            Ok(rates) => {
                info!(
                    usd_czk = rates.usd_czk,
                    usd_eur = rates.usd_eur,
                    "Exchange rates refreshed"
                );
                RateState {
                    rates,
                    status: SourceStatus::Live,
                    attempted_at: Some(Utc::now()),
                }
            }
            Err(e) => {
                // Rates stay exactly as they were; only provenance changes
                let status = match previous.status {
                    SourceStatus::Default => SourceStatus::Default,
                    _ => SourceStatus::Stale,
                };
                warn!(
                    error = %e,
                    fallback = status.as_str(),
                    "Exchange rate fetch failed, keeping previous rates"
                );
                RateState {
                    rates: previous.rates.clone(),
                    status,
                    attempted_at: Some(Utc::now()),
                }
            }
        };

        let fetched = Fetched::fallback(next.rates.clone(), next.status);
        self.state.store(Arc::new(next));
        metrics::record_source_fetch("exchange_rate", fetched.status);
        fetched
    }

    async fn snapshot_rate(&self) -> Fetched<ExchangeRates> {
        if self.is_fresh(Utc::now()) {
            return self.current();
        }
        self.fetch_rate().await
    }
}
