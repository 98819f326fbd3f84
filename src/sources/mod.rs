//! External data sources
//!
//! Each fetcher degrades instead of failing: a transient error is logged and
//! the last known-good value (or a built-in default) is returned, tagged
//! with a [`SourceStatus`] so the dashboard can show where its data came
//! from. Only the token provider propagates its errors.

pub mod estimation;
pub mod exchange;
pub mod pricing;
pub mod token;
pub mod usage;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{CanonicalModel, ExchangeRates, Fetched, PriceRecord, UsageRecord};

pub use estimation::{AveragePriceEstimator, TokenEstimate, TokenEstimator};
pub use exchange::ExchangeRateFetcher;
pub use pricing::PricingFetcher;
pub use token::{test_credentials, TokenProvider};
pub use usage::UsageFetcher;

pub type UsageMap = HashMap<CanonicalModel, UsageRecord>;

#[async_trait]
pub trait PricingSource: Send + Sync {
    /// Complete price records for `region`; never fails
    async fn fetch_pricing(&self, region: &str) -> Fetched<Vec<PriceRecord>>;
}

#[async_trait]
pub trait UsageSource: Send + Sync {
    /// Usage per canonical model for `scope`; never fails
    async fn fetch_usage(&self, scope: &str, region: &str) -> Fetched<UsageMap>;
}

#[async_trait]
pub trait RateSource: Send + Sync {
    /// Query the source now; the previous value is returned on error
    async fn fetch_rate(&self) -> Fetched<ExchangeRates>;

    /// Rates for a snapshot build. Implementations may serve a recent
    /// cached value instead of querying on every build.
    async fn snapshot_rate(&self) -> Fetched<ExchangeRates> {
        self.fetch_rate().await
    }
}

/// Shared HTTP client for all sources
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| AppError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Timeouts get their own variant so they are reported distinctly
pub(crate) fn request_error(err: reqwest::Error) -> AppError {
    if err.is_timeout() {
        AppError::Timeout(err.to_string())
    } else {
        AppError::HttpRequest(err)
    }
}

/// Turn a non-2xx response into an upstream error carrying a body excerpt
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::UpstreamError {
        status,
        message: excerpt(&body),
    })
}

fn excerpt(body: &str) -> String {
    const MAX_CHARS: usize = 200;
    if body.chars().count() <= MAX_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_CHARS).collect();
        format!("{}...", cut)
    }
}
