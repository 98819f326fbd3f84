use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::canonical::CanonicalModel;

/// Unit prices for one canonical model, both sides present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub canonical_model: CanonicalModel,
    /// Price per input token
    pub input_unit_price: f64,
    /// Price per output token
    pub output_unit_price: f64,
    pub currency: String,
    pub region: String,
    pub observed_at: DateTime<Utc>,
}

/// One day of consumption for a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyCost {
    pub date: NaiveDate,
    pub cost: f64,
    /// Estimated, see [`crate::sources::estimation`]
    pub tokens: u64,
}

/// Aggregated consumption of one canonical model over the lookback window
///
/// Token and request counts are estimates derived from cost, not
/// measurements. The usage source reports money only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub canonical_model: CanonicalModel,
    pub total_cost: f64,
    pub currency: String,
    pub estimated_input_tokens: u64,
    pub estimated_output_tokens: u64,
    pub request_count_estimate: u64,
    /// Ascending by date
    pub daily_series: Vec<DailyCost>,
}

impl UsageRecord {
    pub fn zero(model: CanonicalModel) -> Self {
        Self {
            canonical_model: model,
            total_cost: 0.0,
            currency: "USD".to_string(),
            estimated_input_tokens: 0,
            estimated_output_tokens: 0,
            request_count_estimate: 0,
            daily_series: Vec::new(),
        }
    }

    pub fn total_tokens(&self) -> u64 {
        self.estimated_input_tokens
            .saturating_add(self.estimated_output_tokens)
    }
}

/// Conversion rates relative to USD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRates {
    #[serde(rename = "USD_CZK")]
    pub usd_czk: f64,
    #[serde(rename = "USD_EUR")]
    pub usd_eur: f64,
    #[serde(rename = "lastUpdate")]
    pub last_update: DateTime<Utc>,
}

impl Default for ExchangeRates {
    /// Built-in rates served until the first successful fetch
    fn default() -> Self {
        Self {
            usd_czk: 23.0,
            usd_eur: 0.92,
            last_update: DateTime::<Utc>::default(),
        }
    }
}

/// Where a fetcher's data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    /// Fetched successfully in this call
    Live,
    /// Last known-good data served after a failure
    Stale,
    /// Built-in defaults; the source has never succeeded
    Default,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Live => "live",
            SourceStatus::Stale => "stale",
            SourceStatus::Default => "default",
        }
    }
}

/// Fetcher output tagged with its provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fetched<T> {
    pub data: T,
    pub status: SourceStatus,
}

impl<T> Fetched<T> {
    pub fn live(data: T) -> Self {
        Self { data, status: SourceStatus::Live }
    }

    pub fn fallback(data: T, status: SourceStatus) -> Self {
        Self { data, status }
    }
}
