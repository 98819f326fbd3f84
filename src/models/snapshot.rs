use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::canonical::CanonicalModel;
use super::records::{ExchangeRates, SourceStatus, UsageRecord};

/// One bucket of the short-interval sparkline
///
/// Synthesised from the usage total, not measured. The usage source has
/// daily granularity only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SparkPoint {
    /// Bucket start, `HH:00` UTC
    pub label: String,
    pub cost: f64,
    pub tokens: u64,
}

/// Merged pricing and usage for one canonical model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
    pub canonical_model: CanonicalModel,
    pub input_price: f64,
    pub output_price: f64,
    pub currency: String,
    pub region: String,
    pub usage: UsageRecord,
    /// Signed percent change between the last two days, e.g. `+12%`
    pub trend: String,
    pub trend_percent: f64,
    pub sparkline: Vec<SparkPoint>,
    /// Always true: the sparkline is illustrative
    pub sparkline_synthetic: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub total_cost: f64,
    pub total_tokens: u64,
    pub total_requests: u64,
    /// 0 when there are no requests
    pub avg_cost_per_request: f64,
    pub top_model: Option<CanonicalModel>,
    pub peak_hour: Option<String>,
}

/// Provenance of each source that fed a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceHealth {
    pub pricing: SourceStatus,
    pub usage: SourceStatus,
    pub exchange_rate: SourceStatus,
}

impl SourceHealth {
    pub fn is_degraded(&self) -> bool {
        [self.pricing, self.usage, self.exchange_rate]
            .iter()
            .any(|s| *s != SourceStatus::Live)
    }
}

/// One complete aggregation result; immutable once published
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    /// Unique by canonical model, in pricing order
    pub models: Vec<ModelSnapshot>,
    pub summary: Summary,
    pub exchange_rate: ExchangeRates,
    pub health: SourceHealth,
    pub generated_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn model(&self, model: CanonicalModel) -> Option<&ModelSnapshot> {
        self.models.iter().find(|m| m.canonical_model == model)
    }

    /// Age of the snapshot relative to `now`; negative ages count as zero
    pub fn age_at(&self, now: DateTime<Utc>) -> std::time::Duration {
        (now - self.generated_at).to_std().unwrap_or_default()
    }
}
