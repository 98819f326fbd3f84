//! Snapshot assembly
//!
//! The three sources are queried concurrently and the merge starts only
//! after all of them have settled. Each branch degrades on its own: a
//! failing usage or rate source yields fallback data and never aborts the
//! others. A panic in the usage or rate branch is contained the same way,
//! serving the last data that branch settled with. A panic in the pricing
//! branch or in the merge itself fails the whole build, because pricing
//! defines which models exist; the caller keeps serving the previous
//! snapshot and retries on its next tick.

pub mod series;
pub mod summary;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error};

use crate::config::SparklineMode;
use crate::error::AppError;
use crate::models::{
    DashboardSnapshot, ExchangeRates, Fetched, ModelSnapshot, PriceRecord, SourceHealth,
    SourceStatus, UsageRecord,
};
use crate::sources::{PricingSource, RateSource, UsageMap, UsageSource};

pub struct Aggregator {
    pricing: Arc<dyn PricingSource>,
    usage: Arc<dyn UsageSource>,
    rates: Arc<dyn RateSource>,
    scope: String,
    region: String,
    sparkline: SparklineMode,
    last_usage: ArcSwapOption<UsageMap>,
    last_rates: ArcSwapOption<ExchangeRates>,
}

impl Aggregator {
    pub fn new(
        pricing: Arc<dyn PricingSource>,
        usage: Arc<dyn UsageSource>,
        rates: Arc<dyn RateSource>,
        scope: String,
        region: String,
        sparkline: SparklineMode,
    ) -> Self {
        Self {
            pricing,
            usage,
            rates,
            scope,
            region,
            sparkline,
            last_usage: ArcSwapOption::empty(),
            last_rates: ArcSwapOption::empty(),
        }
    }

    /// Build one snapshot from all sources
    pub async fn build_snapshot(&self) -> Result<DashboardSnapshot, AppError> {
        let pricing = AssertUnwindSafe(self.pricing.fetch_pricing(&self.region)).catch_unwind();
        let usage =
            AssertUnwindSafe(self.usage.fetch_usage(&self.scope, &self.region)).catch_unwind();
        let rates = AssertUnwindSafe(self.rates.snapshot_rate()).catch_unwind();

        let (pricing, usage, rates) = futures::join!(pricing, usage, rates);

        let pricing = pricing.map_err(|panic| {
            AppError::InternalError(format!(
                "pricing fetch panicked: {}; snapshot not built",
                panic_message(panic.as_ref())
            ))
        })?;
        let usage = match usage {
            Ok(usage) => {
                if usage.status != SourceStatus::Default {
                    self.last_usage.store(Some(Arc::new(usage.data.clone())));
                }
                usage
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Usage fetch panicked");
                settled_or(&self.last_usage, UsageMap::new)
            }
        };
        let rates = match rates {
            Ok(rates) => {
                if rates.status != SourceStatus::Default {
                    self.last_rates.store(Some(Arc::new(rates.data.clone())));
                }
                rates
            }
            Err(panic) => {
                error!(panic = %panic_message(panic.as_ref()), "Exchange rate fetch panicked");
                settled_or(&self.last_rates, ExchangeRates::default)
            }
        };

        let now = Utc::now();
        let mode = self.sparkline;
        guard_merge(|| assemble(pricing, usage, rates, now, mode))
    }
}

/// Last data a branch settled with as stale, or `default` when it never settled
fn settled_or<T: Clone>(last: &ArcSwapOption<T>, default: impl FnOnce() -> T) -> Fetched<T> {
    match last.load_full() {
        Some(data) => Fetched::fallback(data.as_ref().clone(), SourceStatus::Stale),
        None => Fetched::fallback(default(), SourceStatus::Default),
    }
}

/// Run the merge, turning a panic into a failed build
fn guard_merge<F>(merge: F) -> Result<DashboardSnapshot, AppError>
where
    F: FnOnce() -> DashboardSnapshot,
{
    std::panic::catch_unwind(AssertUnwindSafe(merge)).map_err(|panic| {
        let message = panic_message(panic.as_ref());
        error!(panic = %message, "Snapshot merge panicked");
        AppError::InternalError(format!("snapshot merge panicked: {}", message))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Merge settled source outputs into a snapshot stamped `now`
///
/// One row per priced model, in pricing order; a repeated model keeps its
/// first record. Usage for models without a price is not shown.
pub fn assemble(
    pricing: Fetched<Vec<PriceRecord>>,
    usage: Fetched<UsageMap>,
    rates: Fetched<ExchangeRates>,
    now: DateTime<Utc>,
    mode: SparklineMode,
) -> DashboardSnapshot {
    let mut seen = HashSet::new();
    let models: Vec<ModelSnapshot> = pricing
        .data
        .into_iter()
        .filter(|price| seen.insert(price.canonical_model))
        .map(|price| {
            let model = price.canonical_model;
            let usage = usage
                .data
                .get(&model)
                .cloned()
                .unwrap_or_else(|| UsageRecord::zero(model));
            let (trend, trend_percent) = series::trend(&usage.daily_series);
            let sparkline = series::sparkline(model, &usage, now, mode);

            ModelSnapshot {
                canonical_model: model,
                input_price: price.input_unit_price,
                output_price: price.output_unit_price,
                currency: price.currency,
                region: price.region,
                usage,
                trend,
                trend_percent,
                sparkline,
                sparkline_synthetic: true,
            }
        })
        .collect();

    let unpriced = usage
        .data
        .keys()
        .filter(|model| !seen.contains(*model))
        .count();
    if unpriced > 0 {
        debug!(unpriced, "Usage present for models without a price");
    }

    DashboardSnapshot {
        summary: summary::summarize(&models),
        models,
        exchange_rate: rates.data,
        health: SourceHealth {
            pricing: pricing.status,
            usage: usage.status,
            exchange_rate: rates.status,
        },
        generated_at: now,
    }
}
