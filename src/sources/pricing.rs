//! Retail price catalog fetcher
//!
//! Input and output prices arrive as separate catalog entries. Each entry
//! is classified into (model, direction) and held pending until the other
//! direction for the same model is seen; only complete pairs are emitted.

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::{ensure_success, request_error, PricingSource};
use crate::config::SourcesConfig;
use crate::error::AppError;
use crate::metrics;
use crate::models::{
    classify_price_entry, CanonicalModel, Direction, Fetched, PriceRecord, SourceStatus,
};

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(rename = "Items", default)]
    items: Vec<serde_json::Value>,
    #[serde(rename = "NextPageLink", default)]
    next_page_link: Option<String>,
}

/// One catalog entry; unknown fields are ignored
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogItem {
    #[serde(default)]
    meter_name: String,
    #[serde(default)]
    sku_name: String,
    retail_price: Option<f64>,
    unit_price: Option<f64>,
    currency_code: Option<String>,
    unit_of_measure: Option<String>,
    arm_region_name: Option<String>,
}

impl CatalogItem {
    fn classify(&self) -> Option<(CanonicalModel, Direction)> {
        classify_price_entry(&self.meter_name).or_else(|| classify_price_entry(&self.sku_name))
    }

    /// Price per single token, `None` when absent or negative
    fn per_token_price(&self) -> Option<f64> {
        let price = self.retail_price.or(self.unit_price)?;
        if !price.is_finite() || price < 0.0 {
            return None;
        }
        Some(price / unit_divisor(self.unit_of_measure.as_deref()))
    }
}

/// Number of tokens a catalog price is quoted for: `1K` is 1000, `1M` a million
fn unit_divisor(unit_of_measure: Option<&str>) -> f64 {
    let Some(raw) = unit_of_measure else {
        return 1.0;
    };
    let head = raw.split_whitespace().next().unwrap_or("").to_uppercase();

    let (digits, multiplier) = if let Some(n) = head.strip_suffix('K') {
        (n, 1_000.0)
    } else if let Some(n) = head.strip_suffix('M') {
        (n, 1_000_000.0)
    } else {
        (head.as_str(), 1.0)
    };

    match digits.parse::<f64>() {
        Ok(n) if n > 0.0 => n * multiplier,
        _ => 1.0,
    }
}

#[derive(Debug, Default)]
struct PendingPrice {
    input: Option<f64>,
    output: Option<f64>,
    currency: Option<String>,
    region: Option<String>,
}

/// Parse raw catalog items into complete price records
///
/// Unmatched, malformed and excluded-tier entries are dropped. When a
/// model/direction is listed more than once the first price wins. Output
/// order follows the first appearance of each model.
pub fn parse_catalog(
    items: &[serde_json::Value],
    default_region: &str,
    observed_at: DateTime<Utc>,
) -> Vec<PriceRecord> {
    let mut order: Vec<CanonicalModel> = Vec::new();
    let mut pending: HashMap<CanonicalModel, PendingPrice> = HashMap::new();

    for raw in items {
        let Ok(item) = serde_json::from_value::<CatalogItem>(raw.clone()) else {
            continue;
        };
        let Some((model, direction)) = item.classify() else {
            continue;
        };
        let Some(price) = item.per_token_price() else {
            continue;
        };

        let entry = pending.entry(model).or_insert_with(|| {
            order.push(model);
            PendingPrice::default()
        });

        let slot = match direction {
            Direction::Input => &mut entry.input,
            Direction::Output => &mut entry.output,
        };
        if slot.is_none() {
            *slot = Some(price);
        }
        if entry.currency.is_none() {
            entry.currency = item.currency_code.clone();
        }
        if entry.region.is_none() {
            entry.region = item.arm_region_name.clone();
        }
    }

    order
        .into_iter()
        .filter_map(|model| {
            let price = pending.remove(&model)?;
            Some(PriceRecord {
                canonical_model: model,
                input_unit_price: price.input?,
                output_unit_price: price.output?,
                currency: price.currency.unwrap_or_else(|| "USD".to_string()),
                region: price.region.unwrap_or_else(|| default_region.to_string()),
                observed_at,
            })
        })
        .collect()
}

/// List prices served before the catalog has ever been reached
pub fn default_prices(region: &str, observed_at: DateTime<Utc>) -> Vec<PriceRecord> {
    const DEFAULTS: [(CanonicalModel, f64, f64); 9] = [
        (CanonicalModel::Gpt4o, 2.5e-6, 1e-5),
        (CanonicalModel::Gpt4oMini, 1.5e-7, 6e-7),
        (CanonicalModel::Gpt41, 2e-6, 8e-6),
        (CanonicalModel::Gpt41Mini, 4e-7, 1.6e-6),
        (CanonicalModel::Gpt41Nano, 1e-7, 4e-7),
        (CanonicalModel::O1, 1.5e-5, 6e-5),
        (CanonicalModel::O1Mini, 1.1e-6, 4.4e-6),
        (CanonicalModel::O3Mini, 1.1e-6, 4.4e-6),
        (CanonicalModel::Gpt35Turbo, 5e-7, 1.5e-6),
    ];

    DEFAULTS
        .iter()
        .map(|(model, input, output)| PriceRecord {
            canonical_model: *model,
            input_unit_price: *input,
            output_unit_price: *output,
            currency: "USD".to_string(),
            region: region.to_string(),
            observed_at,
        })
        .collect()
}

pub struct PricingFetcher {
    client: reqwest::Client,
    base_url: String,
    service_name: String,
    max_pages: usize,
    timeout: Duration,
    last_good: ArcSwapOption<Vec<PriceRecord>>,
}

impl PricingFetcher {
    pub fn new(client: reqwest::Client, sources: &SourcesConfig) -> Self {
        Self {
            client,
            base_url: sources.pricing_url.clone(),
            service_name: sources.pricing_service_name.clone(),
            max_pages: sources.max_pricing_pages.max(1),
            timeout: sources.timeout(),
            last_good: ArcSwapOption::empty(),
        }
    }

    fn filter(&self, region: &str) -> String {
        format!(
            "serviceName eq '{}' and armRegionName eq '{}'",
            self.service_name, region
        )
    }

    /// Fetch every page up to the page limit and parse the collected items
    async fn fetch_live(&self, region: &str) -> Result<Vec<PriceRecord>, AppError> {
        let mut items = Vec::new();
        let mut pages = 0;

        let first = self
            .client
            .get(&self.base_url)
            .query(&[("$filter", self.filter(region))]);
        let mut page = self.fetch_page(first).await?;

        loop {
            pages += 1;
            items.append(&mut page.items);

            let next = match page.next_page_link.take() {
                Some(link) if !link.is_empty() => link,
                _ => break,
            };
            if pages >= self.max_pages {
                warn!(pages, "Price catalog page limit reached, ignoring further pages");
                break;
            }
            page = self.fetch_page(self.client.get(&next)).await?;
        }

        debug!(pages, items = items.len(), "Fetched price catalog");

        let records = parse_catalog(&items, region, Utc::now());
        if records.is_empty() {
            return Err(AppError::ParseError(format!(
                "no complete model prices among {} catalog entries",
                items.len()
            )));
        }
        Ok(records)
    }

    async fn fetch_page(&self, request: reqwest::RequestBuilder) -> Result<CatalogPage, AppError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(request_error)?;
        Ok(serde_json::from_str(&body)?)
    }

    fn fallback(&self, region: &str) -> Fetched<Vec<PriceRecord>> {
        match self.last_good.load_full() {
            Some(records) => Fetched::fallback(records.as_ref().clone(), SourceStatus::Stale),
            None => Fetched::fallback(default_prices(region, Utc::now()), SourceStatus::Default),
        }
    }
}

#[async_trait]
impl PricingSource for PricingFetcher {
    async fn fetch_pricing(&self, region: &str) -> Fetched<Vec<PriceRecord>> {
        let started = Instant::now();
        let result = self.fetch_live(region).await;
        metrics::record_source_latency("pricing", started.elapsed());

        let fetched = match result {
            Ok(records) => {
                info!(models = records.len(), region, "Pricing refreshed");
                self.last_good.store(Some(Arc::new(records.clone())));
                Fetched::live(records)
            }
            Err(e) => {
                let fetched = self.fallback(region);
                warn!(
                    error = %e,
                    fallback = fetched.status.as_str(),
                    "Pricing fetch failed, serving fallback"
                );
                fetched
            }
        };

        metrics::record_source_fetch("pricing", fetched.status);
        fetched
    }
}
