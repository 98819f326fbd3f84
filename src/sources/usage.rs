//! Cost query fetcher
//!
//! The cost source returns a table of daily cost rows per meter. Rows are
//! grouped by canonical model; rows whose meter names no model are
//! discarded. Token and request figures are filled in by the configured
//! [`TokenEstimator`].

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::estimation::TokenEstimator;
use super::token::TokenProvider;
use super::{ensure_success, request_error, UsageMap, UsageSource};
use crate::config::SourcesConfig;
use crate::error::AppError;
use crate::metrics;
use crate::models::{identify_model, CanonicalModel, DailyCost, Fetched, SourceStatus, UsageRecord};

const API_VERSION: &str = "2023-03-01";

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub properties: QueryProperties,
}

#[derive(Debug, Deserialize)]
pub struct QueryProperties {
    #[serde(default)]
    pub columns: Vec<QueryColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
pub struct QueryColumn {
    pub name: String,
    #[serde(rename = "type", default)]
    pub column_type: String,
}

/// Positions of the columns we read, located by name
#[derive(Debug)]
struct ColumnIndex {
    cost: usize,
    date: usize,
    meter: usize,
    currency: Option<usize>,
}

impl ColumnIndex {
    fn locate(columns: &[QueryColumn]) -> Result<Self, AppError> {
        let find = |names: &[&str]| {
            columns
                .iter()
                .position(|c| names.iter().any(|n| c.name.eq_ignore_ascii_case(n)))
        };

        let missing = |name: &str| AppError::ParseError(format!("cost query has no {} column", name));

        Ok(Self {
            cost: find(&["Cost", "PreTaxCost", "CostUSD"]).ok_or_else(|| missing("Cost"))?,
            date: find(&["UsageDate"]).ok_or_else(|| missing("UsageDate"))?,
            meter: find(&["MeterName"]).ok_or_else(|| missing("MeterName"))?,
            currency: find(&["Currency"]),
        })
    }
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `UsageDate` as a `yyyymmdd` number or an ISO date / datetime string
fn parse_usage_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .and_then(compact_date),
        Value::String(s) => {
            let s = s.trim();
            if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
                return s.parse().ok().and_then(compact_date);
            }
            let date_part = s.get(..10).unwrap_or(s);
            NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
        }
        _ => None,
    }
}

fn compact_date(raw: u64) -> Option<NaiveDate> {
    let (year, month, day) = (raw / 10_000, (raw / 100) % 100, raw % 100);
    NaiveDate::from_ymd_opt(i32::try_from(year).ok()?, month as u32, day as u32)
}

#[derive(Default)]
struct ModelTotals {
    total_cost: f64,
    currency: Option<String>,
    by_day: BTreeMap<NaiveDate, f64>,
}

/// Group cost rows by canonical model
///
/// Rows with an unrecognised meter or an unreadable cost or date are
/// skipped. A model that appears only with zero cost is still reported.
pub fn parse_cost_rows(
    properties: &QueryProperties,
    estimator: &dyn TokenEstimator,
) -> Result<UsageMap, AppError> {
    let index = ColumnIndex::locate(&properties.columns)?;
    let mut totals: HashMap<CanonicalModel, ModelTotals> = HashMap::new();
    let mut skipped = 0usize;

    for row in &properties.rows {
        let meter = row.get(index.meter).and_then(Value::as_str).unwrap_or_default();
        let Some(model) = identify_model(meter) else {
            skipped += 1;
            continue;
        };
        let cost = row.get(index.cost).and_then(as_f64).filter(|c| c.is_finite());
        let date = row.get(index.date).and_then(parse_usage_date);
        let (Some(cost), Some(date)) = (cost, date) else {
            skipped += 1;
            continue;
        };

        let entry = totals.entry(model).or_default();
        entry.total_cost += cost;
        *entry.by_day.entry(date).or_insert(0.0) += cost;
        if entry.currency.is_none() {
            entry.currency = index
                .currency
                .and_then(|i| row.get(i))
                .and_then(Value::as_str)
                .map(str::to_string);
        }
    }

    if skipped > 0 {
        debug!(skipped, "Skipped unmatched or unreadable cost rows");
    }

    Ok(totals
        .into_iter()
        .map(|(model, totals)| (model, build_record(model, totals, estimator)))
        .collect())
}

fn build_record(model: CanonicalModel, totals: ModelTotals, estimator: &dyn TokenEstimator) -> UsageRecord {
    let estimate = estimator.estimate(model, totals.total_cost);
    let daily_series = totals
        .by_day
        .into_iter()
        .map(|(date, cost)| DailyCost {
            date,
            cost,
            tokens: estimator.estimate(model, cost).total_tokens(),
        })
        .collect();

    UsageRecord {
        canonical_model: model,
        total_cost: totals.total_cost,
        currency: totals.currency.unwrap_or_else(|| "USD".to_string()),
        estimated_input_tokens: estimate.input_tokens,
        estimated_output_tokens: estimate.output_tokens,
        request_count_estimate: estimate.requests,
        daily_series,
    }
}

pub struct UsageFetcher {
    client: reqwest::Client,
    management_url: String,
    lookback_days: u32,
    timeout: Duration,
    tokens: Arc<TokenProvider>,
    estimator: Arc<dyn TokenEstimator>,
    last_good: ArcSwapOption<UsageMap>,
}

impl UsageFetcher {
    pub fn new(
        client: reqwest::Client,
        sources: &SourcesConfig,
        tokens: Arc<TokenProvider>,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Self {
        Self {
            client,
            management_url: sources.management_url.clone(),
            lookback_days: sources.lookback_days,
            timeout: sources.timeout(),
            tokens,
            estimator,
            last_good: ArcSwapOption::empty(),
        }
    }

    fn query_body(&self, region: &str) -> Value {
        let to = Utc::now().date_naive();
        let from = to - ChronoDuration::days(i64::from(self.lookback_days.saturating_sub(1)));

        json!({
            "type": "ActualCost",
            "timeframe": "Custom",
            "timePeriod": {
                "from": format!("{}T00:00:00Z", from),
                "to": format!("{}T23:59:59Z", to),
            },
            "dataset": {
                "granularity": "Daily",
                "aggregation": {
                    "totalCost": { "name": "Cost", "function": "Sum" }
                },
                "grouping": [
                    { "type": "Dimension", "name": "MeterName" },
                    { "type": "Dimension", "name": "ServiceName" }
                ],
                "filter": {
                    "dimensions": {
                        "name": "ResourceLocation",
                        "operator": "In",
                        "values": [region]
                    }
                }
            }
        })
    }

    async fn fetch_live(&self, scope: &str, region: &str) -> Result<UsageMap, AppError> {
        let token = self.tokens.get_token().await?;

        let url = format!(
            "{}/{}/providers/Microsoft.CostManagement/query",
            self.management_url.trim_end_matches('/'),
            scope.trim_matches('/')
        );

        let response = self
            .client
            .post(&url)
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(token)
            .json(&self.query_body(region))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(request_error)?;
        let response = ensure_success(response).await?;
        let body = response.text().await.map_err(request_error)?;
        let parsed: QueryResponse = serde_json::from_str(&body)?;

        debug!(rows = parsed.properties.rows.len(), "Fetched cost rows");
        parse_cost_rows(&parsed.properties, self.estimator.as_ref())
    }

    fn fallback(&self) -> Fetched<UsageMap> {
        match self.last_good.load_full() {
            Some(usage) => Fetched::fallback(usage.as_ref().clone(), SourceStatus::Stale),
            None => Fetched::fallback(UsageMap::new(), SourceStatus::Default),
        }
    }
}

#[async_trait]
impl UsageSource for UsageFetcher {
    async fn fetch_usage(&self, scope: &str, region: &str) -> Fetched<UsageMap> {
        let started = Instant::now();
        let result = self.fetch_live(scope, region).await;
        metrics::record_source_latency("usage", started.elapsed());

        let fetched = match result {
            Ok(usage) => {
                info!(models = usage.len(), region, "Usage refreshed");
                self.last_good.store(Some(Arc::new(usage.clone())));
                Fetched::live(usage)
            }
            Err(e) => {
                let fetched = self.fallback();
                warn!(
                    error = %e,
                    fallback = fetched.status.as_str(),
                    "Usage fetch failed, serving fallback"
                );
                fetched
            }
        };

        metrics::record_source_fetch("usage", fetched.status);
        fetched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotCache;
    use crate::config::create_test_config;
    use crate::sources::estimation::AveragePriceEstimator;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SCOPE: &str = "subscriptions/aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

    fn columns() -> Value {
        json!([
            {"name": "Cost", "type": "Number"},
            {"name": "UsageDate", "type": "Number"},
            {"name": "MeterName", "type": "String"},
            {"name": "ServiceName", "type": "String"},
            {"name": "Currency", "type": "String"}
        ])
    }

    fn properties(rows: Value) -> QueryProperties {
        serde_json::from_value(json!({ "columns": columns(), "rows": rows })).unwrap()
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/11111111-2222-3333-4444-555555555555/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "expires_in": 3599,
                "access_token": "usage-token"
            })))
            .mount(server)
            .await;
    }

    fn fetcher_for(server: &MockServer) -> UsageFetcher {
        let mut config = create_test_config();
        config.sources.authority_url = server.uri();
        config.sources.management_url = server.uri();
        let client = reqwest::Client::new();
        let tokens = Arc::new(TokenProvider::new(
            client.clone(),
            &config.sources,
            config.credentials.clone(),
            Arc::new(SnapshotCache::new()),
        ));
        UsageFetcher::new(client, &config.sources, tokens, Arc::new(AveragePriceEstimator))
    }

    #[test]
    fn test_rows_group_by_model_with_daily_series() {
        let props = properties(json!([
            [1.5, 20250302, "gpt 4o 0806 Inp regnl", "Foundry Models", "USD"],
            [0.5, 20250301, "gpt 4o 0806 Outp regnl", "Foundry Models", "USD"],
            [1.0, 20250301, "gpt 4o 0806 Inp regnl", "Foundry Models", "USD"],
            [0.2, 20250301, "gpt-4o-mini-0718-Inp-glbl", "Foundry Models", "USD"]
        ]));

        let usage = parse_cost_rows(&props, &AveragePriceEstimator).unwrap();

        let gpt4o = &usage[&CanonicalModel::Gpt4o];
        assert!((gpt4o.total_cost - 3.0).abs() < 1e-9);
        assert_eq!(gpt4o.daily_series.len(), 2);
        assert_eq!(gpt4o.daily_series[0].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert!((gpt4o.daily_series[0].cost - 1.5).abs() < 1e-9);
        assert!((gpt4o.daily_series[1].cost - 1.5).abs() < 1e-9);

        let mini = &usage[&CanonicalModel::Gpt4oMini];
        assert!((mini.total_cost - 0.2).abs() < 1e-9);
        assert!(!usage.contains_key(&CanonicalModel::Gpt41));
    }

    #[test]
    fn test_token_estimates_follow_seventy_thirty_split() {
        let props = properties(json!([[4.75, 20250301, "gpt-4o input", "x", "USD"]]));
        let usage = parse_cost_rows(&props, &AveragePriceEstimator).unwrap();
        let record = &usage[&CanonicalModel::Gpt4o];

        let total = record.total_tokens() as i64;
        assert!((total - 1_000_000).abs() <= 1, "got {}", total);
        assert_eq!(record.estimated_input_tokens, record.total_tokens() * 7 / 10);
        assert!(record.request_count_estimate >= 999);
    }

    #[test]
    fn test_unmatched_and_unreadable_rows_are_skipped() {
        let props = properties(json!([
            [9.0, 20250301, "Standard Page Blob", "Storage", "USD"],
            ["n/a", 20250301, "gpt-4.1 input", "Foundry Models", "USD"],
            [1.0, "not a date", "gpt-4.1 input", "Foundry Models", "USD"],
            [0.0, 20250301, "o1 output", "Foundry Models", "USD"]
        ]));
        let usage = parse_cost_rows(&props, &AveragePriceEstimator).unwrap();

        assert_eq!(usage.len(), 1);
        let o1 = &usage[&CanonicalModel::O1];
        assert_eq!(o1.total_cost, 0.0);
        assert_eq!(o1.total_tokens(), 0);
        assert_eq!(o1.request_count_estimate, 0);
    }

    #[test]
    fn test_columns_are_located_by_name_case_insensitively() {
        let props: QueryProperties = serde_json::from_value(json!({
            "columns": [
                {"name": "meterName", "type": "String"},
                {"name": "usageDate", "type": "Datetime"},
                {"name": "PreTaxCost", "type": "Number"}
            ],
            "rows": [["o3 mini input", "2025-03-04T00:00:00", "2.09"]]
        }))
        .unwrap();

        let usage = parse_cost_rows(&props, &AveragePriceEstimator).unwrap();
        let record = &usage[&CanonicalModel::O3Mini];
        assert!((record.total_cost - 2.09).abs() < 1e-9);
        assert_eq!(record.currency, "USD");
        assert_eq!(record.daily_series[0].date, NaiveDate::from_ymd_opt(2025, 3, 4).unwrap());
    }

    #[test]
    fn test_missing_cost_column_is_parse_error() {
        let props: QueryProperties = serde_json::from_value(json!({
            "columns": [{"name": "UsageDate"}, {"name": "MeterName"}],
            "rows": []
        }))
        .unwrap();

        let err = parse_cost_rows(&props, &AveragePriceEstimator).unwrap_err();
        assert!(matches!(err, AppError::ParseError(_)));
    }

    #[test]
    fn test_parse_usage_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 31);
        assert_eq!(parse_usage_date(&json!(20250131)), expected);
        assert_eq!(parse_usage_date(&json!("2025-01-31")), expected);
        assert_eq!(parse_usage_date(&json!("2025-01-31T00:00:00Z")), expected);
        assert_eq!(parse_usage_date(&json!("20250131")), expected);
        assert_eq!(parse_usage_date(&json!(20251340)), None);
        assert_eq!(parse_usage_date(&json!(null)), None);
    }

    #[tokio::test]
    async fn test_fetch_usage_sends_bearer_token() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/providers/Microsoft.CostManagement/query", SCOPE)))
            .and(query_param("api-version", API_VERSION))
            .and(header("authorization", "Bearer usage-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "columns": columns(),
                    "rows": [[0.0, 20250301, "gpt-4o input", "Foundry Models", "USD"]]
                }
            })))
            .mount(&server)
            .await;

        let fetched = fetcher_for(&server).fetch_usage(SCOPE, "swedencentral").await;

        assert_eq!(fetched.status, SourceStatus::Live);
        assert_eq!(fetched.data[&CanonicalModel::Gpt4o].total_cost, 0.0);
    }

    #[tokio::test]
    async fn test_token_failure_degrades_to_empty_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/11111111-2222-3333-4444-555555555555/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_client"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/providers/Microsoft.CostManagement/query", SCOPE)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let fetched = fetcher_for(&server).fetch_usage(SCOPE, "swedencentral").await;

        assert_eq!(fetched.status, SourceStatus::Default);
        assert!(fetched.data.is_empty());
    }

    #[tokio::test]
    async fn test_query_failure_serves_last_known_good() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/providers/Microsoft.CostManagement/query", SCOPE)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "columns": columns(),
                    "rows": [[2.0, 20250301, "gpt-4.1 output", "Foundry Models", "USD"]]
                }
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/{}/providers/Microsoft.CostManagement/query", SCOPE)))
            .respond_with(ResponseTemplate::new(429).set_body_string("throttled"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server);
        let live = fetcher.fetch_usage(SCOPE, "swedencentral").await;
        let stale = fetcher.fetch_usage(SCOPE, "swedencentral").await;

        assert_eq!(live.status, SourceStatus::Live);
        assert_eq!(stale.status, SourceStatus::Stale);
        assert_eq!(stale.data, live.data);
    }
}
