//! Mock HTTP sources shared by the integration tests

#![allow(dead_code)]

use cost_dashboard::config::{
    Config, CredentialsConfig, DashboardConfig, ScheduleConfig, ServerConfig, SourcesConfig,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TENANT_ID: &str = "11111111-2222-3333-4444-555555555555";
pub const CLIENT_ID: &str = "66666666-7777-8888-9999-000000000000";
pub const SUBSCRIPTION_ID: &str = "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";

/// One mock server standing in for all four external sources
pub struct SourceMocks {
    pub server: MockServer,
}

impl SourceMocks {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    /// Configuration pointing every source at the mock server
    pub fn config(&self) -> Config {
        let uri = self.server.uri();
        Config {
            server: ServerConfig::default(),
            credentials: CredentialsConfig {
                tenant_id: TENANT_ID.to_string(),
                client_id: CLIENT_ID.to_string(),
                client_secret: "integration-secret".to_string(),
                subscription_id: SUBSCRIPTION_ID.to_string(),
            },
            sources: SourcesConfig {
                authority_url: uri.clone(),
                pricing_url: format!("{}/prices", uri),
                management_url: uri.clone(),
                exchange_rate_url: format!("{}/rates", uri),
                timeout_seconds: 5,
                ..SourcesConfig::default()
            },
            schedule: ScheduleConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }

    pub fn token_path() -> String {
        format!("/{}/oauth2/v2.0/token", TENANT_ID)
    }

    pub fn usage_path() -> String {
        format!(
            "/subscriptions/{}/providers/Microsoft.CostManagement/query",
            SUBSCRIPTION_ID
        )
    }

    pub async fn mount_token_ok(&self) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "integration-token"
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_token_rejected(&self) {
        Mock::given(method("POST"))
            .and(path(Self::token_path()))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "invalid_client",
                "error_description": "AADSTS7000215: Invalid client secret provided."
            })))
            .mount(&self.server)
            .await;
    }

    /// Catalog entries as `(meterName, retailPrice)` pairs, one page
    pub async fn mount_pricing(&self, entries: &[(&str, f64)]) {
        let items: Vec<Value> = entries
            .iter()
            .map(|(name, price)| {
                json!({
                    "meterName": name,
                    "retailPrice": price,
                    "unitPrice": price,
                    "currencyCode": "USD",
                    "unitOfMeasure": "1",
                    "armRegionName": "swedencentral"
                })
            })
            .collect();

        Mock::given(method("GET"))
            .and(path("/prices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": items,
                "NextPageLink": null
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_pricing_failure(&self) {
        Mock::given(method("GET"))
            .and(path("/prices"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }

    /// Cost rows as `(cost, yyyymmdd, meterName)`
    pub async fn mount_usage(&self, rows: &[(f64, u32, &str)]) {
        let rows: Vec<Value> = rows
            .iter()
            .map(|(cost, date, meter)| json!([cost, date, meter, "Foundry Models", "USD"]))
            .collect();

        Mock::given(method("POST"))
            .and(path(Self::usage_path()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "properties": {
                    "columns": [
                        {"name": "Cost", "type": "Number"},
                        {"name": "UsageDate", "type": "Number"},
                        {"name": "MeterName", "type": "String"},
                        {"name": "ServiceName", "type": "String"},
                        {"name": "Currency", "type": "String"}
                    ],
                    "rows": rows
                }
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_usage_failure(&self) {
        Mock::given(method("POST"))
            .and(path(Self::usage_path()))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_rates(&self, czk: f64, eur: f64) {
        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": "success",
                "rates": {"USD": 1.0, "CZK": czk, "EUR": eur}
            })))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_rates_failure(&self) {
        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&self.server)
            .await;
    }

    /// Every data source answers successfully, but only after `delay`
    pub async fn mount_slow_sources(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path("/prices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "Items": [
                            {"meterName": "gpt-4o input", "retailPrice": 0.0000025},
                            {"meterName": "gpt-4o output", "retailPrice": 0.00001}
                        ]
                    }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(Self::usage_path()))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "properties": {
                            "columns": [
                                {"name": "Cost", "type": "Number"},
                                {"name": "UsageDate", "type": "Number"},
                                {"name": "MeterName", "type": "String"}
                            ],
                            "rows": [[5.0, 20250301, "gpt-4o input"]]
                        }
                    }))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;

        Mock::given(method("GET"))
            .and(path("/rates"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"rates": {"CZK": 24.0, "EUR": 0.95}}))
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }
}
