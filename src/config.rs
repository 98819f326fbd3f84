use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Client credentials used for the token exchange and the usage scope
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CredentialsConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub subscription_id: String,
}

impl CredentialsConfig {
    /// Reject malformed credentials before any network call is attempted
    pub fn validate(&self) -> Result<(), AppError> {
        validate_guid("tenant_id", &self.tenant_id)?;
        validate_guid("client_id", &self.client_id)?;
        if self.client_secret.trim().is_empty() {
            return Err(AppError::ConfigError(
                "client_secret cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Usage query scope derived from the subscription id
    pub fn subscription_scope(&self) -> String {
        format!("subscriptions/{}", self.subscription_id)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Identity authority; the tenant id is appended
    pub authority_url: String,
    pub token_scope: String,
    pub pricing_url: String,
    pub pricing_service_name: String,
    pub management_url: String,
    pub exchange_rate_url: String,
    pub region: String,
    pub timeout_seconds: u64,
    pub lookback_days: u32,
    pub max_pricing_pages: usize,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            authority_url: "https://login.microsoftonline.com".to_string(),
            token_scope: "https://management.azure.com/.default".to_string(),
            pricing_url: "https://prices.azure.com/api/retail/prices".to_string(),
            pricing_service_name: "Foundry Models".to_string(),
            management_url: "https://management.azure.com".to_string(),
            exchange_rate_url: "https://open.er-api.com/v6/latest/USD".to_string(),
            region: "swedencentral".to_string(),
            timeout_seconds: 30,
            lookback_days: 30,
            max_pricing_pages: 20,
        }
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub refresh_interval_seconds: u64,
    pub exchange_rate_interval_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 30,
            exchange_rate_interval_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SparklineMode {
    /// Usage total spread over recent hourly buckets (illustrative only)
    #[default]
    Apportioned,
    /// No buckets; the source has no sub-daily granularity
    Flat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub sparkline: SparklineMode,
    /// Pull requests rebuild when the cached snapshot is older than this;
    /// `None` means twice the refresh interval
    pub max_staleness_seconds: Option<u64>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            sparkline: SparklineMode::Apportioned,
            max_staleness_seconds: None,
        }
    }
}

impl Config {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.refresh_interval_seconds)
    }

    pub fn exchange_rate_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.exchange_rate_interval_seconds)
    }

    pub fn max_staleness(&self) -> Duration {
        Duration::from_secs(
            self.dashboard
                .max_staleness_seconds
                .unwrap_or(self.schedule.refresh_interval_seconds * 2),
        )
    }
}

/// Load configuration from a TOML file layered with `COST_DASHBOARD__*` env vars
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("COST_DASHBOARD").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    cfg.credentials.validate()?;
    validate_guid("subscription_id", &cfg.credentials.subscription_id)?;

    if cfg.schedule.refresh_interval_seconds == 0 {
        anyhow::bail!("schedule.refresh_interval_seconds must be greater than zero");
    }
    if cfg.schedule.exchange_rate_interval_seconds == 0 {
        anyhow::bail!("schedule.exchange_rate_interval_seconds must be greater than zero");
    }
    if cfg.sources.timeout_seconds == 0 {
        anyhow::bail!("sources.timeout_seconds must be greater than zero");
    }
    if cfg.sources.lookback_days == 0 {
        anyhow::bail!("sources.lookback_days must be greater than zero");
    }

    for (name, url) in [
        ("authority_url", &cfg.sources.authority_url),
        ("pricing_url", &cfg.sources.pricing_url),
        ("management_url", &cfg.sources.management_url),
        ("exchange_rate_url", &cfg.sources.exchange_rate_url),
    ] {
        if url.trim().is_empty() {
            anyhow::bail!("sources.{} cannot be empty", name);
        }
    }

    if cfg.sources.region.trim().is_empty() {
        anyhow::bail!("sources.region cannot be empty");
    }

    Ok(())
}

fn validate_guid(field: &str, value: &str) -> Result<(), AppError> {
    Uuid::parse_str(value.trim())
        .map(|_| ())
        .map_err(|_| AppError::ConfigError(format!("{} must be a GUID, got '{}'", field, value)))
}

#[cfg(test)]
pub(crate) fn create_test_config() -> Config {
    Config {
        server: ServerConfig::default(),
        credentials: CredentialsConfig {
            tenant_id: "11111111-2222-3333-4444-555555555555".to_string(),
            client_id: "66666666-7777-8888-9999-000000000000".to_string(),
            client_secret: "test-secret-value".to_string(),
            subscription_id: "aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee".to_string(),
        },
        sources: SourcesConfig::default(),
        schedule: ScheduleConfig::default(),
        dashboard: DashboardConfig::default(),
    }
}
