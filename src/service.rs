//! Dashboard service
//!
//! Owns the sources, aggregator, cache and hub for one dashboard. Builds
//! are single-flight: a caller arriving while a build runs waits for it
//! and is served that build's result instead of starting another.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::cache::SnapshotCache;
use crate::config::{Config, CredentialsConfig, SourcesConfig};
use crate::error::AppError;
use crate::hub::BroadcastHub;
use crate::metrics;
use crate::models::{DashboardSnapshot, ExchangeRates, Fetched, PriceRecord};
use crate::sources::{
    self, build_http_client, AveragePriceEstimator, ExchangeRateFetcher, PricingFetcher,
    PricingSource, RateSource, TokenProvider, UsageFetcher, UsageMap, UsageSource,
};

/// Sources a service is built from; swapped for stubs in tests
pub struct ServiceSources {
    pub pricing: Arc<dyn PricingSource>,
    pub usage: Arc<dyn UsageSource>,
    pub rates: Arc<dyn RateSource>,
}

pub struct DashboardService {
    client: reqwest::Client,
    sources_config: SourcesConfig,
    scope: String,
    cache: Arc<SnapshotCache>,
    hub: Arc<BroadcastHub>,
    aggregator: Aggregator,
    pricing: Arc<dyn PricingSource>,
    usage: Arc<dyn UsageSource>,
    rates: Arc<dyn RateSource>,
    refresh_lock: Mutex<()>,
    max_staleness: Duration,
}

impl DashboardService {
    /// Build a service wired to the HTTP sources named in `config`
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = build_http_client(config.sources.timeout())?;
        let cache = Arc::new(SnapshotCache::new());

        let tokens = Arc::new(TokenProvider::new(
            client.clone(),
            &config.sources,
            config.credentials.clone(),
            cache.clone(),
        ));
        let sources = ServiceSources {
            pricing: Arc::new(PricingFetcher::new(client.clone(), &config.sources)),
            usage: Arc::new(UsageFetcher::new(
                client.clone(),
                &config.sources,
                tokens,
                Arc::new(AveragePriceEstimator),
            )),
            rates: Arc::new(ExchangeRateFetcher::new(
                client.clone(),
                config.sources.exchange_rate_url.clone(),
                config.sources.timeout(),
                config.exchange_rate_interval(),
            )),
        };

        Ok(Self::with_sources(config, client, cache, sources))
    }

    pub fn with_sources(
        config: &Config,
        client: reqwest::Client,
        cache: Arc<SnapshotCache>,
        sources: ServiceSources,
    ) -> Self {
        let scope = config.credentials.subscription_scope();
        let aggregator = Aggregator::new(
            sources.pricing.clone(),
            sources.usage.clone(),
            sources.rates.clone(),
            scope.clone(),
            config.sources.region.clone(),
            config.dashboard.sparkline,
        );

        Self {
            client,
            sources_config: config.sources.clone(),
            scope,
            hub: Arc::new(BroadcastHub::new(cache.clone())),
            cache,
            aggregator,
            pricing: sources.pricing,
            usage: sources.usage,
            rates: sources.rates,
            refresh_lock: Mutex::new(()),
            max_staleness: config.max_staleness(),
        }
    }

    pub fn cache(&self) -> &Arc<SnapshotCache> {
        &self.cache
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Build, cache and broadcast a new snapshot
    ///
    /// On failure nothing is published and the previous snapshot stays
    /// current.
    pub async fn refresh(&self) -> Result<Arc<DashboardSnapshot>, AppError> {
        let before = self.cache.current();
        let _guard = self.refresh_lock.lock().await;

        // A build finished while we waited for the lock; serve its result
        let after = self.cache.current();
        if let Some(current) = &after {
            let changed = match &before {
                Some(previous) => !Arc::ptr_eq(previous, current),
                None => true,
            };
            if changed {
                return Ok(current.clone());
            }
        }

        let started = Instant::now();
        match self.aggregator.build_snapshot().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.cache.publish(snapshot.clone());
                let report = self.hub.on_publish(snapshot.clone());
                metrics::record_snapshot_build("published", started.elapsed());

                info!(
                    models = snapshot.models.len(),
                    total_cost = snapshot.summary.total_cost,
                    pricing = snapshot.health.pricing.as_str(),
                    usage = snapshot.health.usage.as_str(),
                    exchange_rate = snapshot.health.exchange_rate.as_str(),
                    delivered = report.delivered,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Snapshot published"
                );
                Ok(snapshot)
            }
            Err(e) => {
                metrics::record_snapshot_build("failed", started.elapsed());
                error!(error = %e, "Snapshot build failed, keeping previous snapshot");
                Err(e)
            }
        }
    }

    /// Current snapshot, rebuilt first when missing or older than the staleness limit
    pub async fn dashboard(&self) -> Result<Arc<DashboardSnapshot>, AppError> {
        let current = self.cache.current();
        if let Some(snapshot) = &current {
            if snapshot.age_at(chrono::Utc::now()) < self.max_staleness {
                return Ok(snapshot.clone());
            }
        }

        match self.refresh().await {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => match current {
                Some(previous) => {
                    warn!(error = %e, "Rebuild failed, serving previous snapshot");
                    Ok(previous)
                }
                None => Err(AppError::NotReady(format!("no snapshot available: {}", e))),
            },
        }
    }

    pub async fn pricing(&self) -> Fetched<Vec<PriceRecord>> {
        self.pricing.fetch_pricing(&self.sources_config.region).await
    }

    pub async fn usage(&self) -> Fetched<UsageMap> {
        self.usage
            .fetch_usage(&self.scope, &self.sources_config.region)
            .await
    }

    pub async fn exchange_rates(&self) -> Fetched<ExchangeRates> {
        self.rates.snapshot_rate().await
    }

    /// Scheduled rate refresh, independent of snapshot builds
    pub async fn refresh_exchange_rates(&self) -> Fetched<ExchangeRates> {
        self.rates.fetch_rate().await
    }

    /// Token exchange only; errors are returned, not degraded
    pub async fn test_credentials(&self, credentials: &CredentialsConfig) -> Result<(), AppError> {
        sources::test_credentials(&self.client, &self.sources_config, credentials).await
    }
}
