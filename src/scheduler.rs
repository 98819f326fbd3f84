//! Fixed-interval drivers for snapshot builds and exchange-rate refreshes
//!
//! Each loop awaits its work inline, so a build that outlasts the interval
//! delays the next tick instead of overlapping it; missed ticks are
//! skipped. The two loops run as separate tasks and never wait on each
//! other.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::service::DashboardService;
use crate::signals::ShutdownSignal;

pub struct Scheduler {
    service: Arc<DashboardService>,
    refresh_interval: Duration,
    rate_interval: Duration,
}

impl Scheduler {
    pub fn new(service: Arc<DashboardService>, config: &Config) -> Self {
        Self::with_intervals(service, config.refresh_interval(), config.exchange_rate_interval())
    }

    pub fn with_intervals(
        service: Arc<DashboardService>,
        refresh_interval: Duration,
        rate_interval: Duration,
    ) -> Self {
        Self {
            service,
            refresh_interval,
            rate_interval,
        }
    }

    /// Start both loops; they stop when `shutdown` fires
    pub fn spawn(self, shutdown: &broadcast::Sender<ShutdownSignal>) -> Vec<JoinHandle<()>> {
        info!(
            "Starting scheduler (snapshot every {:?}, exchange rates every {:?})",
            self.refresh_interval, self.rate_interval
        );

        let snapshots = tokio::spawn(run_snapshot_loop(
            self.service.clone(),
            self.refresh_interval,
            shutdown.subscribe(),
        ));
        let rates = tokio::spawn(run_rate_loop(
            self.service,
            self.rate_interval,
            shutdown.subscribe(),
        ));

        vec![snapshots, rates]
    }
}

async fn run_snapshot_loop(
    service: Arc<DashboardService>,
    period: Duration,
    mut shutdown: broadcast::Receiver<ShutdownSignal>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                // Build errors are logged by the service; the next tick retries
                let service = service.clone();
                if let Err(e) = tokio::spawn(async move { service.refresh().await }).await {
                    error!(error = %e, "Snapshot build task panicked, retrying next tick");
                }
            }
            _ = shutdown.recv() => {
                debug!("Snapshot loop stopping");
                break;
            }
        }
    }
}

async fn run_rate_loop(
    service: Arc<DashboardService>,
    period: Duration,
    mut shutdown: broadcast::Receiver<ShutdownSignal>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                service.refresh_exchange_rates().await;
            }
            _ = shutdown.recv() => {
                debug!("Exchange rate loop stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::SnapshotCache;
    use crate::config::create_test_config;
    use crate::models::{CanonicalModel, ExchangeRates, Fetched, PriceRecord, SourceStatus};
    use crate::service::tests::{EmptyUsage, FixedRates};
    use crate::service::ServiceSources;
    use crate::sources::{PricingSource, RateSource, UsageMap, UsageSource};
    use crate::test_utils::{price, usage};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records how many builds are in flight at once
    #[derive(Default)]
    struct OverlapTracker {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PricingSource for OverlapTracker {
        async fn fetch_pricing(&self, _region: &str) -> Fetched<Vec<PriceRecord>> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(80)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Fetched::live(vec![price(CanonicalModel::Gpt4o, 2.5e-6, 1e-5)])
        }
    }

    #[derive(Default)]
    struct CountingRates {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateSource for CountingRates {
        async fn fetch_rate(&self) -> Fetched<ExchangeRates> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Fetched::fallback(ExchangeRates::default(), SourceStatus::Default)
        }
    }

    fn service(pricing: Arc<dyn PricingSource>, rates: Arc<dyn RateSource>) -> Arc<DashboardService> {
        Arc::new(DashboardService::with_sources(
            &create_test_config(),
            reqwest::Client::new(),
            Arc::new(SnapshotCache::new()),
            ServiceSources {
                pricing,
                usage: Arc::new(EmptyUsage),
                rates,
            },
        ))
    }

    #[tokio::test]
    async fn test_slow_builds_never_overlap() {
        let tracker = Arc::new(OverlapTracker::default());
        let service = service(tracker.clone(), Arc::new(FixedRates));
        let (shutdown, _) = broadcast::channel(4);

        let handles = Scheduler::with_intervals(
            service.clone(),
            Duration::from_millis(20),
            Duration::from_secs(3600),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.send(ShutdownSignal::Graceful).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(tracker.calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(tracker.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(service.cache().current().is_some());
    }

    /// Panics on the first build only
    #[derive(Default)]
    struct PanicsOnce {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PricingSource for PanicsOnce {
        async fn fetch_pricing(&self, _region: &str) -> Fetched<Vec<PriceRecord>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("catalog parser bug");
            }
            Fetched::live(vec![price(CanonicalModel::Gpt4o, 2.5e-6, 1e-5)])
        }
    }

    /// Usage whose token estimates sit at the integer limit
    struct SaturatedUsage;

    #[async_trait]
    impl UsageSource for SaturatedUsage {
        async fn fetch_usage(&self, _scope: &str, _region: &str) -> Fetched<UsageMap> {
            let mut record = usage(CanonicalModel::Gpt4o, &[2.0], 1);
            record.estimated_input_tokens = u64::MAX;
            record.estimated_output_tokens = 1;
            Fetched::live(UsageMap::from([(CanonicalModel::Gpt4o, record)]))
        }
    }

    #[tokio::test]
    async fn test_failed_build_does_not_stop_the_loop() {
        let pricing = Arc::new(PanicsOnce::default());
        let service = service(pricing.clone(), Arc::new(FixedRates));
        let (shutdown, _) = broadcast::channel(4);

        let handles = Scheduler::with_intervals(
            service.clone(),
            Duration::from_millis(20),
            Duration::from_secs(3600),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(300)).await;
        shutdown.send(ShutdownSignal::Graceful).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(pricing.calls.load(Ordering::SeqCst) >= 3);
        assert!(service.cache().current().is_some());
    }

    #[tokio::test]
    async fn test_saturated_estimates_keep_the_loop_running() {
        let pricing = Arc::new(OverlapTracker::default());
        let service = Arc::new(DashboardService::with_sources(
            &create_test_config(),
            reqwest::Client::new(),
            Arc::new(SnapshotCache::new()),
            ServiceSources {
                pricing: pricing.clone(),
                usage: Arc::new(SaturatedUsage),
                rates: Arc::new(FixedRates),
            },
        ));
        let (shutdown, _) = broadcast::channel(4);

        let handles = Scheduler::with_intervals(
            service.clone(),
            Duration::from_millis(20),
            Duration::from_secs(3600),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(400)).await;
        shutdown.send(ShutdownSignal::Graceful).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(pricing.calls.load(Ordering::SeqCst) >= 2);
        let snapshot = service.cache().current().unwrap();
        assert_eq!(snapshot.summary.total_tokens, u64::MAX);
    }

    #[tokio::test]
    async fn test_rate_loop_runs_independently() {
        let rates = Arc::new(CountingRates::default());
        let service = service(Arc::new(OverlapTracker::default()), rates.clone());
        let (shutdown, _) = broadcast::channel(4);

        let handles = Scheduler::with_intervals(
            service,
            Duration::from_secs(3600),
            Duration::from_millis(20),
        )
        .spawn(&shutdown);

        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.send(ShutdownSignal::Graceful).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(rates.calls.load(Ordering::SeqCst) >= 3);
    }
}
