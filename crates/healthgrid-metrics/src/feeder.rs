//! Result feeder: turns buffered check results into per-service metrics.
//!
//! Counters are atomics; the service map is only write-locked when a
//! service is seen for the first time.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use healthgrid_health::ServiceRegistry;
use healthgrid_state::{CheckResult, Severity};
use tokio::sync::{RwLock, watch};
use tracing::{debug, info};

/// Per-service metrics bucket.
struct ServiceMetrics {
    checks_total: AtomicU64,
    failures_total: AtomicU64,
    last_ok: AtomicBool,
    last_acked: AtomicBool,
    last_severity: AtomicU64,
    last_updated: AtomicU64,
}

impl ServiceMetrics {
    fn new() -> Self {
        Self {
            checks_total: AtomicU64::new(0),
            failures_total: AtomicU64::new(0),
            last_ok: AtomicBool::new(false),
            last_acked: AtomicBool::new(false),
            last_severity: AtomicU64::new(Severity::FLOOR.value() as u64),
            last_updated: AtomicU64::new(0),
        }
    }

    fn record(&self, result: &CheckResult) {
        self.checks_total.fetch_add(1, Ordering::Relaxed);
        if !result.ok {
            self.failures_total.fetch_add(1, Ordering::Relaxed);
        }
        self.last_ok.store(result.ok, Ordering::Relaxed);
        self.last_acked.store(result.is_acked(), Ordering::Relaxed);
        self.last_severity
            .store(result.severity.value() as u64, Ordering::Relaxed);
        self.last_updated
            .store(result.last_updated, Ordering::Relaxed);
    }
}

/// Point-in-time view of one service's metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    pub service: String,
    pub checks_total: u64,
    pub failures_total: u64,
    pub last_ok: bool,
    pub last_acked: bool,
    pub last_severity: u8,
    /// Epoch seconds of the last recorded result.
    pub last_updated: u64,
}

/// Drains the registry's result buffers on an interval.
pub struct ResultFeeder {
    registry: Arc<ServiceRegistry>,
    metrics: RwLock<HashMap<String, Arc<ServiceMetrics>>>,
    interval: Duration,
}

impl ResultFeeder {
    pub fn new(registry: Arc<ServiceRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            metrics: RwLock::new(HashMap::new()),
            interval,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Fold one result into its service's bucket.
    pub async fn record(&self, result: &CheckResult) {
        if let Some(m) = self.metrics.read().await.get(&result.name) {
            m.record(result);
            return;
        }

        let mut metrics = self.metrics.write().await;
        metrics
            .entry(result.name.clone())
            .or_insert_with(|| Arc::new(ServiceMetrics::new()))
            .record(result);
    }

    /// Drain every entity's buffer once. Returns the number of results fed.
    pub async fn feed(&self) -> usize {
        let mut fed = 0;
        for entity in self.registry.entities().await {
            for result in entity.buffer().drain().await {
                self.record(&result).await;
                fed += 1;
            }
        }
        debug!(results = fed, "fed check results into metrics");
        fed
    }

    /// Current metrics of every service seen so far, sorted by name.
    pub async fn snapshot(&self) -> Vec<ServiceSnapshot> {
        let metrics = self.metrics.read().await;
        let mut snapshots: Vec<ServiceSnapshot> = metrics
            .iter()
            .map(|(service, m)| ServiceSnapshot {
                service: service.clone(),
                checks_total: m.checks_total.load(Ordering::Relaxed),
                failures_total: m.failures_total.load(Ordering::Relaxed),
                last_ok: m.last_ok.load(Ordering::Relaxed),
                last_acked: m.last_acked.load(Ordering::Relaxed),
                last_severity: m.last_severity.load(Ordering::Relaxed) as u8,
                last_updated: m.last_updated.load(Ordering::Relaxed),
            })
            .collect();
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    /// Run the feed loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "result feeder started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    self.feed().await;
                }
                _ = shutdown.changed() => {
                    info!("result feeder shutting down");
                    // Final feed before exit.
                    self.feed().await;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthgrid_health::EngineConfig;
    use healthgrid_health::testing::FakeInventory;
    use healthgrid_state::Service;

    fn feeder(fake: FakeInventory) -> (Arc<FakeInventory>, ResultFeeder) {
        let fake = Arc::new(fake);
        let registry = Arc::new(ServiceRegistry::new(fake.clone(), EngineConfig::default()));
        (fake, ResultFeeder::new(registry, Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn record_counts_checks_and_failures() {
        let (_, feeder) = feeder(FakeInventory::new());

        feeder.record(&CheckResult::healthy("api")).await;
        feeder
            .record(&CheckResult::failed("api", Severity::CRITICAL, "down"))
            .await;
        feeder
            .record(&CheckResult::failed("api", Severity::FLOOR, "slow").with_ack("known"))
            .await;

        let snapshots = feeder.snapshot().await;
        assert_eq!(snapshots.len(), 1);
        let api = &snapshots[0];
        assert_eq!(api.checks_total, 3);
        assert_eq!(api.failures_total, 2);
        assert!(!api.last_ok);
        assert!(api.last_acked);
        assert_eq!(api.last_severity, 2);
    }

    #[tokio::test]
    async fn snapshot_is_sorted() {
        let (_, feeder) = feeder(FakeInventory::new());
        for name in ["zeta", "alpha", "mu"] {
            feeder.record(&CheckResult::healthy(name)).await;
        }
        let names: Vec<_> = feeder
            .snapshot()
            .await
            .into_iter()
            .map(|s| s.service)
            .collect();
        assert_eq!(names, vec!["alpha", "mu", "zeta"]);
    }

    #[tokio::test(start_paused = true)]
    async fn feed_drains_entity_buffers() {
        let (_, feeder) = feeder(
            FakeInventory::new()
                .with_service(Service::new("api", 8080))
                .with_unhealthy_service("api", "down"),
        );
        feeder
            .registry()
            .reconcile(vec![Service::new("api", 8080)])
            .await;

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feeder.feed().await, 1);
        assert_eq!(feeder.feed().await, 0);

        let api = &feeder.snapshot().await[0];
        assert_eq!(api.checks_total, 1);
        assert_eq!(api.failures_total, 1);
        assert!(!api.last_ok);

        feeder.registry().stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn run_feeds_on_interval_and_on_shutdown() {
        let fake = Arc::new(FakeInventory::new().with_service(Service::new("api", 8080)));
        let registry = Arc::new(ServiceRegistry::new(fake, EngineConfig::default()));
        // Off-beat with the 60s refresh so each feed sees a settled buffer.
        let feeder = Arc::new(ResultFeeder::new(registry, Duration::from_secs(90)));
        feeder
            .registry()
            .reconcile(vec![Service::new("api", 8080)])
            .await;

        let (tx, rx) = watch::channel(false);
        let task = {
            let feeder = feeder.clone();
            tokio::spawn(async move { feeder.run(rx).await })
        };

        tokio::time::sleep(Duration::from_secs(91)).await;
        assert_eq!(feeder.snapshot().await[0].checks_total, 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(feeder.snapshot().await[0].checks_total, 3);
        feeder.registry().stop_all().await;
    }
}
