//! Monitored entities and the reconciler that keeps them in sync with the
//! inventory.
//!
//! Reconciliation diffs each incoming `Service` against the tracked one:
//! new or structurally different services get a fresh entity and a fresh
//! scheduler (the old scheduler, if any, is signalled to stop first);
//! identical services are left alone.
//!
//! Services that disappear from the inventory keep their entity and keep
//! being probed. Nothing here removes them.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use healthgrid_state::{CheckResult, Inventory, Service};
use tokio::sync::{RwLock, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::buffer::{DEFAULT_BUFFER_CAPACITY, ResultBuffer};
use crate::cache::LatestValueCache;
use crate::checker::ServiceChecker;
use crate::scheduler::CheckScheduler;

/// Tunables for the refresh loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Delay between two probes of the same service.
    pub refresh_interval: Duration,
    /// Capacity of each entity's result buffer.
    pub buffer_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// A service under continuous monitoring.
#[derive(Debug)]
pub struct MonitoredEntity {
    service: ArcSwap<Service>,
    cache: LatestValueCache,
    buffer: ResultBuffer,
}

impl MonitoredEntity {
    pub fn new(service: Service, buffer_capacity: usize) -> Self {
        Self {
            service: ArcSwap::from_pointee(service),
            cache: LatestValueCache::new(),
            buffer: ResultBuffer::new(buffer_capacity),
        }
    }

    /// Current service config, including the latest ack text.
    pub fn service(&self) -> Arc<Service> {
        self.service.load_full()
    }

    pub fn name(&self) -> String {
        self.service.load().name.clone()
    }

    pub fn ack(&self) -> String {
        self.service.load().ack.clone()
    }

    /// Replace the ack text in place and restamp the cached result so
    /// readers see it before the next probe.
    pub fn set_ack(&self, ack: &str) {
        self.service.rcu(|current| {
            let mut next = Service::clone(current);
            next.ack = ack.to_string();
            next
        });
        self.cache.update(|latest| CheckResult {
            ack: ack.to_string(),
            ..latest.clone()
        });
    }

    pub fn cache(&self) -> &LatestValueCache {
        &self.cache
    }

    pub fn buffer(&self) -> &ResultBuffer {
        &self.buffer
    }

    /// Make `result` the latest value and queue it for exporters.
    pub fn publish(&self, result: CheckResult) {
        self.cache.publish(result.clone());
        self.buffer.offer(result);
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Services seen for the first time.
    pub started: Vec<String>,
    /// Services whose config changed; their scheduler was restarted.
    pub replaced: Vec<String>,
    pub unchanged: usize,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.started.is_empty() && self.replaced.is_empty()
    }
}

/// Per-entity monitor state.
struct MonitorSlot {
    entity: Arc<MonitoredEntity>,
    /// Handle to the refresh loop.
    handle: JoinHandle<()>,
    /// Shutdown signal for the refresh loop.
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorSlot {
    fn signal_stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Owns every monitored entity and its refresh loop.
///
/// All access to the entity map goes through one `RwLock`: the reconciler
/// writes, the aggregation engine and exporters read.
pub struct ServiceRegistry {
    monitors: RwLock<HashMap<String, MonitorSlot>>,
    checker: ServiceChecker,
    config: EngineConfig,
    started: AtomicU64,
    stopped: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(inventory: Arc<dyn Inventory>, config: EngineConfig) -> Self {
        Self {
            monitors: RwLock::new(HashMap::new()),
            checker: ServiceChecker::new(inventory),
            config,
            started: AtomicU64::new(0),
            stopped: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn checker(&self) -> &ServiceChecker {
        &self.checker
    }

    /// Bring the tracked entities in line with `services`.
    pub async fn reconcile(&self, services: Vec<Service>) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut monitors = self.monitors.write().await;

        for service in services {
            let name = service.name.clone();
            let replacing = match monitors.get(&name) {
                Some(slot) if *slot.entity.service() == service => {
                    report.unchanged += 1;
                    continue;
                }
                Some(_) => true,
                None => false,
            };

            if let Some(old) = monitors.remove(&name) {
                old.signal_stop();
                self.stopped.fetch_add(1, Ordering::Relaxed);
            }
            let slot = self.start_monitor(service);
            monitors.insert(name.clone(), slot);

            if replacing {
                info!(service = %name, "service config changed, monitor restarted");
                report.replaced.push(name);
            } else {
                info!(service = %name, "service monitor started");
                report.started.push(name);
            }
        }

        debug!(
            started = report.started.len(),
            replaced = report.replaced.len(),
            unchanged = report.unchanged,
            tracked = monitors.len(),
            "reconciliation complete"
        );
        report
    }

    fn start_monitor(&self, service: Service) -> MonitorSlot {
        let entity = Arc::new(MonitoredEntity::new(service, self.config.buffer_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = CheckScheduler::new(
            Arc::clone(&entity),
            self.checker.clone(),
            self.config.refresh_interval,
        )
        .spawn(shutdown_rx);
        self.started.fetch_add(1, Ordering::Relaxed);

        MonitorSlot {
            entity,
            handle,
            shutdown_tx,
        }
    }

    pub async fn get(&self, name: &str) -> Option<Arc<MonitoredEntity>> {
        let monitors = self.monitors.read().await;
        monitors.get(name).map(|slot| Arc::clone(&slot.entity))
    }

    pub async fn entities(&self) -> Vec<Arc<MonitoredEntity>> {
        let monitors = self.monitors.read().await;
        monitors.values().map(|slot| Arc::clone(&slot.entity)).collect()
    }

    /// Names of tracked services, sorted.
    pub async fn tracked_services(&self) -> Vec<String> {
        let monitors = self.monitors.read().await;
        let mut names: Vec<String> = monitors.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_monitoring(&self, name: &str) -> bool {
        let monitors = self.monitors.read().await;
        monitors.contains_key(name)
    }

    /// Update a tracked service's ack without restarting its monitor.
    /// Returns `false` if the service isn't tracked.
    pub async fn set_ack(&self, name: &str, ack: &str) -> bool {
        let monitors = self.monitors.read().await;
        match monitors.get(name) {
            Some(slot) => {
                slot.entity.set_ack(ack);
                true
            }
            None => false,
        }
    }

    /// Total refresh loops started since creation.
    pub fn schedulers_started(&self) -> u64 {
        self.started.load(Ordering::Relaxed)
    }

    /// Total refresh loops signalled to stop since creation.
    pub fn schedulers_stopped(&self) -> u64 {
        self.stopped.load(Ordering::Relaxed)
    }

    /// Stop every refresh loop and wait for them to exit.
    pub async fn stop_all(&self) {
        let slots: Vec<(String, MonitorSlot)> = {
            let mut monitors = self.monitors.write().await;
            monitors.drain().collect()
        };
        for (_, slot) in &slots {
            slot.signal_stop();
            self.stopped.fetch_add(1, Ordering::Relaxed);
        }
        for (name, slot) in slots {
            let _ = slot.handle.await;
            debug!(service = %name, "service monitor stopped");
        }
        info!("all service monitors stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeInventory;

    fn registry(fake: &Arc<FakeInventory>) -> ServiceRegistry {
        ServiceRegistry::new(fake.clone(), EngineConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_starts_new_services() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);

        let report = registry
            .reconcile(vec![Service::new("api", 8080), Service::new("web", 8080)])
            .await;

        assert_eq!(report.started, vec!["api", "web"]);
        assert!(report.replaced.is_empty());
        assert_eq!(registry.schedulers_started(), 2);
        assert_eq!(registry.tracked_services().await, vec!["api", "web"]);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_same_config_is_noop() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);
        let services = vec![Service::new("api", 8080)];

        registry.reconcile(services.clone()).await;
        let started_before = registry.schedulers_started();

        let report = registry.reconcile(services).await;
        assert!(report.is_noop());
        assert_eq!(report.unchanged, 1);
        assert_eq!(registry.schedulers_started() - started_before, 0);
        assert_eq!(registry.schedulers_stopped(), 0);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconcile_changed_config_replaces_exactly_one() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);

        registry
            .reconcile(vec![Service::new("api", 8080), Service::new("web", 8080)])
            .await;
        let before = registry.get("api").await.unwrap();

        let mut changed = Service::new("api", 9090);
        changed.resilient = true;
        let report = registry
            .reconcile(vec![changed.clone(), Service::new("web", 8080)])
            .await;

        assert_eq!(report.replaced, vec!["api"]);
        assert_eq!(report.unchanged, 1);
        assert_eq!(registry.schedulers_started(), 3);
        assert_eq!(registry.schedulers_stopped(), 1);

        let after = registry.get("api").await.unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(*after.service(), changed);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn services_missing_from_inventory_stay_tracked() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);

        registry
            .reconcile(vec![Service::new("api", 8080), Service::new("web", 8080)])
            .await;
        let report = registry.reconcile(vec![Service::new("api", 8080)]).await;

        assert!(report.is_noop());
        assert!(registry.is_monitoring("web").await);
        assert_eq!(registry.schedulers_stopped(), 0);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn new_entity_is_probed_without_delay() {
        let fake = Arc::new(FakeInventory::new().with_service(Service::new("api", 8080)));
        let registry = registry(&fake);

        registry.reconcile(fake.all_services()).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let entity = registry.get("api").await.unwrap();
        assert!(entity.cache().read().ok);
        assert_eq!(fake.service_probes(), 1);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn set_ack_updates_entity_without_restart() {
        let fake = Arc::new(FakeInventory::new().with_service(Service::new("api", 8080)));
        let registry = registry(&fake);
        registry.reconcile(fake.all_services()).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(registry.set_ack("api", "maintenance").await);
        assert!(!registry.set_ack("unknown", "maintenance").await);

        let entity = registry.get("api").await.unwrap();
        assert_eq!(entity.ack(), "maintenance");
        assert_eq!(entity.cache().read().ack, "maintenance");

        // Inventory now reports the same ack: config is identical, no restart.
        let mut acked = Service::new("api", 8080);
        acked.ack = "maintenance".to_string();
        let report = registry.reconcile(vec![acked]).await;
        assert!(report.is_noop());
        assert_eq!(registry.schedulers_started(), 1);
        registry.stop_all().await;
    }

    #[test]
    fn set_ack_racing_publish_keeps_newest_result() {
        const PUBLISHES: u64 = 100_000;
        let entity = Arc::new(MonitoredEntity::new(Service::new("api", 8080), 1));
        entity.publish(CheckResult::default());

        let publisher = {
            let entity = Arc::clone(&entity);
            std::thread::spawn(move || {
                for n in 1..=PUBLISHES {
                    entity.cache().publish(CheckResult {
                        last_updated: n,
                        ..CheckResult::default()
                    });
                }
            })
        };
        let acker = {
            let entity = Arc::clone(&entity);
            std::thread::spawn(move || {
                for i in 0..PUBLISHES {
                    entity.set_ack(if i % 2 == 0 { "deploying" } else { "" });
                }
                entity.set_ack("deploying");
            })
        };

        let mut seen = 0;
        while !publisher.is_finished() {
            let now = entity.cache().read().last_updated;
            assert!(now >= seen, "cached result went from {seen} back to {now}");
            seen = now;
        }
        publisher.join().unwrap();
        acker.join().unwrap();

        assert_eq!(entity.cache().read().last_updated, PUBLISHES);
        assert_eq!(entity.ack(), "deploying");
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_scheduler_is_signalled_before_successor_starts() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);
        registry.reconcile(vec![Service::new("api", 8080)]).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(fake.service_probes(), 1);

        registry.reconcile(vec![Service::new("api", 9090)]).await;
        tokio::time::sleep(Duration::from_secs(590)).await;

        // Old loop stopped at once; only the new one keeps probing: 1 + 1 + 9.
        assert_eq!(fake.service_probes(), 11);
        assert_eq!(registry.schedulers_stopped(), 1);
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_all_clears_registry() {
        let fake = Arc::new(FakeInventory::new());
        let registry = registry(&fake);
        registry
            .reconcile(vec![Service::new("api", 8080), Service::new("web", 8080)])
            .await;

        registry.stop_all().await;
        assert!(registry.tracked_services().await.is_empty());
        assert_eq!(registry.schedulers_stopped(), 2);
    }
}
