//! In-memory `Inventory` for tests.
//!
//! Probe outcomes are scripted per service and per pod. Pods with no
//! scripted severity make `probe_individual_severity` fail, which exercises
//! the skip-on-error paths.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use healthgrid_state::*;
use tokio::sync::Notify;

#[derive(Default)]
pub struct FakeInventory {
    categories: Mutex<HashMap<String, Category>>,
    services: Mutex<BTreeMap<String, Service>>,
    pods: Mutex<Vec<Pod>>,
    /// service name → failure message
    unhealthy_services: Mutex<HashMap<String, String>>,
    /// pod name → failure message
    unhealthy_pods: Mutex<HashMap<String, String>>,
    pod_severities: Mutex<HashMap<String, (Severity, bool)>>,
    payloads: Mutex<HashMap<String, Bytes>>,
    discovery_down: Mutex<Option<String>>,
    /// When set, every service health check waits for a permit before answering.
    check_gate: Mutex<Option<Arc<Notify>>>,
    service_probes: AtomicUsize,
    severity_probes: AtomicUsize,
}

impl FakeInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(self, name: &str, services: &[&str]) -> Self {
        let category = Category::new(name, services.iter().map(|s| s.to_string()).collect());
        self.categories
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(name.to_string(), category);
        self
    }

    pub fn with_service(self, service: Service) -> Self {
        self.upsert_service(service);
        self
    }

    pub fn with_pod(self, name: &str, service: &str) -> Self {
        self.pods.lock().expect("fake inventory lock poisoned").push(Pod {
            name: name.to_string(),
            service: service.to_string(),
            address: "127.0.0.1".to_string(),
        });
        self
    }

    pub fn with_pod_severity(self, pod: &str, severity: Severity, has_failure: bool) -> Self {
        self.pod_severities
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(pod.to_string(), (severity, has_failure));
        self
    }

    pub fn with_unhealthy_service(self, service: &str, message: &str) -> Self {
        self.set_service_unhealthy(service, message);
        self
    }

    pub fn with_unhealthy_pod(self, pod: &str, message: &str) -> Self {
        self.unhealthy_pods
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(pod.to_string(), message.to_string());
        self
    }

    pub fn with_payload(self, pod: &str, payload: &'static str) -> Self {
        self.payloads
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(pod.to_string(), Bytes::from_static(payload.as_bytes()));
        self
    }

    pub fn upsert_service(&self, service: Service) {
        self.services
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(service.name.clone(), service);
    }

    pub fn set_service_unhealthy(&self, service: &str, message: &str) {
        self.unhealthy_services
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(service.to_string(), message.to_string());
    }

    pub fn set_service_healthy(&self, service: &str) {
        self.unhealthy_services
            .lock()
            .expect("fake inventory lock poisoned")
            .remove(service);
    }

    pub fn set_pod_unhealthy(&self, pod: &str, message: &str) {
        self.unhealthy_pods
            .lock()
            .expect("fake inventory lock poisoned")
            .insert(pod.to_string(), message.to_string());
    }

    /// Hold every subsequent service health check until the returned `Notify`
    /// hands out a permit.
    pub fn gate_service_checks(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.check_gate.lock().expect("fake inventory lock poisoned") = Some(Arc::clone(&gate));
        gate
    }

    /// Make every discovery call fail with the given reason.
    pub fn fail_discovery(&self, reason: &str) {
        *self.discovery_down.lock().expect("fake inventory lock poisoned") = Some(reason.to_string());
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.services
            .lock()
            .expect("fake inventory lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn all_services(&self) -> Vec<Service> {
        self.services
            .lock()
            .expect("fake inventory lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn pods_of(&self, service: &str) -> Vec<Pod> {
        self.pods
            .lock()
            .expect("fake inventory lock poisoned")
            .iter()
            .filter(|p| p.service == service)
            .cloned()
            .collect()
    }

    /// Number of `probe_service_health` calls so far.
    pub fn service_probes(&self) -> usize {
        self.service_probes.load(Ordering::SeqCst)
    }

    /// Number of `probe_individual_severity` calls so far.
    pub fn severity_probes(&self) -> usize {
        self.severity_probes.load(Ordering::SeqCst)
    }

    fn check_discovery(&self) -> InventoryResult<()> {
        match self.discovery_down.lock().expect("fake inventory lock poisoned").as_ref() {
            Some(reason) => Err(InventoryError::Unavailable(reason.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Inventory for FakeInventory {
    async fn list_categories(&self) -> InventoryResult<HashMap<String, Category>> {
        self.check_discovery()?;
        Ok(self.categories.lock().expect("fake inventory lock poisoned").clone())
    }

    async fn list_services_by_name(&self, names: &[String]) -> Vec<Service> {
        let services = self.services.lock().expect("fake inventory lock poisoned");
        if names.is_empty() {
            return services.values().cloned().collect();
        }
        names.iter().filter_map(|n| services.get(n).cloned()).collect()
    }

    async fn list_pods_for_service(&self, service: &str) -> InventoryResult<Vec<Pod>> {
        self.check_discovery()?;
        Ok(self.pods_of(service))
    }

    async fn get_pod_by_name(&self, name: &str) -> InventoryResult<Pod> {
        self.check_discovery()?;
        self.pods
            .lock()
            .expect("fake inventory lock poisoned")
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    async fn probe_service_health(&self, service: &str) -> ProbeResult<()> {
        self.service_probes.fetch_add(1, Ordering::SeqCst);
        let gate = self.check_gate.lock().expect("fake inventory lock poisoned").clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self
            .unhealthy_services
            .lock()
            .expect("fake inventory lock poisoned")
            .get(service)
        {
            Some(message) => Err(ProbeError::Unhealthy(message.clone())),
            None => Ok(()),
        }
    }

    async fn probe_pod_health(&self, pod: &Pod, _port: u16) -> ProbeResult<()> {
        match self
            .unhealthy_pods
            .lock()
            .expect("fake inventory lock poisoned")
            .get(&pod.name)
        {
            Some(message) => Err(ProbeError::Unhealthy(message.clone())),
            None => Ok(()),
        }
    }

    async fn probe_individual_severity(&self, pod: &Pod, _port: u16) -> ProbeResult<(Severity, bool)> {
        self.severity_probes.fetch_add(1, Ordering::SeqCst);
        self.pod_severities
            .lock()
            .expect("fake inventory lock poisoned")
            .get(&pod.name)
            .copied()
            .ok_or_else(|| ProbeError::Timeout(pod.name.clone()))
    }

    async fn fetch_raw_health_payload(&self, pod: &Pod, _port: u16) -> ProbeResult<Bytes> {
        self.payloads
            .lock()
            .expect("fake inventory lock poisoned")
            .get(&pod.name)
            .cloned()
            .ok_or_else(|| ProbeError::Status {
                target: pod.name.clone(),
                status: 404,
            })
    }

    async fn add_ack(&self, service: &str, message: &str) -> InventoryResult<()> {
        let mut services = self.services.lock().expect("fake inventory lock poisoned");
        let entry = services
            .get_mut(service)
            .ok_or_else(|| InventoryError::NotFound(service.to_string()))?;
        entry.ack = message.to_string();
        Ok(())
    }

    async fn remove_ack(&self, service: &str) -> InventoryResult<()> {
        self.add_ack(service, "").await
    }
}
