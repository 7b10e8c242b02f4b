//! The discovery and probe contract consumed by the health engine.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::{InventoryResult, ProbeResult};
use crate::types::{Category, Pod, Service, Severity};

/// Source of services, pods, and categories, and the probes run against them.
///
/// Retry and backoff, if any, belong to the implementation; the engine calls
/// each probe exactly once per check.
#[async_trait]
pub trait Inventory: Send + Sync {
    /// All configured categories keyed by name.
    async fn list_categories(&self) -> InventoryResult<HashMap<String, Category>>;

    /// Services with the given names. Unknown names are silently omitted.
    /// An empty slice selects the default scope: every service with a
    /// health check.
    async fn list_services_by_name(&self, names: &[String]) -> Vec<Service>;

    async fn list_pods_for_service(&self, service: &str) -> InventoryResult<Vec<Pod>>;

    async fn get_pod_by_name(&self, name: &str) -> InventoryResult<Pod>;

    /// `Ok(())` means the service is healthy.
    async fn probe_service_health(&self, service: &str) -> ProbeResult<()>;

    /// `Ok(())` means the pod is healthy.
    async fn probe_pod_health(&self, pod: &Pod, port: u16) -> ProbeResult<()>;

    /// The pod's own view of its worst failing check: `(severity, has_failure)`.
    async fn probe_individual_severity(&self, pod: &Pod, port: u16) -> ProbeResult<(Severity, bool)>;

    /// The pod's health payload, untouched.
    async fn fetch_raw_health_payload(&self, pod: &Pod, port: u16) -> ProbeResult<Bytes>;

    async fn add_ack(&self, service: &str, message: &str) -> InventoryResult<()>;

    async fn remove_ack(&self, service: &str) -> InventoryResult<()>;
}
