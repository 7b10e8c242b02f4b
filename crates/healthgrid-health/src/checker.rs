//! Live checks: one probe turned into one `CheckResult`.
//!
//! A probe error is never propagated. It becomes a failing result whose
//! severity is resolved from the replicas.

use std::sync::Arc;

use healthgrid_state::{CheckResult, Inventory, Pod, Service, Severity};
use tracing::debug;

use crate::severity::SeverityResolver;

/// Runs service and pod probes through the inventory.
#[derive(Clone)]
pub struct ServiceChecker {
    inventory: Arc<dyn Inventory>,
    severity: SeverityResolver,
}

impl ServiceChecker {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        let severity = SeverityResolver::new(Arc::clone(&inventory));
        Self { inventory, severity }
    }

    pub fn severity(&self) -> &SeverityResolver {
        &self.severity
    }

    /// Probe a service. Failures carry the replica-derived severity;
    /// the result carries the service's ack text.
    pub async fn check_service(&self, service: &Service) -> CheckResult {
        let result = match self.inventory.probe_service_health(&service.name).await {
            Ok(()) => CheckResult::healthy(&service.name),
            Err(e) => {
                let severity = self.severity.severity_for_service(service).await;
                debug!(service = %service.name, error = %e, %severity, "service check failed");
                CheckResult::failed(&service.name, severity, e.to_string())
            }
        };
        result.with_ack(service.ack.clone())
    }

    /// Probe a pod. Failures carry the floor severity until the caller
    /// resolves the pod's own.
    pub async fn check_pod(&self, pod: &Pod, port: u16) -> CheckResult {
        match self.inventory.probe_pod_health(pod, port).await {
            Ok(()) => CheckResult::healthy(&pod.name),
            Err(e) => {
                debug!(pod = %pod.name, error = %e, "pod check failed");
                CheckResult::failed(&pod.name, Severity::FLOOR, e.to_string())
            }
        }
    }
}
