//! Severity resolution from per-replica probe outcomes.
//!
//! Every pod reports its own worst failing severity. For ordinary services
//! the most severe failing pod wins. Resilient services are healthy as long
//! as one replica reports no failure, so the scan stops at the first healthy
//! pod and returns the floor.
//!
//! Pods whose severity probe errors are skipped; one unreachable replica
//! never aborts the computation.

use std::sync::Arc;

use healthgrid_state::{Inventory, Pod, Service, Severity};
use tracing::{debug, warn};

/// Computes service and pod severities through the inventory's probes.
#[derive(Clone)]
pub struct SeverityResolver {
    inventory: Arc<dyn Inventory>,
}

impl SeverityResolver {
    pub fn new(inventory: Arc<dyn Inventory>) -> Self {
        Self { inventory }
    }

    /// Most severe value among pods that report a failure, or the floor.
    pub async fn compute_severity_by_pods(&self, pods: &[Pod], port: u16) -> Severity {
        let mut worst = Severity::FLOOR;
        for pod in pods {
            match self.inventory.probe_individual_severity(pod, port).await {
                Ok((severity, true)) => worst = worst.min(severity),
                Ok((_, false)) => {}
                Err(e) => {
                    debug!(pod = %pod.name, error = %e, "severity probe failed, skipping pod");
                }
            }
        }
        worst
    }

    /// Severity of a whole service, honouring the resilient short-circuit.
    pub async fn severity_for_service(&self, service: &Service) -> Severity {
        let pods = match self.inventory.list_pods_for_service(&service.name).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(service = %service.name, error = %e, "cannot list pods for severity");
                return Severity::FLOOR;
            }
        };

        if !service.resilient {
            return self.compute_severity_by_pods(&pods, service.port).await;
        }

        let mut worst = Severity::FLOOR;
        for pod in &pods {
            match self.inventory.probe_individual_severity(pod, service.port).await {
                Ok((_, false)) => {
                    debug!(
                        service = %service.name,
                        pod = %pod.name,
                        "healthy replica masks failures of resilient service"
                    );
                    return Severity::FLOOR;
                }
                Ok((severity, true)) => worst = worst.min(severity),
                Err(e) => {
                    debug!(pod = %pod.name, error = %e, "severity probe failed, skipping pod");
                }
            }
        }
        worst
    }

    /// Severity of a single pod, looked up by name.
    pub async fn severity_for_pod(&self, name: &str, port: u16) -> Severity {
        match self.inventory.get_pod_by_name(name).await {
            Ok(pod) => self.compute_severity_by_pods(std::slice::from_ref(&pod), port).await,
            Err(e) => {
                warn!(pod = %name, error = %e, "cannot resolve pod for severity");
                Severity::FLOOR
            }
        }
    }
}
