//! Aggregation: from requested categories to one sorted cluster status.
//!
//! # Request flow
//!
//! ```text
//! requested categories
//!   → ∩ inventory categories (exact name)   (empty: "no valid categories")
//!   → deduplicated service names ("default" → inventory default scope)
//!   → services
//!   → per service: cached result, or live check on cache miss / no-cache
//!   → get_final_result() → AggregateResult sorted by name
//! ```
//!
//! Acknowledged failures stay visible in the checks but never flip the
//! aggregate to unhealthy.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::future::join_all;
use healthgrid_state::{
    AggregateResult, Category, CheckResult, DEFAULT_CATEGORY, Inventory, InventoryError, Service,
    Severity,
};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::registry::ServiceRegistry;

/// Aggregate for a services request plus the categories it matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicesHealth {
    pub result: AggregateResult,
    /// Requested categories that exist, keyed by name. Empty means none of
    /// the requested categories are valid.
    pub matched: BTreeMap<String, Category>,
}

impl ServicesHealth {
    pub fn has_valid_categories(&self) -> bool {
        !self.matched.is_empty()
    }
}

/// Entry point for the presentation layer.
pub struct AggregationEngine {
    inventory: Arc<dyn Inventory>,
    registry: Arc<ServiceRegistry>,
}

impl AggregationEngine {
    pub fn new(inventory: Arc<dyn Inventory>, registry: Arc<ServiceRegistry>) -> Self {
        Self {
            inventory,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Health of every service in the requested categories.
    pub async fn build_services_health_result(
        &self,
        requested: &[String],
        use_cache: bool,
    ) -> EngineResult<ServicesHealth> {
        let available = self.inventory.list_categories().await?;
        let matched: BTreeMap<String, Category> = requested
            .iter()
            .filter_map(|name| available.get(name).map(|c| (name.clone(), c.clone())))
            .collect();

        let description = describe_services(&matched, use_cache);
        if matched.is_empty() {
            debug!(?requested, "no valid categories requested");
            return Ok(ServicesHealth {
                result: get_final_result("services health", description, Vec::new()),
                matched,
            });
        }

        let names = resolve_service_names(&matched);
        let services = self.inventory.list_services_by_name(&names).await;

        let checks = if use_cache {
            join_all(services.iter().map(|s| self.cached_or_live(s))).await
        } else {
            let checker = self.registry.checker();
            join_all(services.iter().map(|s| checker.check_service(s))).await
        };

        Ok(ServicesHealth {
            result: get_final_result("services health", description, checks),
            matched,
        })
    }

    async fn cached_or_live(&self, service: &Service) -> CheckResult {
        match self.registry.get(&service.name).await {
            Some(entity) => entity.cache().read(),
            None => {
                debug!(service = %service.name, "service not tracked yet, checking live");
                self.registry.checker().check_service(service).await
            }
        }
    }

    /// Health of each pod of one service. Always live: pods have no cache.
    pub async fn build_pods_health_result(
        &self,
        service_name: &str,
        _use_cache: bool,
    ) -> EngineResult<AggregateResult> {
        let service = self
            .inventory
            .list_services_by_name(&[service_name.to_string()])
            .await
            .into_iter()
            .find(|s| s.name == service_name)
            .ok_or_else(|| EngineError::ServiceNotFound(service_name.to_string()))?;

        let pods = self.inventory.list_pods_for_service(service_name).await?;
        let checker = self.registry.checker();
        let mut checks =
            join_all(pods.iter().map(|pod| checker.check_pod(pod, service.port))).await;

        for check in checks.iter_mut().filter(|c| !c.ok) {
            check.severity = checker
                .severity()
                .severity_for_pod(&check.name, service.port)
                .await;
        }

        let description = format!("Health of pods under service {service_name}, served live.");
        Ok(get_final_result(
            &format!("{service_name} pods health"),
            description,
            checks,
        ))
    }

    /// The pod's own health payload, untouched.
    pub async fn get_individual_pod_health(&self, pod_name: &str) -> EngineResult<Bytes> {
        let pod = self
            .inventory
            .get_pod_by_name(pod_name)
            .await
            .map_err(|e| match e {
                InventoryError::NotFound(_) => EngineError::PodNotFound(pod_name.to_string()),
                other => EngineError::Discovery(other),
            })?;

        let port = self
            .inventory
            .list_services_by_name(std::slice::from_ref(&pod.service))
            .await
            .into_iter()
            .find(|s| s.name == pod.service)
            .map(|s| s.port)
            .ok_or_else(|| EngineError::ServiceNotFound(pod.service.clone()))?;

        Ok(self.inventory.fetch_raw_health_payload(&pod, port).await?)
    }

    /// Binary readiness of the requested categories. Requesting none means
    /// the default category; no valid categories means not ready.
    pub async fn gtg(&self, requested: &[String], use_cache: bool) -> EngineResult<bool> {
        let default = [DEFAULT_CATEGORY.to_string()];
        let requested = if requested.is_empty() { &default[..] } else { requested };
        let health = self
            .build_services_health_result(requested, use_cache)
            .await?;
        Ok(health.has_valid_categories() && health.result.ok)
    }

    /// Acknowledge a service's failure. Persists through the inventory, then
    /// updates the tracked entity in place.
    pub async fn add_ack(&self, service: &str, message: &str) -> EngineResult<()> {
        if message.trim().is_empty() {
            return Err(EngineError::EmptyAck);
        }
        self.inventory
            .add_ack(service, message)
            .await
            .map_err(|e| not_found_as_service(e, service))?;
        self.registry.set_ack(service, message).await;
        info!(%service, "acknowledgement added");
        Ok(())
    }

    pub async fn remove_ack(&self, service: &str) -> EngineResult<()> {
        self.inventory
            .remove_ack(service)
            .await
            .map_err(|e| not_found_as_service(e, service))?;
        self.registry.set_ack(service, "").await;
        info!(%service, "acknowledgement removed");
        Ok(())
    }
}

fn not_found_as_service(e: InventoryError, service: &str) -> EngineError {
    match e {
        InventoryError::NotFound(_) => EngineError::ServiceNotFound(service.to_string()),
        other => EngineError::Discovery(other),
    }
}

/// Deduplicated member names of the matched categories. A matched default
/// category selects the inventory's default scope, signalled by an empty list.
fn resolve_service_names(matched: &BTreeMap<String, Category>) -> Vec<String> {
    if matched.values().any(Category::is_default) {
        return Vec::new();
    }
    matched
        .values()
        .flat_map(|c| c.services.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn describe_services(matched: &BTreeMap<String, Category>, use_cache: bool) -> String {
    let names: Vec<&str> = matched.keys().map(String::as_str).collect();
    let source = if use_cache { "from cache" } else { "live" };
    format!(
        "Health of services in categories [{}], served {source}.",
        names.join(", ")
    )
}

/// Fold checks into an aggregate.
///
/// Healthy iff every check is ok or acknowledged. The severity is the most
/// severe among failing, unacknowledged checks (floor when there are none).
/// Checks are sorted by name.
pub fn get_final_result(
    name: &str,
    description: impl Into<String>,
    mut checks: Vec<CheckResult>,
) -> AggregateResult {
    let ok = checks.iter().all(|c| !c.counts_as_failure());
    let severity = checks
        .iter()
        .filter(|c| c.counts_as_failure())
        .map(|c| c.severity)
        .min()
        .unwrap_or(Severity::FLOOR);

    checks.sort_by(|a, b| a.name.cmp(&b.name));

    AggregateResult {
        schema_version: AggregateResult::SCHEMA_VERSION,
        name: name.to_string(),
        description: description.into(),
        ok,
        severity,
        checks,
    }
}
