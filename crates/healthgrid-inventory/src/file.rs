//! File-backed inventory.
//!
//! The catalogue of services, pods, and categories is read from a TOML
//! file and swapped in atomically on `reload()`. Acknowledgements set at
//! runtime live in an overlay that survives reloads but not restarts.
//!
//! ```toml
//! [[services]]
//! name = "content-api"
//! port = 8080
//! resilient = true
//!
//! [[pods]]
//! name = "content-api-0"
//! service = "content-api"
//! address = "10.2.0.14"
//!
//! [[categories]]
//! name = "read"
//! services = ["content-api"]
//! refresh_period = "60s"
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::join_all;
use healthgrid_state::*;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::probe::{GTG_PATH, HEALTH_PATH, HttpProber, individual_severity};

/// On-disk layout of the inventory file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InventoryFile {
    pub services: Vec<Service>,
    pub pods: Vec<Pod>,
    pub categories: Vec<Category>,
}

impl InventoryFile {
    pub fn parse(content: &str) -> InventoryResult<Self> {
        toml::from_str(content).map_err(|e| InventoryError::Invalid(e.to_string()))
    }

    /// Reject duplicate names and pods of unknown services.
    pub fn validate(&self) -> InventoryResult<()> {
        let mut services = HashSet::new();
        for service in &self.services {
            if !services.insert(service.name.as_str()) {
                return Err(InventoryError::Invalid(format!(
                    "duplicate service {:?}",
                    service.name
                )));
            }
        }

        let mut pods = HashSet::new();
        for pod in &self.pods {
            if !pods.insert(pod.name.as_str()) {
                return Err(InventoryError::Invalid(format!("duplicate pod {:?}", pod.name)));
            }
            if !services.contains(pod.service.as_str()) {
                return Err(InventoryError::Invalid(format!(
                    "pod {:?} belongs to unknown service {:?}",
                    pod.name, pod.service
                )));
            }
        }

        let mut categories = HashSet::new();
        for category in &self.categories {
            if !categories.insert(category.name.as_str()) {
                return Err(InventoryError::Invalid(format!(
                    "duplicate category {:?}",
                    category.name
                )));
            }
        }
        Ok(())
    }
}

/// Validated, indexed view of an inventory file.
#[derive(Debug, Default)]
struct Snapshot {
    services: BTreeMap<String, Service>,
    pods: Vec<Pod>,
    categories: HashMap<String, Category>,
}

impl Snapshot {
    fn build(file: InventoryFile) -> InventoryResult<Self> {
        file.validate()?;

        let mut categories: HashMap<String, Category> = file
            .categories
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        categories
            .entry(DEFAULT_CATEGORY.to_string())
            .or_insert_with(|| Category::new(DEFAULT_CATEGORY, Vec::new()));

        Ok(Self {
            services: file
                .services
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect(),
            pods: file.pods,
            categories,
        })
    }
}

/// Inventory read from a TOML file, probing pods over HTTP.
pub struct FileInventory {
    path: Option<PathBuf>,
    snapshot: ArcSwap<Snapshot>,
    /// service name → ack set at runtime; empty string means removed.
    acks: RwLock<HashMap<String, String>>,
    prober: HttpProber,
}

impl FileInventory {
    /// Load and validate the inventory at `path`.
    pub async fn load(path: &Path, prober: HttpProber) -> InventoryResult<Self> {
        let snapshot = read_snapshot(path).await?;
        info!(
            path = ?path,
            services = snapshot.services.len(),
            pods = snapshot.pods.len(),
            "inventory loaded"
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            snapshot: ArcSwap::from_pointee(snapshot),
            acks: RwLock::new(HashMap::new()),
            prober,
        })
    }

    /// Build from an in-memory inventory; `reload()` is then a no-op.
    pub fn from_file(file: InventoryFile, prober: HttpProber) -> InventoryResult<Self> {
        Ok(Self {
            path: None,
            snapshot: ArcSwap::from_pointee(Snapshot::build(file)?),
            acks: RwLock::new(HashMap::new()),
            prober,
        })
    }

    /// Re-read the file. On error the previous snapshot stays in place.
    pub async fn reload(&self) -> InventoryResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let snapshot = read_snapshot(path).await?;
        debug!(path = ?path, services = snapshot.services.len(), "inventory reloaded");
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    async fn with_ack(&self, mut service: Service) -> Service {
        if let Some(ack) = self.acks.read().await.get(&service.name) {
            service.ack = ack.clone();
        }
        service
    }

    fn pods_of(&self, service: &str) -> Vec<Pod> {
        self.snapshot
            .load()
            .pods
            .iter()
            .filter(|p| p.service == service)
            .cloned()
            .collect()
    }

    fn port_of(&self, service: &str) -> InventoryResult<u16> {
        self.snapshot
            .load()
            .services
            .get(service)
            .map(|s| s.port)
            .ok_or_else(|| InventoryError::NotFound(service.to_string()))
    }
}

async fn read_snapshot(path: &Path) -> InventoryResult<Snapshot> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| InventoryError::Unavailable(format!("{}: {e}", path.display())))?;
    Snapshot::build(InventoryFile::parse(&content)?)
}

#[async_trait]
impl Inventory for FileInventory {
    async fn list_categories(&self) -> InventoryResult<HashMap<String, Category>> {
        Ok(self.snapshot.load().categories.clone())
    }

    async fn list_services_by_name(&self, names: &[String]) -> Vec<Service> {
        let snapshot = self.snapshot.load_full();
        let selected: Vec<Service> = if names.is_empty() {
            snapshot.services.values().cloned().collect()
        } else {
            names
                .iter()
                .filter_map(|n| snapshot.services.get(n).cloned())
                .collect()
        };

        let mut services = Vec::with_capacity(selected.len());
        for service in selected {
            services.push(self.with_ack(service).await);
        }
        services
    }

    async fn list_pods_for_service(&self, service: &str) -> InventoryResult<Vec<Pod>> {
        if !self.snapshot.load().services.contains_key(service) {
            return Err(InventoryError::NotFound(service.to_string()));
        }
        Ok(self.pods_of(service))
    }

    async fn get_pod_by_name(&self, name: &str) -> InventoryResult<Pod> {
        self.snapshot
            .load()
            .pods
            .iter()
            .find(|p| p.name == name)
            .cloned()
            .ok_or_else(|| InventoryError::NotFound(name.to_string()))
    }

    async fn probe_service_health(&self, service: &str) -> ProbeResult<()> {
        let port = self.port_of(service)?;
        let pods = self.pods_of(service);
        if pods.is_empty() {
            return Err(ProbeError::Unhealthy(format!("no pods found for service {service}")));
        }

        let outcomes = join_all(pods.iter().map(|pod| self.probe_pod_health(pod, port))).await;
        let unavailable = outcomes.iter().filter(|o| o.is_err()).count();
        if unavailable > 0 {
            return Err(ProbeError::Unhealthy(format!(
                "{unavailable} of {} pods unavailable",
                pods.len()
            )));
        }
        Ok(())
    }

    async fn probe_pod_health(&self, pod: &Pod, port: u16) -> ProbeResult<()> {
        self.prober.probe_ok(&pod.address, port, GTG_PATH).await
    }

    async fn probe_individual_severity(&self, pod: &Pod, port: u16) -> ProbeResult<(Severity, bool)> {
        let (_, body) = self.prober.get(&pod.address, port, HEALTH_PATH).await?;
        individual_severity(&body)
    }

    async fn fetch_raw_health_payload(&self, pod: &Pod, port: u16) -> ProbeResult<Bytes> {
        let (_, body) = self.prober.get(&pod.address, port, HEALTH_PATH).await?;
        Ok(body)
    }

    async fn add_ack(&self, service: &str, message: &str) -> InventoryResult<()> {
        if !self.snapshot.load().services.contains_key(service) {
            return Err(InventoryError::NotFound(service.to_string()));
        }
        self.acks
            .write()
            .await
            .insert(service.to_string(), message.to_string());
        Ok(())
    }

    async fn remove_ack(&self, service: &str) -> InventoryResult<()> {
        self.add_ack(service, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tests::start_mock_pod;
    use std::io::Write;
    use std::time::Duration;

    const INVENTORY: &str = r#"
[[services]]
name = "content-api"
port = 8080
resilient = true

[[services]]
name = "search"
port = 9090
ack = "reindexing"

[[pods]]
name = "content-api-0"
service = "content-api"
address = "10.0.0.1"

[[pods]]
name = "content-api-1"
service = "content-api"
address = "10.0.0.2"

[[categories]]
name = "read"
services = ["content-api", "search"]
refresh_period = "30s"
sticky = true
"#;

    fn prober() -> HttpProber {
        HttpProber::new(Duration::from_secs(2))
    }

    fn inventory() -> FileInventory {
        FileInventory::from_file(InventoryFile::parse(INVENTORY).unwrap(), prober()).unwrap()
    }

    #[tokio::test]
    async fn parses_services_pods_and_categories() {
        let inv = inventory();
        let categories = inv.list_categories().await.unwrap();
        let read = &categories["read"];
        assert_eq!(read.services, vec!["content-api", "search"]);
        assert_eq!(read.refresh_period, Duration::from_secs(30));
        assert!(read.sticky);

        let services = inv.list_services_by_name(&["search".to_string()]).await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].ack, "reindexing");

        assert_eq!(inv.list_pods_for_service("content-api").await.unwrap().len(), 2);
        assert_eq!(inv.get_pod_by_name("content-api-1").await.unwrap().address, "10.0.0.2");
    }

    #[tokio::test]
    async fn default_category_is_synthesized() {
        let inv = inventory();
        let categories = inv.list_categories().await.unwrap();
        assert!(categories[DEFAULT_CATEGORY].is_default());
        assert_eq!(inv.list_services_by_name(&[]).await.len(), 2);
    }

    #[tokio::test]
    async fn unknown_names_are_omitted() {
        let inv = inventory();
        let services = inv
            .list_services_by_name(&["ghost".to_string(), "search".to_string()])
            .await;
        assert_eq!(services.len(), 1);
        assert!(matches!(
            inv.list_pods_for_service("ghost").await,
            Err(InventoryError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_pods_of_unknown_services() {
        let file = InventoryFile::parse(
            r#"
[[pods]]
name = "orphan-0"
service = "orphan"
address = "10.0.0.9"
"#,
        )
        .unwrap();
        assert!(matches!(file.validate(), Err(InventoryError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_services() {
        let file = InventoryFile::parse(
            r#"
[[services]]
name = "a"
port = 1

[[services]]
name = "a"
port = 2
"#,
        )
        .unwrap();
        assert!(file.validate().is_err());
    }

    #[tokio::test]
    async fn ack_overlay_overrides_file() {
        let inv = inventory();
        inv.add_ack("content-api", "deploying").await.unwrap();
        inv.remove_ack("search").await.unwrap();

        let services = inv.list_services_by_name(&[]).await;
        let by_name: HashMap<_, _> = services.iter().map(|s| (s.name.as_str(), s)).collect();
        assert_eq!(by_name["content-api"].ack, "deploying");
        assert_eq!(by_name["search"].ack, "");

        assert!(matches!(
            inv.add_ack("ghost", "x").await,
            Err(InventoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn reload_picks_up_changes_and_keeps_acks() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(INVENTORY.as_bytes()).unwrap();
        let inv = FileInventory::load(tmp.path(), prober()).await.unwrap();
        inv.add_ack("content-api", "deploying").await.unwrap();

        let mut updated = INVENTORY.replace("port = 8080", "port = 8081");
        updated.push_str("\n[[services]]\nname = \"ingest\"\nport = 7070\n");
        std::fs::write(tmp.path(), updated).unwrap();
        inv.reload().await.unwrap();

        let services = inv.list_services_by_name(&[]).await;
        assert_eq!(services.len(), 3);
        let api = services.iter().find(|s| s.name == "content-api").unwrap();
        assert_eq!(api.port, 8081);
        assert_eq!(api.ack, "deploying");
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(INVENTORY.as_bytes()).unwrap();
        let inv = FileInventory::load(tmp.path(), prober()).await.unwrap();

        std::fs::write(tmp.path(), "not = [valid").unwrap();
        assert!(inv.reload().await.is_err());
        assert_eq!(inv.list_services_by_name(&[]).await.len(), 2);
    }

    fn live_inventory(port: u16) -> FileInventory {
        let file = InventoryFile {
            services: vec![Service::new("api", port)],
            pods: vec![Pod {
                name: "api-0".to_string(),
                service: "api".to_string(),
                address: "127.0.0.1".to_string(),
            }],
            categories: Vec::new(),
        };
        FileInventory::from_file(file, prober()).unwrap()
    }

    #[tokio::test]
    async fn service_probe_against_live_pods() {
        let addr = start_mock_pod("200 OK", "OK").await;
        let inv = live_inventory(addr.port());
        inv.probe_service_health("api").await.unwrap();
    }

    #[tokio::test]
    async fn service_probe_reports_unavailable_pods() {
        let addr = start_mock_pod("503 Service Unavailable", "").await;
        let inv = live_inventory(addr.port());
        let err = inv.probe_service_health("api").await.unwrap_err();
        assert_eq!(err, ProbeError::Unhealthy("1 of 1 pods unavailable".to_string()));
    }

    #[tokio::test]
    async fn service_without_pods_is_unhealthy() {
        let file = InventoryFile {
            services: vec![Service::new("lonely", 8080)],
            ..InventoryFile::default()
        };
        let inv = FileInventory::from_file(file, prober()).unwrap();
        assert!(matches!(
            inv.probe_service_health("lonely").await,
            Err(ProbeError::Unhealthy(_))
        ));
    }

    #[tokio::test]
    async fn individual_severity_over_http() {
        let addr = start_mock_pod(
            "200 OK",
            r#"{"checks":[{"ok":false,"severity":1},{"ok":true,"severity":2}]}"#,
        )
        .await;
        let inv = live_inventory(addr.port());
        let pod = inv.get_pod_by_name("api-0").await.unwrap();

        let (severity, failing) = inv.probe_individual_severity(&pod, addr.port()).await.unwrap();
        assert_eq!(severity, Severity::CRITICAL);
        assert!(failing);

        let raw = inv.fetch_raw_health_payload(&pod, addr.port()).await.unwrap();
        assert!(raw.starts_with(b"{\"checks\""));
    }
}
