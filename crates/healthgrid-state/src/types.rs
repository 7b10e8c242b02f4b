//! Domain types for health aggregation.
//!
//! Services, pods, and categories are sourced from the inventory on each
//! call. `CheckResult` is the immutable value produced by one probe;
//! `AggregateResult` is what the engine hands to the presentation layer.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Reserved category name that selects the inventory's default scope
/// (every service with a health check).
pub const DEFAULT_CATEGORY: &str = "default";

/// Refresh period used when a category does not declare one.
pub const DEFAULT_REFRESH_PERIOD: Duration = Duration::from_secs(60);

// ── Severity ──────────────────────────────────────────────────────

/// Failure intensity. Lower is more severe; `FLOOR` means "no failure observed".
///
/// The scale is closed: values are clamped into `CRITICAL..=FLOOR`, so the
/// "unknown" and "healthy" states both carry the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    /// Most severe value.
    pub const CRITICAL: Severity = Severity(1);
    /// Least severe value; also the severity of healthy and unknown results.
    pub const FLOOR: Severity = Severity(2);

    /// Clamp a raw value onto the scale. `0` is read as critical.
    pub fn new(value: u8) -> Self {
        Severity(value.clamp(Self::CRITICAL.0, Self::FLOOR.0))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn is_floor(self) -> bool {
        self == Self::FLOOR
    }
}

impl Default for Severity {
    fn default() -> Self {
        Self::FLOOR
    }
}

impl From<u8> for Severity {
    fn from(value: u8) -> Self {
        Severity::new(value)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Inventory entities ────────────────────────────────────────────

/// A monitored service.
///
/// Structural equality drives reconciliation: any field change, including
/// the ack text, yields a new monitored entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Operator acknowledgement; empty means none.
    #[serde(default)]
    pub ack: String,
    /// Port the service's pods serve their health endpoints on.
    pub port: u16,
    /// Healthy as long as one replica is fully healthy.
    #[serde(default)]
    pub resilient: bool,
    /// Runs one replica per node. Carried for consumers; has no runtime
    /// effect in the engine.
    #[serde(default)]
    pub daemon: bool,
}

impl Service {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            ack: String::new(),
            port,
            resilient: false,
            daemon: false,
        }
    }

    pub fn is_acked(&self) -> bool {
        !self.ack.is_empty()
    }
}

/// A replica of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub name: String,
    /// Name of the owning service.
    pub service: String,
    /// Network address (host or IP) without port.
    pub address: String,
}

/// A named grouping of services used to scope an aggregation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    /// Member service names, in declaration order.
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default = "default_refresh_period", with = "crate::duration::text")]
    pub refresh_period: Duration,
    /// Carried for consumers; has no runtime effect in the engine.
    #[serde(default)]
    pub sticky: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Category {
    pub fn new(name: impl Into<String>, services: Vec<String>) -> Self {
        Self {
            name: name.into(),
            services,
            refresh_period: DEFAULT_REFRESH_PERIOD,
            sticky: false,
            enabled: true,
        }
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_CATEGORY
    }
}

fn default_refresh_period() -> Duration {
    DEFAULT_REFRESH_PERIOD
}

fn default_enabled() -> bool {
    true
}

// ── Results ───────────────────────────────────────────────────────

/// Outcome of a single probe of a service or pod.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub severity: Severity,
    /// Acknowledgement text copied from the service; empty means none.
    pub ack: String,
    /// Probe error message, empty when ok.
    pub output: String,
    /// Unix timestamp (seconds) of the probe; zero for the unknown sentinel.
    pub last_updated: u64,
}

impl CheckResult {
    /// The value read from a cache nothing has been published to yet:
    /// not ok, floor severity, empty strings, zero timestamp.
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            severity: Severity::FLOOR,
            ack: String::new(),
            output: String::new(),
            last_updated: epoch_secs(),
        }
    }

    pub fn failed(name: impl Into<String>, severity: Severity, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            severity,
            ack: String::new(),
            output: output.into(),
            last_updated: epoch_secs(),
        }
    }

    pub fn with_ack(mut self, ack: impl Into<String>) -> Self {
        self.ack = ack.into();
        self
    }

    pub fn is_acked(&self) -> bool {
        !self.ack.is_empty()
    }

    /// Failing and not suppressed by an acknowledgement.
    pub fn counts_as_failure(&self) -> bool {
        !self.ok && self.ack.is_empty()
    }
}

/// Cluster-wide status for a set of checks, ready for presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub schema_version: u32,
    pub name: String,
    pub description: String,
    pub ok: bool,
    pub severity: Severity,
    /// Sorted by name ascending.
    pub checks: Vec<CheckResult>,
}

impl AggregateResult {
    pub const SCHEMA_VERSION: u32 = 1;
}

pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
