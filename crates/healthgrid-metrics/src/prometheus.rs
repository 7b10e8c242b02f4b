//! Prometheus text exposition format.
//!
//! Renders service snapshots and engine counters into the Prometheus text
//! exposition format for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use crate::feeder::{ResultFeeder, ServiceSnapshot};
use crate::pilot::PilotLight;

/// Everything `/metrics` exposes, gathered at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsReport {
    pub services: Vec<ServiceSnapshot>,
    pub tracked_services: usize,
    pub schedulers_started: u64,
    pub schedulers_stopped: u64,
    pub heartbeats: u64,
    pub last_heartbeat: u64,
}

impl MetricsReport {
    pub async fn gather(feeder: &ResultFeeder, pilot: &PilotLight) -> Self {
        let registry = feeder.registry();
        Self {
            services: feeder.snapshot().await,
            tracked_services: registry.tracked_services().await.len(),
            schedulers_started: registry.schedulers_started(),
            schedulers_stopped: registry.schedulers_stopped(),
            heartbeats: pilot.heartbeats(),
            last_heartbeat: pilot.last_beat(),
        }
    }
}

/// Render a metrics report into Prometheus text format.
///
/// Per-service series carry a `service` label.
pub fn render_prometheus(report: &MetricsReport) -> String {
    let mut out = String::new();

    header(&mut out, "healthgrid_checks_total", "Check results recorded.", "counter");
    for s in &report.services {
        series(&mut out, "healthgrid_checks_total", &s.service, s.checks_total);
    }

    header(&mut out, "healthgrid_check_failures_total", "Failing check results recorded.", "counter");
    for s in &report.services {
        series(&mut out, "healthgrid_check_failures_total", &s.service, s.failures_total);
    }

    header(&mut out, "healthgrid_service_ok", "1 if the last check passed.", "gauge");
    for s in &report.services {
        series(&mut out, "healthgrid_service_ok", &s.service, s.last_ok as u64);
    }

    header(&mut out, "healthgrid_service_acknowledged", "1 if the last check carried an acknowledgement.", "gauge");
    for s in &report.services {
        series(&mut out, "healthgrid_service_acknowledged", &s.service, s.last_acked as u64);
    }

    header(&mut out, "healthgrid_service_severity", "Severity of the last check (1 = critical).", "gauge");
    for s in &report.services {
        series(&mut out, "healthgrid_service_severity", &s.service, s.last_severity as u64);
    }

    header(&mut out, "healthgrid_service_last_updated_seconds", "Epoch seconds of the last check.", "gauge");
    for s in &report.services {
        series(&mut out, "healthgrid_service_last_updated_seconds", &s.service, s.last_updated);
    }

    header(&mut out, "healthgrid_tracked_services", "Services under monitoring.", "gauge");
    let _ = writeln!(out, "healthgrid_tracked_services {}", report.tracked_services);

    header(&mut out, "healthgrid_schedulers_started_total", "Refresh loops started.", "counter");
    let _ = writeln!(out, "healthgrid_schedulers_started_total {}", report.schedulers_started);

    header(&mut out, "healthgrid_schedulers_stopped_total", "Refresh loops stopped.", "counter");
    let _ = writeln!(out, "healthgrid_schedulers_stopped_total {}", report.schedulers_stopped);

    header(&mut out, "healthgrid_pilot_light_heartbeats_total", "Pilot light heartbeats.", "counter");
    let _ = writeln!(out, "healthgrid_pilot_light_heartbeats_total {}", report.heartbeats);

    header(&mut out, "healthgrid_pilot_light_last_seconds", "Epoch seconds of the last heartbeat.", "gauge");
    let _ = writeln!(out, "healthgrid_pilot_light_last_seconds {}", report.last_heartbeat);

    out
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

fn series(out: &mut String, name: &str, service: &str, value: u64) {
    let _ = writeln!(out, "{name}{{service=\"{}\"}} {value}", escape_label(service));
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
