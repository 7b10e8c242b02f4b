//! healthgrid-api: HTTP surface for the health engine.
//!
//! Aggregates are served as bare JSON documents; acknowledgement endpoints
//! and errors use the `{success, data, error}` envelope.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/__health?categories=a,b&cache=false` | Services aggregate |
//! | GET | `/__gtg?categories=a,b` | 200 when healthy, 503 otherwise |
//! | GET | `/__pods-health?service-name=x` | Pods aggregate, always live |
//! | GET | `/__pod-individual-health?pod-name=x` | Pod's own health payload |
//! | POST | `/add-ack` | Acknowledge a service |
//! | POST | `/rem-ack` | Remove an acknowledgement |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use healthgrid_health::AggregationEngine;
use healthgrid_metrics::{PilotLight, ResultFeeder};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<AggregationEngine>,
    pub feeder: Arc<ResultFeeder>,
    pub pilot: Arc<PilotLight>,
}

/// Build the complete API router (health + acks + metrics).
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/__health", get(handlers::services_health))
        .route("/__gtg", get(handlers::good_to_go))
        .route("/__pods-health", get(handlers::pods_health))
        .route("/__pod-individual-health", get(handlers::pod_individual_health))
        .route("/add-ack", post(handlers::add_ack))
        .route("/rem-ack", post(handlers::remove_ack))
        .route("/metrics", get(handlers::prometheus_metrics))
        .with_state(state)
}
