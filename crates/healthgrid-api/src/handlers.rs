//! HTTP handlers.
//!
//! Each handler delegates to the `AggregationEngine` and maps engine errors
//! onto status codes.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::warn;

use healthgrid_health::EngineError;
use healthgrid_metrics::{MetricsReport, render_prometheus};
use healthgrid_state::DEFAULT_CATEGORY;

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn engine_error_response(e: &EngineError) -> Response {
    let status = match e {
        EngineError::ServiceNotFound(_) | EngineError::PodNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::EmptyAck => StatusCode::BAD_REQUEST,
        EngineError::Payload(_) => StatusCode::SERVICE_UNAVAILABLE,
        EngineError::Discovery(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(error = %e, "request failed");
    }
    error_response(&e.to_string(), status)
}

/// Split `a,b` into category names; nothing requested means `default`.
pub fn parse_categories(raw: Option<&str>) -> Vec<String> {
    let categories: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();
    if categories.is_empty() {
        vec![DEFAULT_CATEGORY.to_string()]
    } else {
        categories
    }
}

// ── Services ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct HealthQuery {
    pub categories: Option<String>,
    pub cache: Option<bool>,
}

/// GET /__health
pub async fn services_health(
    State(state): State<ApiState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let categories = parse_categories(query.categories.as_deref());
    let use_cache = query.cache.unwrap_or(true);

    match state
        .engine
        .build_services_health_result(&categories, use_cache)
        .await
    {
        Ok(health) if !health.has_valid_categories() => {
            error_response("no valid categories", StatusCode::BAD_REQUEST)
        }
        Ok(health) => Json(health.result).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

/// GET /__gtg
pub async fn good_to_go(
    State(state): State<ApiState>,
    Query(query): Query<HealthQuery>,
) -> Response {
    let categories = parse_categories(query.categories.as_deref());
    let use_cache = query.cache.unwrap_or(true);

    let (status, body) = match state.engine.gtg(&categories, use_cache).await {
        Ok(true) => (StatusCode::OK, "OK".to_string()),
        Ok(false) => (StatusCode::SERVICE_UNAVAILABLE, "NOT OK".to_string()),
        Err(e) => {
            warn!(error = %e, "gtg check failed");
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    };
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

// ── Pods ───────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct PodsHealthQuery {
    #[serde(rename = "service-name")]
    pub service_name: Option<String>,
    pub cache: Option<bool>,
}

/// GET /__pods-health
pub async fn pods_health(
    State(state): State<ApiState>,
    Query(query): Query<PodsHealthQuery>,
) -> Response {
    let Some(service) = query.service_name.filter(|s| !s.is_empty()) else {
        return error_response("service-name is required", StatusCode::BAD_REQUEST);
    };

    match state
        .engine
        .build_pods_health_result(&service, query.cache.unwrap_or(true))
        .await
    {
        Ok(result) => Json(result).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PodQuery {
    #[serde(rename = "pod-name")]
    pub pod_name: Option<String>,
}

/// GET /__pod-individual-health
pub async fn pod_individual_health(
    State(state): State<ApiState>,
    Query(query): Query<PodQuery>,
) -> Response {
    let Some(pod) = query.pod_name.filter(|p| !p.is_empty()) else {
        return error_response("pod-name is required", StatusCode::BAD_REQUEST);
    };

    match state.engine.get_individual_pod_health(&pod).await {
        Ok(payload) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            payload,
        )
            .into_response(),
        Err(e) => engine_error_response(&e),
    }
}

// ── Acknowledgements ───────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AddAckRequest {
    pub service: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct RemoveAckRequest {
    pub service: String,
}

/// POST /add-ack
pub async fn add_ack(State(state): State<ApiState>, Json(req): Json<AddAckRequest>) -> Response {
    match state.engine.add_ack(&req.service, &req.message).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({
            "service": req.service,
            "ack": req.message,
        }))
        .into_response(),
        Err(e) => engine_error_response(&e),
    }
}

/// POST /rem-ack
pub async fn remove_ack(
    State(state): State<ApiState>,
    Json(req): Json<RemoveAckRequest>,
) -> Response {
    match state.engine.remove_ack(&req.service).await {
        Ok(()) => ApiResponse::ok(serde_json::json!({ "service": req.service })).into_response(),
        Err(e) => engine_error_response(&e),
    }
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let report = MetricsReport::gather(&state.feeder, &state.pilot).await;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        render_prometheus(&report),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use healthgrid_health::testing::FakeInventory;
    use healthgrid_health::{AggregationEngine, EngineConfig, ServiceRegistry};
    use healthgrid_metrics::{PilotLight, ResultFeeder};
    use healthgrid_state::Service;

    fn test_state(fake: FakeInventory) -> (Arc<FakeInventory>, ApiState) {
        let fake = Arc::new(fake);
        let registry = Arc::new(ServiceRegistry::new(fake.clone(), EngineConfig::default()));
        let state = ApiState {
            engine: Arc::new(AggregationEngine::new(fake.clone(), registry.clone())),
            feeder: Arc::new(ResultFeeder::new(registry, Duration::from_secs(60))),
            pilot: Arc::new(PilotLight::new(Duration::from_secs(60))),
        };
        (fake, state)
    }

    fn inventory() -> FakeInventory {
        FakeInventory::new()
            .with_category(DEFAULT_CATEGORY, &[])
            .with_category("read", &["api"])
            .with_service(Service::new("api", 8080))
            .with_pod("api-0", "api")
            .with_payload("api-0", r#"{"checks":[]}"#)
    }

    #[test]
    fn categories_default_when_absent() {
        assert_eq!(parse_categories(None), vec!["default"]);
        assert_eq!(parse_categories(Some(" , ")), vec!["default"]);
        assert_eq!(parse_categories(Some("read, write")), vec!["read", "write"]);
    }

    #[tokio::test]
    async fn health_with_default_category() {
        let (_, state) = test_state(inventory());
        let resp = services_health(State(state), Query(HealthQuery::default())).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_with_unknown_category_is_bad_request() {
        let (_, state) = test_state(inventory());
        let query = HealthQuery {
            categories: Some("nonexistent-category".to_string()),
            cache: Some(false),
        };
        let resp = services_health(State(state), Query(query)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health_discovery_failure_is_server_error() {
        let (fake, state) = test_state(inventory());
        fake.fail_discovery("inventory offline");
        let resp = services_health(State(state), Query(HealthQuery::default())).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn gtg_reflects_health() {
        let (fake, state) = test_state(inventory());
        let query = || HealthQuery {
            categories: None,
            cache: Some(false),
        };

        let resp = good_to_go(State(state.clone()), Query(query())).await;
        assert_eq!(resp.status(), StatusCode::OK);

        fake.set_service_unhealthy("api", "down");
        let resp = good_to_go(State(state), Query(query())).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn pods_health_requires_service_name() {
        let (_, state) = test_state(inventory());
        let resp = pods_health(State(state), Query(PodsHealthQuery::default())).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn pods_health_unknown_service_is_not_found() {
        let (_, state) = test_state(inventory());
        let query = PodsHealthQuery {
            service_name: Some("ghost".to_string()),
            cache: None,
        };
        let resp = pods_health(State(state), Query(query)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn individual_health_passes_payload_through() {
        let (_, state) = test_state(inventory());
        let query = PodQuery {
            pod_name: Some("api-0".to_string()),
        };
        let resp = pod_individual_health(State(state), Query(query)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert_eq!(content_type, "application/json");
    }

    #[tokio::test]
    async fn individual_health_unknown_pod_is_not_found() {
        let (_, state) = test_state(inventory());
        let query = PodQuery {
            pod_name: Some("ghost-0".to_string()),
        };
        let resp = pod_individual_health(State(state), Query(query)).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_ack_is_rejected() {
        let (_, state) = test_state(inventory());
        let req = AddAckRequest {
            service: "api".to_string(),
            message: String::new(),
        };
        let resp = add_ack(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ack_round_trip_through_inventory() {
        let (fake, state) = test_state(inventory());
        let req = AddAckRequest {
            service: "api".to_string(),
            message: "deploying".to_string(),
        };
        let resp = add_ack(State(state.clone()), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fake.service("api").unwrap().ack, "deploying");

        let req = RemoveAckRequest {
            service: "api".to_string(),
        };
        let resp = remove_ack(State(state), Json(req)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(fake.service("api").unwrap().ack, "");
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let (_, state) = test_state(inventory());
        let resp = prometheus_metrics(State(state)).await;
        let resp = resp.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
