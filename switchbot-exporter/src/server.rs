// SwitchBot Exporter - HTTP surface
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! HTTP endpoints: Prometheus scrape, liveness, readiness, and status.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use switchbot_metrics::PollState;
use tracing::error;

/// Application state shared across handlers.
pub struct AppState {
    pub registry: Registry,
    pub poll_state: Arc<PollState>,
    pub device_count: usize,
    pub start_time: Instant,
}

/// Build the exporter router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/status", get(status_handler))
        .with_state(state)
}

/// Encode every registered metric to Prometheus text format.
pub fn encode_metrics(registry: &Registry) -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Metrics handler - returns Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match encode_metrics(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [("Content-Type", prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Readiness check handler; ready once the first poll cycle completed.
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.poll_state.is_ready() {
        (StatusCode::OK, "Ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
    }
}

/// Status information response.
#[derive(Serialize)]
struct StatusResponse {
    version: String,
    uptime_secs: u64,
    devices: usize,
    poll_cycles: u64,
    ready: bool,
}

/// Status handler - returns JSON status information.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        devices: state.device_count,
        poll_cycles: state.poll_state.cycles(),
        ready: state.poll_state.is_ready(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::sync::atomic::Ordering;
    use switchbot_metrics::{DeviceRegistry, DiscoveredDevice, GaugeBinder};
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        let registry = Registry::new();
        let binder = GaugeBinder::new(registry.clone());
        DeviceRegistry::from_discovered(
            vec![DiscoveredDevice::new("M1", "Living", "Meter")],
            &binder,
        )
        .unwrap();

        Arc::new(AppState {
            registry,
            poll_state: Arc::new(PollState::default()),
            device_count: 1,
            start_time: Instant::now(),
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (status, body) = get(state(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#"switchbot_temperature{device_id="M1",device_name="Living"} 0"#));
        assert!(body.contains("# TYPE switchbot_humidity gauge"));
    }

    #[tokio::test]
    async fn test_ready_after_first_poll() {
        let state = state();
        let (status, _) = get(Arc::clone(&state), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.poll_state.ready.store(true, Ordering::SeqCst);
        let (status, _) = get(state, "/ready").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_json() {
        let (status, body) = get(state(), "/status").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains(r#""devices":1"#));
        assert!(body.contains(r#""ready":false"#));
    }
}
