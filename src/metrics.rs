//! Prometheus metrics for assetstamp.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides an axum middleware for HTTP RED
//! metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "assetstamp_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "assetstamp_http_request_duration_seconds";

/// Assets written to the asset container (counter).
pub const ASSETS_PUBLISHED_TOTAL: &str = "assetstamp_assets_published_total";

/// Bytes written to the asset container (counter).
pub const ASSET_BYTES_PUBLISHED_TOTAL: &str = "assetstamp_asset_bytes_published_total";

/// Naming records upserted (counter).
pub const ASSETS_NAMED_TOTAL: &str = "assetstamp_assets_named_total";

/// Per-file pipeline failures (counter). Labels: stage.
pub const ASSET_INGEST_FAILURES_TOTAL: &str = "assetstamp_asset_ingest_failures_total";

/// API keys issued (counter).
pub const API_KEYS_ISSUED_TOTAL: &str = "assetstamp_api_keys_issued_total";

/// API keys revoked (counter).
pub const API_KEYS_REVOKED_TOTAL: &str = "assetstamp_api_keys_revoked_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus recorder. Idempotent; safe to call from
/// several tests. Fails only if another recorder was installed first.
pub fn init_metrics() -> anyhow::Result<&'static PrometheusHandle> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle))
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(ASSETS_PUBLISHED_TOTAL, "Assets written to the asset container");
    describe_counter!(ASSET_BYTES_PUBLISHED_TOTAL, "Bytes written to the asset container");
    describe_counter!(ASSETS_NAMED_TOTAL, "Logical asset names bound to a URL");
    describe_counter!(ASSET_INGEST_FAILURES_TOTAL, "Asset ingest failures by stage");
    describe_counter!(API_KEYS_ISSUED_TOTAL, "API keys issued");
    describe_counter!(API_KEYS_REVOKED_TOTAL, "API keys revoked");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Skips `/metrics` itself. Must be the outermost layer so it captures the
/// full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Normalize a request path to its route template so asset and key names
/// never become label values.
fn normalize_path(path: &str) -> String {
    match path {
        "/health" | "/openapi.json" | "/metrics" | "/assets" | "/keys" => path.to_string(),
        _ => {
            let trimmed = path.trim_matches('/');
            match trimmed.split_once('/') {
                Some(("assets", _)) => "/assets/{key}".to_string(),
                Some(("keys", _)) => "/keys/{key}".to_string(),
                None if trimmed == "assets" || trimmed == "keys" => format!("/{trimmed}"),
                _ => "/{other}".to_string(),
            }
        }
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics`: Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics disabled").into_response(),
    }
}
