//! Prometheus metrics (ambient observability, §2)
//!
//! `vts_gateway_schema_errors_total` and `vts_gateway_active_connections`
//! are recorded at the call sites in `router.rs`/`websocket.rs`; this
//! module only owns exporter setup and the `/metrics` scrape handler.

use axum::http::StatusCode;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and bind it for `/metrics` to
/// render from. Call once at startup, before any `metrics::counter!`/
/// `gauge!` call.
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    bind_handle(handle.clone());
    handle
}

pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<crate::state::AppState>,
) -> Result<String, StatusCode> {
    let _ = &state;
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => Ok(handle.render()),
        None => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

/// Set once by `main.rs` right after `init_metrics()`, since axum
/// handlers don't have a convenient place to carry a non-`AppState`
/// value through `with_state`.
pub static PROMETHEUS_HANDLE: std::sync::OnceLock<PrometheusHandle> = std::sync::OnceLock::new();

pub fn bind_handle(handle: PrometheusHandle) {
    let _ = PROMETHEUS_HANDLE.set(handle);
}
