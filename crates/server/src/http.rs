//! HTTP surface: the `/ws` upgrade route plus operational endpoints.

use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::metrics::metrics_handler;
use crate::state::AppState;
use crate::websocket::WebSocketHandler;

pub fn create_router(state: AppState) -> Router {
    let config = state.get_config();
    let cors_layer = build_cors_layer(&config.server.cors_origins, config.server.cors_enabled);
    drop(config);

    Router::new()
        .route("/ws", get(WebSocketHandler::handle))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(std::time::Duration::from_secs(30)))
        .layer(cors_layer)
        .with_state(state)
}

/// - CORS disabled -> permissive (development only).
/// - No origins configured -> default to `localhost:3000` rather than
///   `Any`, since a gateway carrying vessel-position audio should not
///   default to an open cross-origin policy.
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled, allowing all origins (not for production)");
        return CorsLayer::permissive();
    }

    if origins.is_empty() {
        tracing::info!("no CORS origins configured, defaulting to localhost:3000");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::error!("all configured CORS origins are invalid, falling back to localhost");
        return CorsLayer::new()
            .allow_origin("http://localhost:3000".parse::<HeaderValue>().unwrap())
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_credentials(true)
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "healthy", "version": env!("CARGO_PKG_VERSION") })))
}

/// Readiness round-trips the connection store with a throwaway lookup;
/// a persistence outage surfaces here as `not_ready` well before it
/// would otherwise show up as failed `register()` calls on new sockets.
async fn readiness_check(axum::extract::State(state): axum::extract::State<AppState>) -> impl IntoResponse {
    let mut checks = serde_json::Map::new();
    let test_record = state.connections.register("__readiness_probe__", None, None).await;
    let store_ok = test_record.is_ok();
    if store_ok {
        state.connections.remove("__readiness_probe__").await;
    }
    checks.insert("connection_store".to_string(), serde_json::json!({ "status": if store_ok { "ok" } else { "error" } }));

    let status_code = if store_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(serde_json::json!({ "status": if store_ok { "ready" } else { "not_ready" }, "checks": checks })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vts_gateway_config::Settings;
    use vts_gateway_persistence::{InMemoryConnectionStore, InMemoryConversationStore};
    use vts_gateway_llm::{Analyzer, AnalyzerBackend, AnalyzerError};
    use vts_gateway_asr::{AsrSessionPool, SimulatedAsrBackend};
    use crate::connection_manager::ConnectionManager;
    use crate::router::MessageRouter;
    use crate::sink::{RouterTranscriptSink, WsSinkRegistry};
    use std::sync::Arc;

    struct StubBackend;

    #[async_trait::async_trait]
    impl AnalyzerBackend for StubBackend {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, AnalyzerError> {
            Ok(r#"{"classification":"GREEN","suggestedResponse":"ok","confidence":0.9}"#.to_string())
        }
    }

    #[test]
    fn router_builds_with_all_routes_mounted() {
        let connections = Arc::new(ConnectionManager::new(Arc::new(InMemoryConnectionStore::new())));
        let conversations: Arc<dyn vts_gateway_persistence::ConversationStore> = Arc::new(InMemoryConversationStore::new());
        let analyzer = Arc::new(Analyzer::new(Arc::new(StubBackend), 10));
        let transcript_sink = Arc::new(RouterTranscriptSink::new());
        let asr = Arc::new(AsrSessionPool::new(Arc::new(SimulatedAsrBackend::new()), transcript_sink.clone()));
        let sinks = Arc::new(WsSinkRegistry::new());
        let router = Arc::new(MessageRouter::new(connections.clone(), asr.clone(), analyzer, conversations, sinks.clone()));
        transcript_sink.bind(router.clone());

        let state = AppState::new(Settings::default(), connections, asr, router, sinks);
        let _ = create_router(state);
    }
}
