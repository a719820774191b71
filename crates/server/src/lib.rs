//! VTS voice gateway session server
//!
//! The composition root (`main.rs`) wires the Persistence Adapter,
//! Connection Manager, ASR Session Pool, LLM Analyzer, and Message
//! Router in dependency order, then hands them to the axum listener
//! (§2, §9 "ad-hoc global instances" redesign flag).

pub mod connection_manager;
pub mod http;
pub mod metrics;
pub mod router;
pub mod sink;
pub mod state;
pub mod websocket;

pub use connection_manager::ConnectionManager;
pub use http::create_router;
pub use metrics::init_metrics;
pub use router::MessageRouter;
pub use sink::{RouterTranscriptSink, WsSinkRegistry};
pub use state::AppState;
pub use websocket::WebSocketHandler;

use thiserror::Error;

/// Gateway errors, mapped to HTTP status codes at the transport boundary.
/// Per §7 only *fatal* errors reach this far; everything else is
/// contained and converted to an outbound frame or a logged metric.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<GatewayError> for axum::http::StatusCode {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Connection(_) => axum::http::StatusCode::NOT_FOUND,
            GatewayError::WebSocket(_) => axum::http::StatusCode::BAD_REQUEST,
            GatewayError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            GatewayError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Persistence(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<vts_gateway_core::Error> for GatewayError {
    fn from(err: vts_gateway_core::Error) -> Self {
        GatewayError::Internal(err.to_string())
    }
}
