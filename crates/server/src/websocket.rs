//! WebSocket transport (§6 "persistent bidirectional text-frame channel")
//!
//! Adapted from the teacher's `handle_socket`/task-spawn/shared-sink
//! pattern: the sender half is wrapped in an `Arc<Mutex<_>>` and handed
//! to a `FrameSink` implementation so the Router can push frames back
//! without holding a borrow across the connection's inbound-frame loop.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use futures::StreamExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

/// Every task tied to a connection must terminate within this window of
/// disconnect (§5).
const DISCONNECT_TEARDOWN: Duration = Duration::from_secs(2);

pub struct WebSocketHandler;

impl WebSocketHandler {
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
        ConnectInfo(addr): ConnectInfo<std::net::SocketAddr>,
    ) -> Response {
        ws.on_upgrade(move |socket| Self::handle_socket(socket, state, addr.ip().to_string()))
    }

    async fn handle_socket(socket: WebSocket, state: AppState, client_ip: String) {
        let connection_id = Uuid::new_v4().to_string();
        let (sender, mut receiver) = socket.split();
        let sender = Arc::new(tokio::sync::Mutex::new(sender));

        if let Err(err) = state.connections.register(&connection_id, Some(client_ip), None).await {
            warn!(connection_id, error = %err, "connection registration failed, refusing upgrade");
            return;
        }
        state.sinks.register(&connection_id, sender);
        info!(connection_id, "connection established");
        metrics::gauge!("vts_gateway_active_connections").increment(1.0);

        while let Some(message) = receiver.next().await {
            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    debug!(connection_id, error = %err, "websocket receive error, treating as disconnect");
                    break;
                }
            };

            match message {
                Message::Text(text) => state.router.handle_raw(&connection_id, &text).await,
                Message::Close(_) => break,
                Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {
                    // Binary frames carry no meaning in the wire protocol
                    // (§6); audio is base64-encoded inside `audioData`.
                }
            }
        }

        Self::teardown(&state, &connection_id).await;
        metrics::gauge!("vts_gateway_active_connections").decrement(1.0);
    }

    /// Stop the connection's ASR session and drop its connection record
    /// within the disconnect window (§5). Any in-flight LLM call for this
    /// connection is simply abandoned — there is nowhere left to deliver
    /// its `aiResponse`.
    async fn teardown(state: &AppState, connection_id: &str) {
        let outcome = tokio::time::timeout(DISCONNECT_TEARDOWN, async {
            if let Err(err) = state.asr.stop_session(connection_id).await {
                warn!(connection_id, error = %err, "error stopping ASR session on disconnect");
            }
            state.connections.remove(connection_id).await;
        })
        .await;

        state.sinks.remove(connection_id);
        if outcome.is_err() {
            warn!(connection_id, "disconnect teardown exceeded its deadline");
        }
        info!(connection_id, "connection torn down");
    }
}
