//! Wiring that breaks the Router/ASR-pool construction cycle.
//!
//! The Message Router needs a handle to the ASR Session Pool, and the
//! pool needs a `TranscriptSink` to deliver events back through — which
//! is the Router itself. Neither can be built first. `RouterTranscriptSink`
//! is bound to the Router after both exist (`main.rs`'s composition
//! root), the same one-cell-filled-after-construction trick the teacher
//! uses nowhere directly but which is the standard way to cut this kind
//! of cycle in owned, non-`Rc`-cyclic Rust.
//!
//! `WsSinkRegistry` plays the matching role on the outbound side: one
//! Router instance is shared by every connection, so its `FrameSink`
//! can't be a single WebSocket sender — it has to look one up by
//! `connectionId` per call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitSink;
use futures::SinkExt;
use parking_lot::RwLock;
use tokio::sync::{Mutex, OnceCell};
use tracing::warn;
use vts_gateway_asr::TranscriptSink;
use vts_gateway_core::TranscriptEvent;

use crate::router::{FrameSink, MessageRouter, OutboundFrame};

pub struct RouterTranscriptSink {
    router: OnceCell<Arc<MessageRouter>>,
}

impl RouterTranscriptSink {
    pub fn new() -> Self {
        Self { router: OnceCell::new() }
    }

    /// Bind the Router this sink forwards to. Must be called exactly
    /// once, after the Router is constructed, before any connection
    /// starts an ASR session.
    pub fn bind(&self, router: Arc<MessageRouter>) {
        let _ = self.router.set(router);
    }
}

impl Default for RouterTranscriptSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptSink for RouterTranscriptSink {
    async fn on_transcript(&self, connection_id: &str, event: TranscriptEvent) {
        match self.router.get() {
            Some(router) => router.on_transcript(connection_id, event).await,
            None => warn!(connection_id, "transcript dropped: router not yet bound"),
        }
    }
}

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Maps live connections to their WebSocket sender half so the shared
/// Router can deliver outbound frames without owning the transport.
#[derive(Default)]
pub struct WsSinkRegistry {
    senders: RwLock<HashMap<String, WsSender>>,
}

impl WsSinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: &str, sender: WsSender) {
        self.senders.write().insert(connection_id.to_string(), sender);
    }

    pub fn remove(&self, connection_id: &str) {
        self.senders.write().remove(connection_id);
    }
}

#[async_trait]
impl FrameSink for WsSinkRegistry {
    async fn send(&self, connection_id: &str, frame: OutboundFrame) {
        let sender = self.senders.read().get(connection_id).cloned();
        let Some(sender) = sender else {
            warn!(connection_id, "outbound frame dropped: connection not registered");
            return;
        };

        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(err) => {
                warn!(connection_id, error = %err, "failed to serialize outbound frame");
                return;
            }
        };

        let mut sender = sender.lock().await;
        match tokio::time::timeout(std::time::Duration::from_secs(2), sender.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(connection_id, error = %err, "outbound send failed, connection likely gone"),
            Err(_) => warn!(connection_id, "outbound send timed out, treating connection as gone"),
        }
    }
}
