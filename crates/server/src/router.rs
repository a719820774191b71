//! Message Router (§4.4)
//!
//! Parses inbound client frames, validates schema, dispatches by
//! `action`, formats outbound frames, and is the single source of the
//! outbound `type` vocabulary (§9 "message-type string drift" redesign
//! flag: `AI_RESPONSE` vs `aiResponse` drift is made unrepresentable by
//! modeling outbound frames as a closed Rust enum serialized once at the
//! edge, grounded on the teacher's `WsMessage` tagged-enum shape in
//! `server/src/websocket.rs`).

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use uuid::Uuid;

use vts_gateway_asr::{AsrSessionPool, TranscriptSink};
use vts_gateway_core::{
    AsrStartOptions, ConversationItem, SessionStatus, TranscriptEvent,
};
use vts_gateway_llm::{AnalysisContext, Analyzer};
use vts_gateway_persistence::ConversationStore;

use crate::connection_manager::ConnectionManager;

/// Inbound client frame (§4.4): `{action, payload, timestamp?}`.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// The closed outbound `type` vocabulary (§4.4, §8): `pong`,
/// `messageReceived`, `status`, `transcription`, `aiResponse`, `error`.
/// No other literal can be constructed — the redesign flag this section
/// documents is fixed by construction, not by convention.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "pong")]
    Pong { timestamp: String },
    #[serde(rename = "messageReceived")]
    MessageReceived {
        #[serde(rename = "messageId")]
        message_id: String,
        timestamp: String,
    },
    #[serde(rename = "status")]
    Status {
        message: String,
        #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    #[serde(rename = "transcription")]
    Transcription { payload: TranscriptionPayload },
    #[serde(rename = "aiResponse")]
    AiResponse {
        payload: vts_gateway_core::AnalysisResult,
    },
    #[serde(rename = "error")]
    Error { error: String, timestamp: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionPayload {
    #[serde(rename = "transcriptText")]
    pub transcript_text: String,
    pub confidence: f32,
    pub timestamp: String,
    #[serde(rename = "isPartial")]
    pub is_partial: bool,
    #[serde(rename = "speakerLabel")]
    pub speaker_label: &'static str,
}

/// Outbound transport sink, implemented by the WebSocket handler's
/// per-connection sender task. Send failures to a vanished connection
/// are logged at warn and swallowed — they must not abort dispatch for
/// other frames (§4.4 Send semantics).
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, connection_id: &str, frame: OutboundFrame);
}

pub struct MessageRouter {
    connections: Arc<ConnectionManager>,
    asr: Arc<AsrSessionPool>,
    analyzer: Arc<Analyzer>,
    conversations: Arc<dyn ConversationStore>,
    sink: Arc<dyn FrameSink>,
    /// Remembers the `(conversationId, itemTimestamp)` key of the live
    /// `TRANSCRIPTION_SESSION` marker per connection, so `stopTranscription`
    /// mutates the same item in place rather than appending a second one
    /// (§3: the status field may transition ACTIVE → STOPPED exactly once
    /// on one item).
    active_session_markers: parking_lot::RwLock<std::collections::HashMap<String, ConversationItem>>,
}

impl MessageRouter {
    pub fn new(
        connections: Arc<ConnectionManager>,
        asr: Arc<AsrSessionPool>,
        analyzer: Arc<Analyzer>,
        conversations: Arc<dyn ConversationStore>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        Self {
            connections,
            asr,
            analyzer,
            conversations,
            sink,
            active_session_markers: parking_lot::RwLock::new(std::collections::HashMap::new()),
        }
    }

    /// Parse one raw inbound text frame and dispatch it. Malformed JSON
    /// produces an `error` frame without closing the connection (§4.4).
    pub async fn handle_raw(&self, connection_id: &str, raw: &str) {
        self.connections.touch(connection_id).await;

        let frame: InboundFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(err) => {
                metrics::counter!("vts_gateway_schema_errors_total").increment(1);
                warn!(connection_id, error = %err, "malformed inbound frame");
                self.sink
                    .send(connection_id, error_frame("malformed JSON frame"))
                    .await;
                return;
            }
        };

        self.dispatch(connection_id, frame).await;
    }

    async fn dispatch(&self, connection_id: &str, frame: InboundFrame) {
        match frame.action.as_str() {
            "ping" => self.handle_ping(connection_id).await,
            "message" => self.handle_message(connection_id, frame.payload).await,
            "startTranscription" => self.handle_start_transcription(connection_id, frame.payload).await,
            "stopTranscription" => self.handle_stop_transcription(connection_id, frame.payload).await,
            "audioData" => self.handle_audio_data(connection_id, frame.payload).await,
            other => {
                metrics::counter!("vts_gateway_schema_errors_total").increment(1);
                warn!(connection_id, action = other, "unknown action");
                self.sink
                    .send(connection_id, error_frame(&format!("unknown action: {other}")))
                    .await;
            }
        }
    }

    /// `ping` is pure: mutates `lastActivity` only (already done in
    /// `handle_raw`), emits exactly one `pong`, never touches
    /// persistence (§8).
    async fn handle_ping(&self, connection_id: &str) {
        self.sink
            .send(connection_id, OutboundFrame::Pong { timestamp: Utc::now().to_rfc3339() })
            .await;
    }

    async fn handle_message(&self, connection_id: &str, payload: serde_json::Value) {
        let Some(content) = payload.get("content").and_then(|v| v.as_str()) else {
            self.sink
                .send(connection_id, error_frame("message.payload.content is required"))
                .await;
            return;
        };
        let message_type = payload.get("type").and_then(|v| v.as_str()).map(str::to_string);

        let message_id = Uuid::new_v4().to_string();
        let item = ConversationItem::message(connection_id, &message_id, content, message_type);
        if let Err(err) = self.conversations.put_item(&item).await {
            warn!(connection_id, error = %err, "failed to persist message item");
        }

        self.sink
            .send(
                connection_id,
                OutboundFrame::MessageReceived {
                    message_id,
                    timestamp: Utc::now().to_rfc3339(),
                },
            )
            .await;

        // A typed `message` is routed as a transcription-equivalent (§8
        // scenario 2): it skips the ASR pool entirely but still goes
        // through the same analysis/persistence fan as a finalized
        // transcript, so operators can type text in place of speaking it.
        if content.trim().chars().count() > 2 {
            self.process_final_transcript(connection_id, content).await;
        }
    }

    async fn handle_start_transcription(&self, connection_id: &str, payload: serde_json::Value) {
        let options = parse_start_options(&payload);

        match self.asr.start_session(connection_id, &options).await {
            Ok(session_id) => {
                let item = ConversationItem::session_marker(
                    connection_id,
                    &session_id,
                    SessionStatus::Active,
                    options.language_code(),
                    options.sample_rate_hz(),
                );
                self.active_session_markers.write().insert(connection_id.to_string(), item.clone());
                if let Err(err) = self.conversations.put_item(&item).await {
                    warn!(connection_id, error = %err, "failed to persist session-start marker");
                }

                self.sink
                    .send(
                        connection_id,
                        OutboundFrame::Status {
                            message: "Transcription started".to_string(),
                            session_id: Some(session_id),
                        },
                    )
                    .await;
            }
            Err(err) => {
                error!(connection_id, error = %err, "failed to start ASR session");
                self.sink
                    .send(connection_id, error_frame(&format!("failed to start transcription: {err}")))
                    .await;
            }
        }
    }

    async fn handle_stop_transcription(&self, connection_id: &str, payload: serde_json::Value) {
        let requested_session_id = payload.get("sessionId").and_then(|v| v.as_str()).map(str::to_string);

        if let Err(err) = self.asr.stop_session(connection_id).await {
            warn!(connection_id, error = %err, "failed to stop ASR session");
        }

        // `stopTranscription` is idempotent: a second call with no marker
        // on record still emits a status frame (§8 round-trip laws).
        let marker = self.active_session_markers.write().remove(connection_id);
        let session_id = marker
            .as_ref()
            .and_then(|item| match &item.payload {
                vts_gateway_core::ItemPayload::TranscriptionSession { session_id, .. } => Some(session_id.clone()),
                _ => None,
            })
            .or(requested_session_id);

        if let Some(mut item) = marker {
            if let vts_gateway_core::ItemPayload::TranscriptionSession { status, .. } = &mut item.payload {
                *status = SessionStatus::Stopped;
            }
            if let Err(err) = self.conversations.update_item(&item).await {
                warn!(connection_id, error = %err, "failed to persist session-stop marker");
            }
        }

        self.sink
            .send(
                connection_id,
                OutboundFrame::Status {
                    message: "Transcription stopped".to_string(),
                    session_id,
                },
            )
            .await;
    }

    async fn handle_audio_data(&self, connection_id: &str, payload: serde_json::Value) {
        let Some(audio_b64) = payload.get("audio").and_then(|v| v.as_str()) else {
            self.sink
                .send(connection_id, error_frame("audioData.payload.audio is required"))
                .await;
            return;
        };
        if audio_b64.is_empty() {
            self.sink
                .send(connection_id, error_frame("audioData.payload.audio must not be empty"))
                .await;
            return;
        }

        let chunk = match BASE64.decode(audio_b64) {
            Ok(bytes) => bytes,
            Err(err) => {
                metrics::counter!("vts_gateway_schema_errors_total").increment(1);
                self.sink
                    .send(connection_id, error_frame(&format!("invalid base64 audio: {err}")))
                    .await;
                return;
            }
        };

        // §9 "lazy auto-start" redesign flag: the behavior is kept
        // (clients rely on it) but logged explicitly, and the pool
        // itself performs the auto-start.
        if !self.asr.has_session(connection_id) {
            warn!(connection_id, "audioData received before startTranscription; auto-starting with defaults");
        }

        if let Err(err) = self.asr.feed(connection_id, &chunk).await {
            error!(connection_id, error = %err, "failed to feed ASR session");
            self.sink
                .send(connection_id, error_frame(&format!("audio feed failed: {err}")))
                .await;
        }
    }

    /// Run the LLM analysis + persistence + `aiResponse` emission for one
    /// finalized transcript. Best-effort and independent of the preceding
    /// `transcription` frame send (§4.4 steps a-d).
    async fn process_final_transcript(&self, connection_id: &str, text: &str) {
        let context = AnalysisContext {
            connection_id: connection_id.to_string(),
            location: None,
            vessel_info: None,
        };

        let analysis = match self.analyzer.analyze(text, context).await {
            Ok(result) => result,
            Err(err) => {
                // Analyzer errors are never surfaced as `error` frames
                // (§4.3, §7); this path only fires on sanitizer
                // validation failure (e.g. empty-after-cleaning input),
                // which is itself a schema-shaped condition.
                warn!(connection_id, error = %err, "transcript rejected by analyzer sanitizer");
                return;
            }
        };

        let item = ConversationItem::ai_response(connection_id, analysis.clone(), text);
        if let Err(err) = self.conversations.put_item(&item).await {
            warn!(connection_id, error = %err, "failed to persist ai_response item");
        }

        self.sink.send(connection_id, OutboundFrame::AiResponse { payload: analysis }).await;
    }
}

#[async_trait]
impl TranscriptSink for MessageRouter {
    async fn on_transcript(&self, connection_id: &str, event: TranscriptEvent) {
        let frame = OutboundFrame::Transcription {
            payload: TranscriptionPayload {
                transcript_text: event.text.clone(),
                confidence: event.confidence,
                timestamp: event.timestamp.to_rfc3339(),
                is_partial: event.is_partial,
                speaker_label: "VTS",
            },
        };
        self.sink.send(connection_id, frame).await;

        if event.triggers_downstream() {
            let item = ConversationItem::transcription(connection_id, &event.text, event.confidence);
            if let Err(err) = self.conversations.put_item(&item).await {
                warn!(connection_id, error = %err, "failed to persist transcription item");
            }

            self.process_final_transcript(connection_id, &event.text).await;
        }
    }
}

fn error_frame(message: &str) -> OutboundFrame {
    OutboundFrame::Error {
        error: message.to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}

fn parse_start_options(payload: &serde_json::Value) -> AsrStartOptions {
    AsrStartOptions {
        language_code: payload.get("languageCode").and_then(|v| v.as_str()).map(str::to_string),
        sample_rate_hz: payload.get("sampleRate").and_then(|v| v.as_u64()).map(|v| v as u32),
        media_encoding: None,
        vocabulary_name: payload.get("vocabularyName").and_then(|v| v.as_str()).map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as SyncMutex;
    use std::sync::Arc;
    use vts_gateway_asr::SimulatedAsrBackend;
    use vts_gateway_llm::{Analyzer, AnalyzerBackend, AnalyzerError};
    use vts_gateway_persistence::{InMemoryConnectionStore, InMemoryConversationStore};

    struct RecordingSink {
        frames: SyncMutex<Vec<(String, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self { frames: SyncMutex::new(Vec::new()) }
        }

        fn types_for(&self, connection_id: &str) -> Vec<String> {
            self.frames
                .lock()
                .iter()
                .filter(|(id, _)| id == connection_id)
                .map(|(_, t)| t.clone())
                .collect()
        }
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send(&self, connection_id: &str, frame: OutboundFrame) {
            let type_tag = match &frame {
                OutboundFrame::Pong { .. } => "pong",
                OutboundFrame::MessageReceived { .. } => "messageReceived",
                OutboundFrame::Status { .. } => "status",
                OutboundFrame::Transcription { .. } => "transcription",
                OutboundFrame::AiResponse { .. } => "aiResponse",
                OutboundFrame::Error { .. } => "error",
            };
            self.frames.lock().push((connection_id.to_string(), type_tag.to_string()));
        }
    }

    struct StubBackend;

    #[async_trait]
    impl AnalyzerBackend for StubBackend {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, AnalyzerError> {
            Ok(r#"{"classification":"GREEN","suggestedResponse":"了解しました","confidence":0.9}"#.to_string())
        }
    }

    fn build_router(sink: Arc<RecordingSink>) -> MessageRouter {
        let connections = Arc::new(ConnectionManager::new(Arc::new(InMemoryConnectionStore::new())));
        let conversations: Arc<dyn ConversationStore> = Arc::new(InMemoryConversationStore::new());
        let analyzer = Arc::new(Analyzer::new(Arc::new(StubBackend), 10));

        MessageRouter::new(
            connections,
            Arc::new(AsrSessionPool::new(
                Arc::new(SimulatedAsrBackend::new()),
                sink.clone(),
            )),
            analyzer,
            conversations,
            sink,
        )
    }

    #[async_trait]
    impl TranscriptSink for RecordingSink {
        async fn on_transcript(&self, _connection_id: &str, _event: TranscriptEvent) {}
    }

    #[tokio::test]
    async fn ping_produces_exactly_one_pong() {
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router.connections.register("conn-1", None, None).await.unwrap();

        router.handle_raw("conn-1", r#"{"action":"ping","payload":{}}"#).await;
        assert_eq!(sink.types_for("conn-1"), vec!["pong".to_string()]);
    }

    #[tokio::test]
    async fn unknown_action_produces_error_frame_and_preserves_connection() {
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router.connections.register("conn-1", None, None).await.unwrap();

        router.handle_raw("conn-1", r#"{"action":"foo","payload":{}}"#).await;
        assert_eq!(sink.types_for("conn-1"), vec!["error".to_string()]);

        router.handle_raw("conn-1", r#"{"action":"ping","payload":{}}"#).await;
        assert_eq!(sink.types_for("conn-1"), vec!["error".to_string(), "pong".to_string()]);
    }

    #[tokio::test]
    async fn malformed_json_produces_error_frame() {
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router.handle_raw("conn-1", "not json at all").await;
        assert_eq!(sink.types_for("conn-1"), vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn empty_audio_is_rejected_as_schema_error() {
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router.handle_raw("conn-1", r#"{"action":"audioData","payload":{"audio":""}}"#).await;
        assert_eq!(sink.types_for("conn-1"), vec!["error".to_string()]);
    }

    #[tokio::test]
    async fn short_message_emits_only_message_received() {
        // len("hi") <= 2, so the transcription-equivalent analysis path
        // (§4.2 "short fragments are dropped silently") never fires.
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router
            .handle_raw("conn-1", r#"{"action":"message","payload":{"content":"hi"}}"#)
            .await;
        assert_eq!(sink.types_for("conn-1"), vec!["messageReceived".to_string()]);
    }

    #[tokio::test]
    async fn message_over_threshold_also_triggers_analysis() {
        // §8 scenario 2: a typed message is routed as a
        // transcription-equivalent once it clears the two-character
        // threshold, so it also produces an `aiResponse`.
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router
            .handle_raw("conn-1", r#"{"action":"message","payload":{"content":"hello"}}"#)
            .await;
        assert_eq!(
            sink.types_for("conn-1"),
            vec!["messageReceived".to_string(), "aiResponse".to_string()]
        );
    }

    #[tokio::test]
    async fn start_then_stop_transcription_emits_two_status_frames() {
        let sink = Arc::new(RecordingSink::new());
        let router = build_router(sink.clone());
        router
            .handle_raw("conn-1", r#"{"action":"startTranscription","payload":{}}"#)
            .await;
        router
            .handle_raw("conn-1", r#"{"action":"stopTranscription","payload":{}}"#)
            .await;
        assert_eq!(sink.types_for("conn-1"), vec!["status".to_string(), "status".to_string()]);
    }
}
