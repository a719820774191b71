//! Per-connection ASR session pool (§4.2)
//!
//! Grounded on `SessionManager`'s map-of-`Arc` lifecycle in the teacher's
//! `server/src/session.rs` and the task-spawn-plus-channel wiring in its
//! `websocket.rs`. A session is keyed by `connectionId` alone: at most one
//! live upstream session per connection.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex as SyncMutex, RwLock};
use tracing::{debug, error, info, warn};
use vts_gateway_core::{AsrStartOptions, Result, SessionStatus, TranscriptEvent, TranscriptionSession};

use crate::backend::{AsrStream, StreamingAsrBackend};
use crate::diagnostics::{AudioDumpSink, NullAudioDumpSink};

/// Receives transcript events as they arrive from a connection's live
/// session. Implemented by the Message Router.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn on_transcript(&self, connection_id: &str, event: TranscriptEvent);
}

struct PoolEntry {
    session: SyncMutex<TranscriptionSession>,
    stream: Arc<dyn AsrStream>,
}

pub struct AsrSessionPool {
    backend: Arc<dyn StreamingAsrBackend>,
    sink: Arc<dyn TranscriptSink>,
    sessions: Arc<RwLock<HashMap<String, Arc<PoolEntry>>>>,
    max_sessions: usize,
    audio_dump: Arc<dyn AudioDumpSink>,
}

impl AsrSessionPool {
    pub fn new(backend: Arc<dyn StreamingAsrBackend>, sink: Arc<dyn TranscriptSink>) -> Self {
        Self::with_max_sessions(backend, sink, crate::backend::DEFAULT_MAX_CONCURRENT_SESSIONS)
    }

    /// `max_sessions` bounds concurrent upstream sessions (§5 Resource
    /// bounds: "default 20; upstream services typically limit to 25").
    /// Admission beyond the bound rejects `startTranscription` with an
    /// error the Router turns into a user-facing frame; it never
    /// disconnects the client.
    pub fn with_max_sessions(backend: Arc<dyn StreamingAsrBackend>, sink: Arc<dyn TranscriptSink>, max_sessions: usize) -> Self {
        Self {
            backend,
            sink,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            audio_dump: Arc::new(NullAudioDumpSink),
        }
    }

    /// Same as [`Self::with_max_sessions`] but additionally wires a
    /// diagnostic audio dump sink (§6 `saveAudioToStorage`). Pass
    /// [`NullAudioDumpSink`] (the default) to disable it.
    pub fn with_audio_dump(
        backend: Arc<dyn StreamingAsrBackend>,
        sink: Arc<dyn TranscriptSink>,
        max_sessions: usize,
        audio_dump: Arc<dyn AudioDumpSink>,
    ) -> Self {
        Self {
            backend,
            sink,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_sessions,
            audio_dump,
        }
    }

    /// Start (or restart) a session for `connectionId`. If a session
    /// already exists it is stopped first; its reader is left to drain
    /// and terminate naturally while the new entry replaces it.
    pub async fn start_session(&self, connection_id: &str, options: &AsrStartOptions) -> Result<String> {
        let existing = self.sessions.write().remove(connection_id);
        if let Some(existing) = existing {
            let _ = existing.stream.close().await;
        } else if self.sessions.read().len() >= self.max_sessions {
            warn!(connection_id, max_sessions = self.max_sessions, "ASR session pool at capacity, rejecting startTranscription");
            return Err(vts_gateway_core::Error::ResourceExhausted(format!(
                "maximum concurrent ASR sessions ({}) reached",
                self.max_sessions
            )));
        }

        let stream: Arc<dyn AsrStream> = Arc::from(self.backend.start(connection_id, options).await?);
        let session = TranscriptionSession::start(connection_id, options);
        let session_id = session.session_id.clone();

        let entry = Arc::new(PoolEntry {
            session: SyncMutex::new(session),
            stream: stream.clone(),
        });
        self.sessions.write().insert(connection_id.to_string(), entry.clone());

        self.spawn_reader(connection_id.to_string(), stream, entry);
        info!(connection_id, session_id, "started ASR session");
        Ok(session_id)
    }

    /// Whether a live session currently exists for `connectionId`. Lets
    /// callers (the Router) query pool state explicitly instead of
    /// reaching into its internals (§9 "implicit session coupling"
    /// redesign flag).
    pub fn has_session(&self, connection_id: &str) -> bool {
        self.sessions.read().contains_key(connection_id)
    }

    /// Append audio bytes, implicitly starting a default session if none
    /// exists. Feeds while the session is stopping or absent are dropped.
    pub async fn feed(&self, connection_id: &str, audio_chunk: &[u8]) -> Result<()> {
        let entry = {
            let sessions = self.sessions.read();
            sessions.get(connection_id).cloned()
        };

        let entry = match entry {
            Some(entry) => entry,
            None => {
                self.start_session(connection_id, &AsrStartOptions::default()).await?;
                match self.sessions.read().get(connection_id).cloned() {
                    Some(entry) => entry,
                    None => return Ok(()),
                }
            }
        };

        {
            let mut session = entry.session.lock();
            if session.status != SessionStatus::Active {
                debug!(connection_id, "dropping feed for non-active session");
                return Ok(());
            }
            session.record_chunk();
        }

        self.audio_dump.dump(connection_id, audio_chunk).await;
        entry.stream.feed(audio_chunk).await
    }

    /// Close the audio sink for `connectionId`. Idempotent: stopping an
    /// absent session is a no-op.
    pub async fn stop_session(&self, connection_id: &str) -> Result<()> {
        let entry = self.sessions.read().get(connection_id).cloned();
        if let Some(entry) = entry {
            entry.session.lock().stop();
            entry.stream.close().await?;
        }
        Ok(())
    }

    /// Stop every live session, used on shutdown.
    pub async fn stop_all(&self) {
        let entries: Vec<_> = self.sessions.read().values().cloned().collect();
        for entry in entries {
            entry.session.lock().stop();
            if let Err(err) = entry.stream.close().await {
                warn!(error = %err, "error closing ASR stream during shutdown");
            }
        }
    }

    /// Drains transcript events until end-of-stream or error, then removes
    /// the pool entry — but only if it is still the same entry this reader
    /// was spawned for (§4.2 state machine: `CLOSING -> NONE` when the
    /// reader exits). A `start_session` restart that has already replaced
    /// the entry for this connection must not have its new entry evicted
    /// by the old reader winding down.
    fn spawn_reader(&self, connection_id: String, stream: Arc<dyn AsrStream>, entry: Arc<PoolEntry>) {
        let sink = self.sink.clone();
        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            loop {
                match stream.next_event().await {
                    Ok(Some(event)) => {
                        sink.on_transcript(&connection_id, event).await;
                    }
                    Ok(None) => {
                        debug!(connection_id = %connection_id, "ASR reader reached end of stream");
                        break;
                    }
                    Err(err) => {
                        error!(connection_id = %connection_id, error = %err, "ASR reader error");
                        break;
                    }
                }
            }

            let mut sessions = sessions.write();
            if let Some(current) = sessions.get(&connection_id) {
                if Arc::ptr_eq(current, &entry) {
                    sessions.remove(&connection_id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedAsrBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingSink {
        count: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl TranscriptSink for CountingSink {
        async fn on_transcript(&self, _connection_id: &str, _event: TranscriptEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn feed_without_start_session_auto_starts_with_defaults() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let pool = AsrSessionPool::new(Arc::new(SimulatedAsrBackend::new()), sink.clone());

        pool.feed("conn-1", &vec![0u8; 3_200]).await.unwrap();
        sink.notify.notified().await;
        assert!(sink.count.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn stop_session_is_idempotent() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let pool = AsrSessionPool::new(Arc::new(SimulatedAsrBackend::new()), sink);
        pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();
        pool.stop_session("conn-1").await.unwrap();
        pool.stop_session("conn-1").await.unwrap();
    }

    #[tokio::test]
    async fn start_session_beyond_max_is_rejected_without_disconnecting() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let pool = AsrSessionPool::with_max_sessions(Arc::new(SimulatedAsrBackend::new()), sink, 1);
        pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();

        let err = pool.start_session("conn-2", &AsrStartOptions::default()).await.unwrap_err();
        assert!(matches!(err, vts_gateway_core::Error::ResourceExhausted(_)));

        // Restarting the already-admitted connection is still allowed;
        // the bound only blocks net-new sessions.
        pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();
    }

    #[tokio::test]
    async fn restarting_a_session_replaces_the_entry() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let pool = AsrSessionPool::new(Arc::new(SimulatedAsrBackend::new()), sink);
        let first = pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();
        let second = pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn reader_removes_entry_once_stream_ends() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let pool = AsrSessionPool::new(Arc::new(SimulatedAsrBackend::new()), sink);
        pool.start_session("conn-1", &AsrStartOptions::default()).await.unwrap();
        assert!(pool.has_session("conn-1"));

        pool.stop_session("conn-1").await.unwrap();

        // The reader removes the entry asynchronously once it observes
        // end-of-stream; poll briefly rather than assuming a fixed delay.
        for _ in 0..50 {
            if !pool.has_session("conn-1") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!pool.has_session("conn-1"));
    }

    struct RecordingDumpSink {
        calls: SyncMutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl AudioDumpSink for RecordingDumpSink {
        async fn dump(&self, connection_id: &str, chunk: &[u8]) {
            self.calls.lock().push((connection_id.to_string(), chunk.len()));
        }
    }

    #[tokio::test]
    async fn feed_forwards_chunks_to_the_audio_dump_sink_when_configured() {
        let sink = Arc::new(CountingSink {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let dump = Arc::new(RecordingDumpSink { calls: SyncMutex::new(Vec::new()) });
        let pool = AsrSessionPool::with_audio_dump(Arc::new(SimulatedAsrBackend::new()), sink, 20, dump.clone());

        pool.feed("conn-1", &[0u8; 10]).await.unwrap();
        assert_eq!(dump.calls.lock().as_slice(), &[("conn-1".to_string(), 10)]);
    }
}
