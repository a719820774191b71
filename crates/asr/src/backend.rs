//! Abstract upstream streaming-ASR interface (§4.2, §6)
//!
//! The wire format of the real vendor service is explicitly out of
//! scope; this trait is the seam a real SDK adapter would implement.
//! Shaped after `core::traits::speech::SpeechToText` in the teacher
//! codebase, generalized to an explicit start/feed/stop lifecycle.

use async_trait::async_trait;
use vts_gateway_core::{AsrStartOptions, Result, TranscriptEvent};

/// Fallback session cap when a pool is built via `AsrSessionPool::new`
/// without an explicit config value (§6 `asr.maxConcurrentSessions`).
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 20;

/// One live upstream streaming session.
#[async_trait]
pub trait AsrStream: Send + Sync {
    /// Append raw audio bytes to the upstream sink.
    async fn feed(&self, chunk: &[u8]) -> Result<()>;

    /// Close the audio sink. The paired event stream observes
    /// end-of-stream and terminates after draining remaining events.
    async fn close(&self) -> Result<()>;

    /// Pull the next transcript event, or `None` at end-of-stream.
    async fn next_event(&self) -> Result<Option<TranscriptEvent>>;
}

/// Upstream backend factory: opens one `AsrStream` per ASR session.
#[async_trait]
pub trait StreamingAsrBackend: Send + Sync {
    async fn start(&self, connection_id: &str, options: &AsrStartOptions) -> Result<Box<dyn AsrStream>>;
}
