//! Self-contained simulated streaming-ASR backend (§4.2 ADDED)
//!
//! No vendor wire format is implemented here — the spec treats it as
//! out of scope. This backend performs lightweight heuristic
//! segmentation of the fed PCM byte stream into partial/final
//! `TranscriptEvent`s, sufficient for contract tests and local
//! operation without a live upstream dependency.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use vts_gateway_core::{AsrStartOptions, Result, TranscriptEvent};

use crate::backend::{AsrStream, StreamingAsrBackend};

/// Bytes of fed audio treated as one "segment" worth of speech.
const SEGMENT_BYTES: usize = 3_200; // 100ms @ 16kHz mono 16-bit PCM

/// Placeholder utterance text emitted per segment, since there is no
/// real vendor decode to draw words from.
const SEGMENT_TOKEN: &str = "音声セグメント";

pub struct SimulatedAsrBackend;

impl SimulatedAsrBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SimulatedAsrBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StreamingAsrBackend for SimulatedAsrBackend {
    async fn start(&self, connection_id: &str, options: &AsrStartOptions) -> Result<Box<dyn AsrStream>> {
        Ok(Box::new(SimulatedAsrStream::new(connection_id, options)))
    }
}

struct SegmentState {
    buffered_bytes: usize,
    segments_emitted: u32,
    result_id: String,
}

pub struct SimulatedAsrStream {
    sender: Mutex<Option<mpsc::UnboundedSender<TranscriptEvent>>>,
    receiver: Mutex<mpsc::UnboundedReceiver<TranscriptEvent>>,
    state: Mutex<SegmentState>,
}

impl SimulatedAsrStream {
    fn new(connection_id: &str, _options: &AsrStartOptions) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(rx),
            state: Mutex::new(SegmentState {
                buffered_bytes: 0,
                segments_emitted: 0,
                result_id: connection_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl AsrStream for SimulatedAsrStream {
    async fn feed(&self, chunk: &[u8]) -> Result<()> {
        let sender_guard = self.sender.lock().await;
        let Some(sender) = sender_guard.as_ref() else {
            return Ok(());
        };

        let mut state = self.state.lock().await;
        state.buffered_bytes += chunk.len();

        // A partial update for every feed, so the client sees continuous
        // progress while a segment accumulates.
        let partial_text = format!("{}{}", SEGMENT_TOKEN.repeat(state.segments_emitted as usize + 1), "…");
        let partial = TranscriptEvent::new(partial_text, 0.9, true, state.result_id.clone());
        let _ = sender.send(partial);

        if state.buffered_bytes >= SEGMENT_BYTES {
            state.buffered_bytes -= SEGMENT_BYTES;
            state.segments_emitted += 1;
            let final_text = SEGMENT_TOKEN.repeat(state.segments_emitted as usize);
            let result_id = format!("{}-{}", state.result_id, state.segments_emitted);
            let final_event = TranscriptEvent::new(final_text, TranscriptEvent::aggregate_confidence(&[0.85, 0.9, 0.95]), false, result_id);
            let _ = sender.send(final_event);
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut sender_guard = self.sender.lock().await;
        if let Some(sender) = sender_guard.take() {
            let state = self.state.lock().await;
            if state.buffered_bytes > 0 {
                let final_text = SEGMENT_TOKEN.repeat(state.segments_emitted as usize + 1);
                let result_id = format!("{}-final", state.result_id);
                let final_event = TranscriptEvent::new(final_text, 0.9, false, result_id);
                let _ = sender.send(final_event);
            }
            // dropping `sender` here closes the channel, letting
            // `next_event` observe end-of-stream after the queue drains.
        }
        Ok(())
    }

    async fn next_event(&self) -> Result<Option<TranscriptEvent>> {
        let mut receiver = self.receiver.lock().await;
        Ok(receiver.recv().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn feeding_enough_bytes_emits_a_final_segment() {
        let backend = SimulatedAsrBackend::new();
        let stream = backend.start("conn-1", &AsrStartOptions::default()).await.unwrap();

        stream.feed(&vec![0u8; SEGMENT_BYTES]).await.unwrap();
        let mut saw_final = false;
        for _ in 0..2 {
            if let Some(event) = stream.next_event().await.unwrap() {
                if !event.is_partial {
                    saw_final = true;
                    break;
                }
            }
        }
        assert!(saw_final);
    }

    #[tokio::test]
    async fn close_drains_remaining_events_then_ends_stream() {
        let backend = SimulatedAsrBackend::new();
        let stream = backend.start("conn-1", &AsrStartOptions::default()).await.unwrap();
        stream.feed(&vec![0u8; 10]).await.unwrap();
        stream.close().await.unwrap();

        let mut events = Vec::new();
        while let Some(event) = stream.next_event().await.unwrap() {
            events.push(event);
        }
        assert!(!events.is_empty());
    }
}
