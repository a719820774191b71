//! Transcription session state (§3 `TranscriptionSession`)
//!
//! Owned exclusively, in memory, by the ASR Session Pool. The
//! `connectionId` back-reference is weak: lookup only, no lifetime
//! coupling (§3 Ownership and lifetimes).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LANGUAGE_CODE: &str = "ja-JP";
pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 16_000;
pub const DEFAULT_MEDIA_ENCODING: &str = "pcm";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Stopped,
}

/// Parameters a caller may supply to `startSession`; unset fields fall
/// back to the §4.2/§6 defaults.
#[derive(Debug, Clone, Default)]
pub struct AsrStartOptions {
    pub language_code: Option<String>,
    pub sample_rate_hz: Option<u32>,
    pub media_encoding: Option<String>,
    pub vocabulary_name: Option<String>,
}

impl AsrStartOptions {
    pub fn language_code(&self) -> &str {
        self.language_code.as_deref().unwrap_or(DEFAULT_LANGUAGE_CODE)
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz.unwrap_or(DEFAULT_SAMPLE_RATE_HZ)
    }

    pub fn media_encoding(&self) -> &str {
        self.media_encoding.as_deref().unwrap_or(DEFAULT_MEDIA_ENCODING)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSession {
    pub session_id: String,
    pub connection_id: String,
    pub status: SessionStatus,
    pub language_code: String,
    pub vocabulary_name: Option<String>,
    pub sample_rate_hz: u32,
    pub media_encoding: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub chunks_processed: u64,
}

impl TranscriptionSession {
    /// Derive a session id from the connection id and start timestamp
    /// (§3: "derived from connectionId + start timestamp").
    pub fn derive_id(connection_id: &str, started_at: DateTime<Utc>) -> String {
        format!("{connection_id}-{}", started_at.timestamp_millis())
    }

    pub fn start(connection_id: impl Into<String>, options: &AsrStartOptions) -> Self {
        let connection_id = connection_id.into();
        let started_at = Utc::now();
        Self {
            session_id: Self::derive_id(&connection_id, started_at),
            connection_id,
            status: SessionStatus::Active,
            language_code: options.language_code().to_string(),
            vocabulary_name: options.vocabulary_name.clone(),
            sample_rate_hz: options.sample_rate_hz(),
            media_encoding: options.media_encoding().to_string(),
            started_at,
            stopped_at: None,
            chunks_processed: 0,
        }
    }

    pub fn record_chunk(&mut self) {
        self.chunks_processed += 1;
    }

    pub fn stop(&mut self) {
        if self.status == SessionStatus::Active {
            self.status = SessionStatus::Stopped;
            self.stopped_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_defaults_to_ja_jp_pcm_16k() {
        let session = TranscriptionSession::start("conn-1", &AsrStartOptions::default());
        assert_eq!(session.language_code, DEFAULT_LANGUAGE_CODE);
        assert_eq!(session.sample_rate_hz, DEFAULT_SAMPLE_RATE_HZ);
        assert_eq!(session.media_encoding, DEFAULT_MEDIA_ENCODING);
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.chunks_processed, 0);
    }

    #[test]
    fn stop_is_idempotent_on_status() {
        let mut session = TranscriptionSession::start("conn-1", &AsrStartOptions::default());
        session.stop();
        let first_stop = session.stopped_at;
        session.stop();
        assert_eq!(session.status, SessionStatus::Stopped);
        assert_eq!(session.stopped_at, first_stop);
    }

    #[test]
    fn record_chunk_increments_counter() {
        let mut session = TranscriptionSession::start("conn-1", &AsrStartOptions::default());
        session.record_chunk();
        session.record_chunk();
        assert_eq!(session.chunks_processed, 2);
    }
}
