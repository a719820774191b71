//! The append-only conversation log (§3 `ConversationItem`, §4.5, §6)
//!
//! Items are keyed by the composite `(conversationId, itemTimestamp)` pair.
//! `itemTimestamp` encodes a sort-key prefix (`MSG#`, `TRANS#`, `AI#`,
//! `SESSION#`) followed by an ISO-8601 timestamp; the prefix is the primary
//! sort discriminator, the timestamp only breaks ties within a kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::AnalysisResult;
use crate::session::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Message,
    Transcription,
    AiResponse,
    TranscriptionSession,
}

impl ItemType {
    /// The sort-key prefix for this item kind, per the §6 contract that
    /// must be preserved across implementations.
    pub fn sort_prefix(&self) -> &'static str {
        match self {
            ItemType::Message => "MSG",
            ItemType::Transcription => "TRANS",
            ItemType::AiResponse => "AI",
            ItemType::TranscriptionSession => "SESSION",
        }
    }
}

/// Item-specific payload, one variant per `ItemType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "itemType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemPayload {
    Message {
        message_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_type: Option<String>,
    },
    Transcription {
        text: String,
        confidence: f32,
    },
    AiResponse {
        analysis: AnalysisResult,
        source_transcript: String,
    },
    TranscriptionSession {
        session_id: String,
        status: SessionStatus,
        language_code: String,
        sample_rate_hz: u32,
    },
}

impl ItemPayload {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemPayload::Message { .. } => ItemType::Message,
            ItemPayload::Transcription { .. } => ItemType::Transcription,
            ItemPayload::AiResponse { .. } => ItemType::AiResponse,
            ItemPayload::TranscriptionSession { .. } => ItemType::TranscriptionSession,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationItem {
    pub conversation_id: String,
    pub item_timestamp: String,
    pub connection_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

impl ConversationItem {
    /// `"CONN-<connectionId>"`, the conversation id used by message,
    /// transcription, and AI-response items (§3).
    pub fn connection_scoped_id(connection_id: &str) -> String {
        format!("CONN-{connection_id}")
    }

    /// Session-scoped conversation id for `TRANSCRIPTION_SESSION` markers.
    /// Resolved in DESIGN.md: pinned to the literal session id, distinct
    /// from the `CONN-` prefix used by the other three item kinds.
    pub fn session_scoped_id(session_id: &str) -> String {
        format!("SESSION-{session_id}")
    }

    /// Build the `itemTimestamp` sort key: `<PREFIX>#<ISO-8601>`.
    pub fn make_item_timestamp(item_type: ItemType, at: DateTime<Utc>) -> String {
        format!("{}#{}", item_type.sort_prefix(), at.to_rfc3339())
    }

    pub fn message(connection_id: impl Into<String>, message_id: impl Into<String>, content: impl Into<String>, message_type: Option<String>) -> Self {
        let connection_id = connection_id.into();
        let now = Utc::now();
        Self {
            conversation_id: Self::connection_scoped_id(&connection_id),
            item_timestamp: Self::make_item_timestamp(ItemType::Message, now),
            connection_id,
            created_at: now,
            payload: ItemPayload::Message {
                message_id: message_id.into(),
                content: content.into(),
                message_type,
            },
        }
    }

    pub fn transcription(connection_id: impl Into<String>, text: impl Into<String>, confidence: f32) -> Self {
        let connection_id = connection_id.into();
        let now = Utc::now();
        Self {
            conversation_id: Self::connection_scoped_id(&connection_id),
            item_timestamp: Self::make_item_timestamp(ItemType::Transcription, now),
            connection_id,
            created_at: now,
            payload: ItemPayload::Transcription {
                text: text.into(),
                confidence,
            },
        }
    }

    pub fn ai_response(connection_id: impl Into<String>, analysis: AnalysisResult, source_transcript: impl Into<String>) -> Self {
        let connection_id = connection_id.into();
        let now = Utc::now();
        Self {
            conversation_id: Self::connection_scoped_id(&connection_id),
            item_timestamp: Self::make_item_timestamp(ItemType::AiResponse, now),
            connection_id,
            created_at: now,
            payload: ItemPayload::AiResponse {
                analysis,
                source_transcript: source_transcript.into(),
            },
        }
    }

    pub fn session_marker(
        connection_id: impl Into<String>,
        session_id: impl Into<String>,
        status: SessionStatus,
        language_code: impl Into<String>,
        sample_rate_hz: u32,
    ) -> Self {
        let connection_id = connection_id.into();
        let session_id = session_id.into();
        let now = Utc::now();
        Self {
            conversation_id: Self::session_scoped_id(&session_id),
            item_timestamp: Self::make_item_timestamp(ItemType::TranscriptionSession, now),
            connection_id,
            created_at: now,
            payload: ItemPayload::TranscriptionSession {
                session_id,
                status,
                language_code: language_code.into(),
                sample_rate_hz,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_scoped_id_has_conn_prefix() {
        assert_eq!(ConversationItem::connection_scoped_id("abc"), "CONN-abc");
    }

    #[test]
    fn session_scoped_id_differs_from_connection_scoped_id() {
        assert_ne!(
            ConversationItem::session_scoped_id("sess-1"),
            ConversationItem::connection_scoped_id("sess-1")
        );
    }

    #[test]
    fn item_timestamp_prefix_matches_kind() {
        let item = ConversationItem::message("conn-1", "m1", "hi", None);
        assert!(item.item_timestamp.starts_with("MSG#"));

        let item = ConversationItem::transcription("conn-1", "hi", 0.9);
        assert!(item.item_timestamp.starts_with("TRANS#"));
    }

    #[test]
    fn message_item_uses_connection_scoped_conversation_id() {
        let item = ConversationItem::message("conn-1", "m1", "hi", None);
        assert_eq!(item.conversation_id, "CONN-conn-1");
    }

    #[test]
    fn session_marker_uses_session_scoped_conversation_id() {
        let item = ConversationItem::session_marker("conn-1", "sess-1", SessionStatus::Active, "ja-JP", 16000);
        assert_eq!(item.conversation_id, "SESSION-sess-1");
        assert!(item.item_timestamp.starts_with("SESSION#"));
    }
}
