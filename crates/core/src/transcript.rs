//! Transient ASR output (§3 `TranscriptEvent`)
//!
//! Produced by the ASR Session Pool, consumed once by the Message Router,
//! then discarded. Never persisted in this shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fallback confidence applied when the upstream alternative carries no
/// per-word confidences (§4.2).
pub const DEFAULT_CONFIDENCE: f32 = 0.9;

/// Minimum final-transcript length (exclusive) that triggers persistence
/// and LLM analysis (§4.2, §8 boundary behaviors).
pub const MIN_FINAL_TEXT_LEN: usize = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub confidence: f32,
    pub is_partial: bool,
    pub timestamp: DateTime<Utc>,
    pub result_id: String,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

impl TranscriptEvent {
    pub fn new(
        text: impl Into<String>,
        confidence: f32,
        is_partial: bool,
        result_id: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
            is_partial,
            timestamp: Utc::now(),
            result_id: result_id.into(),
            start_time: None,
            end_time: None,
        }
    }

    /// Whether this event is a final result eligible for downstream
    /// processing — §4.2: `isPartial=false` and `len(text) > 2`.
    pub fn triggers_downstream(&self) -> bool {
        !self.is_partial && self.text.trim().chars().count() > MIN_FINAL_TEXT_LEN
    }

    /// Arithmetic mean of per-word confidences, or `DEFAULT_CONFIDENCE`
    /// when the upstream alternative carries none (§4.2).
    pub fn aggregate_confidence(word_confidences: &[f32]) -> f32 {
        if word_confidences.is_empty() {
            return DEFAULT_CONFIDENCE;
        }
        let sum: f32 = word_confidences.iter().sum();
        (sum / word_confidences.len() as f32).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_confidence_of_words() {
        let c = TranscriptEvent::aggregate_confidence(&[0.8, 0.9, 1.0]);
        assert!((c - 0.9).abs() < 1e-6);
    }

    #[test]
    fn default_confidence_when_no_words() {
        assert_eq!(TranscriptEvent::aggregate_confidence(&[]), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn short_final_text_does_not_trigger_downstream() {
        let event = TranscriptEvent::new("ok", 0.9, false, "r1");
        assert!(!event.triggers_downstream());
    }

    #[test]
    fn partial_never_triggers_downstream() {
        let event = TranscriptEvent::new("博多港VTS、入港許可を要請", 0.9, true, "r1");
        assert!(!event.triggers_downstream());
    }

    #[test]
    fn long_final_triggers_downstream() {
        let event = TranscriptEvent::new("博多港VTS、入港許可を要請", 0.9, false, "r1");
        assert!(event.triggers_downstream());
    }
}
