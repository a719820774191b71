//! LLM analysis results (§3 `AnalysisResult`, §4.3)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk classification tag. Always one of these three literals on the
/// wire — never a raw upstream string (§4.3 step 3, §8 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Classification {
    Green,
    Amber,
    Red,
}

impl Classification {
    /// Coerce an arbitrary upstream literal into the allowed set,
    /// defaulting to `AMBER` per §4.3 step 3 / §8 boundary behaviors.
    pub fn coerce(raw: Option<&str>) -> Self {
        match raw.map(str::to_uppercase).as_deref() {
            Some("GREEN") => Classification::Green,
            Some("RED") => Classification::Red,
            Some("AMBER") => Classification::Amber,
            _ => Classification::Amber,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Green => "GREEN",
            Classification::Amber => "AMBER",
            Classification::Red => "RED",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of one `Analyzer::analyze` call. Every instance must already
/// satisfy the §3/§8 invariants by the time it is constructed — callers
/// never need to re-validate one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub classification: Classification,
    pub suggested_response: String,
    pub confidence: f32,
    #[serde(default)]
    pub risk_factors: Vec<String>,
    #[serde(default)]
    pub recommended_actions: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_emergency: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Characters that must never survive into a user-facing `suggestedResponse`
/// (§4.3 step 4, §8 invariants).
const FORBIDDEN_CHARS: [char; 5] = ['{', '}', '[', ']', '"'];

impl AnalysisResult {
    /// Strip raw-JSON artifacts from a candidate response string and
    /// replace commas with the full-width comma, per §4.3 step 4.
    pub fn sanitize_response(raw: &str) -> String {
        raw.chars()
            .filter(|c| !FORBIDDEN_CHARS.contains(c))
            .collect::<String>()
            .replace(',', "、")
    }

    /// True iff `suggested_response` is non-empty and free of forbidden
    /// characters — the §8 invariant on `aiResponse.payload`.
    pub fn has_clean_response(&self) -> bool {
        !self.suggested_response.is_empty()
            && !self.suggested_response.chars().any(|c| FORBIDDEN_CHARS.contains(&c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_unknown_literal_to_amber() {
        assert_eq!(Classification::coerce(Some("urgent")), Classification::Amber);
        assert_eq!(Classification::coerce(None), Classification::Amber);
    }

    #[test]
    fn coerces_known_literals_case_insensitively() {
        assert_eq!(Classification::coerce(Some("red")), Classification::Red);
        assert_eq!(Classification::coerce(Some("Green")), Classification::Green);
    }

    #[test]
    fn sanitize_strips_json_artifacts_and_commas() {
        let dirty = r#"{"text": "a, b"}"#;
        let clean = AnalysisResult::sanitize_response(dirty);
        assert!(!clean.contains(['{', '}', '"']));
        assert!(clean.contains('、'));
    }
}
