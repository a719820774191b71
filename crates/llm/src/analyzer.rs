//! LLM-backed risk analyzer (§4.3)

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::warn;
use vts_gateway_core::{AnalysisResult, Classification, Error, Result};

use crate::backend::AnalyzerBackend;
use crate::prompt::{self, AnalysisContext};

/// Default bound on concurrent `analyze` calls (§4.3: "default 10").
pub const DEFAULT_MAX_CONCURRENT: usize = 10;

/// Bypassed straight to the upstream, before any LLM call (§4.3).
const EMERGENCY_FASTPATH_TOKENS: &[&str] = &["MAYDAY", "メーデー", "PAN-PAN", "パンパン", "SECURITE", "セキュリテ"];

/// Used only on LLM failure, intentionally distinct from the fast-path
/// list above — kept separate per the spec's open-question resolution.
const FALLBACK_RED_KEYWORDS: &[&str] = &["MAYDAY", "メーデー", "火災", "衝突", "浸水", "緊急", "SOS"];
const FALLBACK_AMBER_KEYWORDS: &[&str] = &["強風", "視界", "操船困難", "注意"];

const EMERGENCY_ACK: &str = "緊急事態を確認しました。直ちに対応します。";
const RED_FALLBACK_ACK: &str = "緊急の可能性がある通信を受信しました。至急確認してください。";
const AMBER_FALLBACK_ACK: &str = "注意が必要な状況が報告されました。状況を確認してください。";
const GREEN_FALLBACK_ACK: &str = "了解しました。";
const UPSTREAM_UNAVAILABLE_ACK: &str = "ただいまAIサービスが一時的にご利用いただけません。";

const MAX_TRANSCRIPT_LEN: usize = 1000;

pub struct Analyzer {
    backend: Arc<dyn AnalyzerBackend>,
    semaphore: Arc<Semaphore>,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn AnalyzerBackend>, max_concurrent: usize) -> Self {
        Self {
            backend,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Truncate to 1000 chars, strip ASCII control characters except
    /// tab/newline, remove angle brackets; reject empty results (§4.3).
    pub fn sanitize_transcript(raw: &str) -> Result<String> {
        let cleaned: String = raw
            .chars()
            .take(MAX_TRANSCRIPT_LEN)
            .filter(|c| !c.is_control() || *c == '\t' || *c == '\n')
            .filter(|c| *c != '<' && *c != '>')
            .collect();
        let cleaned = cleaned.trim().to_string();

        if cleaned.is_empty() {
            return Err(Error::Validation("transcript empty after sanitization".to_string()));
        }
        Ok(cleaned)
    }

    fn detect_emergency_fastpath(text: &str) -> bool {
        let upper = text.to_uppercase();
        EMERGENCY_FASTPATH_TOKENS.iter().any(|token| upper.contains(&token.to_uppercase()))
    }

    pub async fn analyze(&self, transcript: &str, context: AnalysisContext) -> Result<AnalysisResult> {
        let cleaned = Self::sanitize_transcript(transcript)?;

        if Self::detect_emergency_fastpath(&cleaned) {
            return Ok(AnalysisResult {
                classification: Classification::Red,
                suggested_response: EMERGENCY_ACK.to_string(),
                confidence: 1.0,
                risk_factors: vec!["emergency_fastpath_token".to_string()],
                recommended_actions: vec![],
                timestamp: Utc::now(),
                is_emergency: true,
                error: None,
            });
        }

        let _permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Error::Internal(format!("analyzer semaphore closed: {e}")))?;

        let system = prompt::system_prompt();
        let user = prompt::user_prompt(&cleaned, &context);

        let result = match self.backend.complete(&system, &user).await {
            Ok(raw) => Self::parse_output(&raw).unwrap_or_else(|| Self::fallback(&cleaned, None)),
            Err(err) => {
                warn!(error = %err, "analyzer upstream call failed, applying fallback heuristic");
                Self::fallback(&cleaned, Some(err.to_string()))
            }
        };

        Ok(result)
    }

    /// Locate the first balanced `{...}` substring and coerce every field
    /// per §4.3 steps 1-7 independently of the others: a wrong-typed
    /// `riskFactors`/`recommendedActions` (or any other field) must not
    /// discard an otherwise-valid `classification`/`suggestedResponse`, so
    /// this parses into a loose `Value` rather than a strict struct.
    /// Returns `None` only if no JSON object can be located or parsed at
    /// all — the caller then falls back to the keyword heuristic.
    fn parse_output(raw: &str) -> Option<AnalysisResult> {
        let candidate = extract_first_balanced_object(raw)?;
        let value: serde_json::Value = serde_json::from_str(&candidate).ok()?;

        let classification = Classification::coerce(value.get("classification").and_then(|v| v.as_str()));

        // A candidate like `"{}"` is non-empty pre-sanitization but
        // collapses to "" once JSON artifacts are stripped; fall back to
        // the placeholder either way so §4.3 step 4's non-empty guarantee
        // always holds.
        let suggested_response = match value.get("suggestedResponse").and_then(|v| v.as_str()) {
            Some(text) if !text.trim().is_empty() => {
                let sanitized = AnalysisResult::sanitize_response(text);
                if sanitized.trim().is_empty() {
                    AnalysisResult::sanitize_response("ただいま処理中です。")
                } else {
                    sanitized
                }
            }
            _ => AnalysisResult::sanitize_response("ただいま処理中です。"),
        };

        let confidence = value
            .get("confidence")
            .and_then(|v| v.as_f64())
            .map(|f| f as f32)
            .unwrap_or(0.5)
            .clamp(0.0, 1.0);

        Some(AnalysisResult {
            classification,
            suggested_response,
            confidence,
            risk_factors: coerce_string_list(value.get("riskFactors")),
            recommended_actions: coerce_string_list(value.get("recommendedActions")),
            timestamp: Utc::now(),
            is_emergency: false,
            error: None,
        })
    }

    /// Keyword heuristic applied to the original transcript on upstream
    /// failure or unparseable reply (§4.3 Fallback path).
    fn fallback(transcript: &str, upstream_error: Option<String>) -> AnalysisResult {
        let (classification, suggested_response, confidence) = if contains_any(transcript, FALLBACK_RED_KEYWORDS) {
            (Classification::Red, RED_FALLBACK_ACK, 0.6)
        } else if contains_any(transcript, FALLBACK_AMBER_KEYWORDS) {
            (Classification::Amber, AMBER_FALLBACK_ACK, 0.55)
        } else {
            (Classification::Green, GREEN_FALLBACK_ACK, 0.5)
        };

        let suggested_response = if upstream_error.is_some() {
            UPSTREAM_UNAVAILABLE_ACK.to_string()
        } else {
            suggested_response.to_string()
        };

        AnalysisResult {
            classification,
            suggested_response,
            confidence,
            risk_factors: vec![],
            recommended_actions: vec![],
            timestamp: Utc::now(),
            is_emergency: false,
            error: upstream_error,
        }
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    let upper = text.to_uppercase();
    keywords.iter().any(|kw| upper.contains(&kw.to_uppercase()))
}

/// Coerce a JSON value to a list of strings per §4.3 step 6: absent or
/// wrong-typed yields an empty list; a present array keeps only its
/// string elements rather than rejecting the whole field.
fn coerce_string_list(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(|item| item.as_str().map(str::to_string)).collect(),
        _ => vec![],
    }
}

/// Scan for the first top-level balanced `{...}` substring, tolerating
/// leading/trailing prose around the JSON object.
fn extract_first_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    for (offset, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_truncates_to_max_length() {
        let long = "あ".repeat(2000);
        let cleaned = Analyzer::sanitize_transcript(&long).unwrap();
        assert_eq!(cleaned.chars().count(), MAX_TRANSCRIPT_LEN);
    }

    #[test]
    fn sanitize_strips_angle_brackets_and_control_chars() {
        let cleaned = Analyzer::sanitize_transcript("<script>alert\x07()</script>").unwrap();
        assert!(!cleaned.contains(['<', '>']));
        assert!(!cleaned.contains('\u{7}'));
    }

    #[test]
    fn sanitize_rejects_all_whitespace_input() {
        assert!(Analyzer::sanitize_transcript("   \t  ").is_err());
    }

    #[test]
    fn emergency_fastpath_detects_case_insensitive_mayday() {
        assert!(Analyzer::detect_emergency_fastpath("mayday mayday"));
        assert!(Analyzer::detect_emergency_fastpath("メーデー発生"));
        assert!(!Analyzer::detect_emergency_fastpath("入港許可を要請"));
    }

    #[test]
    fn parse_output_extracts_balanced_object_from_surrounding_prose() {
        let raw = r#"Here is the result: {"classification": "red", "suggestedResponse": "了解", "confidence": 0.95} Thanks."#;
        let result = Analyzer::parse_output(raw).unwrap();
        assert_eq!(result.classification, Classification::Red);
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn parse_output_falls_back_when_response_is_empty_after_sanitization() {
        let raw = r#"{"classification": "green", "suggestedResponse": "{}"}"#;
        let result = Analyzer::parse_output(raw).unwrap();
        assert!(!result.suggested_response.is_empty());
        assert!(result.has_clean_response());
    }

    #[test]
    fn parse_output_keeps_valid_fields_when_risk_factors_is_wrong_type() {
        let raw = r#"{"classification":"red","suggestedResponse":"了解","confidence":0.95,"riskFactors":"none"}"#;
        let result = Analyzer::parse_output(raw).unwrap();
        assert_eq!(result.classification, Classification::Red);
        assert_eq!(result.confidence, 0.95);
        assert!(result.risk_factors.is_empty());
    }

    #[test]
    fn parse_output_keeps_only_string_elements_of_recommended_actions() {
        let raw = r#"{"classification":"amber","recommendedActions":["reduce speed", 42, "contact harbor"]}"#;
        let result = Analyzer::parse_output(raw).unwrap();
        assert_eq!(result.recommended_actions, vec!["reduce speed".to_string(), "contact harbor".to_string()]);
    }

    #[test]
    fn parse_output_defaults_missing_classification_to_amber() {
        let raw = r#"{"suggestedResponse": "ok"}"#;
        let result = Analyzer::parse_output(raw).unwrap();
        assert_eq!(result.classification, Classification::Amber);
    }

    #[test]
    fn fallback_detects_red_keyword() {
        let result = Analyzer::fallback("火災が発生しています", Some("timeout".to_string()));
        assert_eq!(result.classification, Classification::Red);
        assert_eq!(result.error.as_deref(), Some("timeout"));
    }

    #[test]
    fn fallback_detects_amber_keyword() {
        let result = Analyzer::fallback("強風のため注意してください", None);
        assert_eq!(result.classification, Classification::Amber);
    }

    #[test]
    fn fallback_defaults_to_green() {
        let result = Analyzer::fallback("入港許可を要請します", None);
        assert_eq!(result.classification, Classification::Green);
    }
}
