//! Prompt construction for the analyzer (§4.3)

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// Optional context supplied alongside a transcript to `Analyzer::analyze`.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub location: Option<String>,
    pub vessel_info: Option<String>,
    pub connection_id: String,
}

const PORT_DOMAIN: &str = "a maritime Vessel Traffic Service (VTS) operating Hakata Port";

/// Fixes the assistant's role, enumerates the three classification tags
/// and their criteria, and asks for a strict JSON reply (§4.3).
pub fn system_prompt() -> String {
    format!(
        "You are the AI assistant for {PORT_DOMAIN}. You receive transcribed radio \
         communications from vessels and harbor staff. Classify every transmission into \
         exactly one of three risk tags:\n\
         - GREEN: routine traffic, no safety concern.\n\
         - AMBER: caution warranted — reduced visibility, difficult maneuvering, minor hazard.\n\
         - RED: emergency — collision, fire, flooding, distress call, or imminent danger to life.\n\
         Reply with strict JSON only, no surrounding prose, matching this shape: \
         {{\"classification\": \"GREEN|AMBER|RED\", \"suggestedResponse\": string, \
         \"confidence\": number between 0 and 1, \"riskFactors\": [string], \
         \"recommendedActions\": [string]}}."
    )
}

/// Composes the user prompt from the cleaned transcript and optional context.
pub fn user_prompt(cleaned_transcript: &str, context: &AnalysisContext) -> String {
    let mut prompt = format!("Transcript: \"{cleaned_transcript}\"");
    if let Some(location) = &context.location {
        prompt.push_str(&format!("\nLocation: {location}"));
    }
    if let Some(vessel_info) = &context.vessel_info {
        prompt.push_str(&format!("\nVessel: {vessel_info}"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_names_all_three_tags() {
        let prompt = system_prompt();
        assert!(prompt.contains("GREEN"));
        assert!(prompt.contains("AMBER"));
        assert!(prompt.contains("RED"));
    }

    #[test]
    fn user_prompt_includes_optional_context() {
        let context = AnalysisContext {
            location: Some("Hakata Bay".to_string()),
            vessel_info: Some("MV Example".to_string()),
            connection_id: "conn-1".to_string(),
        };
        let prompt = user_prompt("入港許可を要請", &context);
        assert!(prompt.contains("Hakata Bay"));
        assert!(prompt.contains("MV Example"));
    }
}
