use crate::config::GenerationParams;
use crate::gemini::CompletionError;
use serde::{Deserialize, Serialize};

/// Finish reasons that mean the output was withheld rather than just empty.
const BLOCKED_FINISH_REASONS: &[&str] = &[
    "SAFETY",
    "RECITATION",
    "BLOCKLIST",
    "PROHIBITED_CONTENT",
    "SPII",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest<'a> {
    /// Always a single user turn, no history is carried between calls.
    pub contents: [Content<'a>; 1],

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction<'a>>,

    #[serde(skip_serializing_if = "GenerationConfig::is_empty")]
    pub generation_config: GenerationConfig,
}
impl<'a> GenerateContentRequest<'a> {
    pub fn single_turn(
        prompt: &'a str,
        system_instruction: Option<&'a str>,
        generation: &GenerationParams,
    ) -> Self {
        Self {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            system_instruction: system_instruction.map(|text| SystemInstruction {
                parts: [Part { text }],
            }),
            generation_config: GenerationConfig::from(generation),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Content<'a> {
    pub role: &'static str,
    pub parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct SystemInstruction<'a> {
    pub parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
pub struct Part<'a> {
    pub text: &'a str,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}
impl GenerationConfig {
    fn is_empty(&self) -> bool {
        self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.max_output_tokens.is_none()
    }
}
impl From<&GenerationParams> for GenerationConfig {
    fn from(params: &GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
            max_output_tokens: params.max_output_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default)]
    pub prompt_feedback: Option<PromptFeedback>,
}
impl GenerateContentResponse {
    /// Joins the text parts of the first candidate, untouched. Thinking parts are
    /// skipped. A response with no usable text is an error.
    pub fn into_text(self) -> Result<String, CompletionError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CompletionError::Blocked(reason));
        }

        let candidate = self
            .candidates
            .into_iter()
            .next()
            .ok_or(CompletionError::EmptyResponse)?;

        let text: String = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default()
            .into_iter()
            .filter(|part| !part.thought)
            .filter_map(|part| part.text)
            .collect();

        if !text.trim().is_empty() {
            return Ok(text);
        }

        match candidate.finish_reason {
            Some(reason) if BLOCKED_FINISH_REASONS.contains(&reason.as_str()) => {
                Err(CompletionError::Blocked(reason))
            }
            _ => Err(CompletionError::EmptyResponse),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<CandidateContent>,

    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateContent {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsePart {
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub thought: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptFeedback {
    #[serde(default)]
    pub block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<String, CompletionError> {
        serde_json::from_value::<GenerateContentResponse>(value)
            .unwrap()
            .into_text()
    }

    #[test]
    fn test_minimal_request() {
        let request =
            GenerateContentRequest::single_turn("hello", None, &GenerationParams::default());

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({ "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }] })
        );
    }

    #[test]
    fn test_full_request() {
        let params = GenerationParams {
            temperature: Some(0.9),
            top_p: None,
            top_k: Some(40),
            max_output_tokens: Some(2048),
        };
        let request =
            GenerateContentRequest::single_turn("I failed my exam today", Some("Be kind."), &params);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "I failed my exam today");
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "Be kind.");
        assert_eq!(value["generationConfig"]["topK"], 40);
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 2048);
        assert!(value["generationConfig"].get("topP").is_none());
        assert!(value["generationConfig"]["temperature"].is_number());
    }

    #[test]
    fn test_text_parts_joined_verbatim() {
        let text = parse(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "thinking it over", "thought": true },
                        { "text": "Don't worry, " },
                        { "text": "you'll get it next time!\n" }
                    ]
                },
                "finishReason": "STOP"
            }],
            "usageMetadata": { "promptTokenCount": 7 }
        }))
        .unwrap();

        assert_eq!(text, "Don't worry, you'll get it next time!\n");
    }

    #[test]
    fn test_unusable_responses() {
        assert!(matches!(
            parse(json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            Err(CompletionError::Blocked(reason)) if reason == "SAFETY"
        ));
        assert!(matches!(
            parse(json!({ "candidates": [] })),
            Err(CompletionError::EmptyResponse)
        ));
        assert!(matches!(
            parse(json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] })),
            Err(CompletionError::EmptyResponse)
        ));
        assert!(matches!(
            parse(json!({ "candidates": [{ "content": { "parts": [{ "text": "  \n" }] } }] })),
            Err(CompletionError::EmptyResponse)
        ));
        assert!(matches!(
            parse(json!({ "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }] })),
            Err(CompletionError::Blocked(reason)) if reason == "SAFETY"
        ));
    }
}
