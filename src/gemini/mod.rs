//! Google Gemini `generateContent` client.

mod types;

use crate::config::{GeminiConfig, GenerationParams, PersonaConfig};
use crate::gemini::types::{GenerateContentRequest, GenerateContentResponse};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::log::debug;

#[derive(thiserror::Error, Debug)]
pub enum CompletionError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Gemini API returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("Failed to decode Gemini response: {0}")]
    Decode(String),
    #[error("Gemini withheld the response: {0}")]
    Blocked(String),
    #[error("Gemini returned no usable text")]
    EmptyResponse,
    #[error("No response from Gemini within {0:?}")]
    Timeout(Duration),
    #[error("Message has no text to answer")]
    EmptyPrompt,
}

/// One single-turn completion call, shaped by the persona.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub prompt: &'a str,
    pub model: &'a str,
    pub system_instruction: Option<&'a str>,
    pub generation: &'a GenerationParams,
}
impl<'a> CompletionRequest<'a> {
    pub fn new(prompt: &'a str, persona: &'a PersonaConfig) -> Self {
        Self {
            prompt,
            model: &persona.model,
            system_instruction: persona.system_instruction.as_deref(),
            generation: &persona.generation,
        }
    }
}

pub type CompletionResult = Result<String, CompletionError>;

/// Produces reply text for a prompt.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn generate(&self, request: CompletionRequest<'_>) -> CompletionResult;
}

pub struct GeminiClient {
    client: Client,
    api_base_url: String,
    api_key: String,
}
impl GeminiClient {
    pub fn new(config: &GeminiConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build Gemini Reqwest client")?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base_url, model
        )
    }
}

#[async_trait]
impl CompletionClient for GeminiClient {
    async fn generate(&self, request: CompletionRequest<'_>) -> CompletionResult {
        let body = GenerateContentRequest::single_turn(
            request.prompt,
            request.system_instruction,
            request.generation,
        );

        debug!("Sending generateContent request to {}", request.model);
        let response = self
            .client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CompletionError::Api { status, body });
        }

        response
            .json::<GenerateContentResponse>()
            .await
            .map_err(|e| CompletionError::Decode(e.to_string()))?
            .into_text()
    }
}
