use crate::config::LineConfig;
use crate::line::webhook::ReplyToken;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::log::debug;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("LINE API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// Sends replies back into the conversation an event came from.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_reply(&self, reply_token: &ReplyToken, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    message_type: &'static str,
    text: &'a str,
}

/// LINE Messaging API reply endpoint client.
pub struct LineClient {
    client: Client,
    reply_url: String,
    access_token: String,
}
impl LineClient {
    pub fn new(config: &LineConfig, access_token: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to build LINE Reqwest client")?;

        Ok(Self {
            client,
            reply_url: format!(
                "{}/v2/bot/message/reply",
                config.api_base_url.trim_end_matches('/')
            ),
            access_token,
        })
    }
}

#[async_trait]
impl MessagingClient for LineClient {
    async fn send_reply(&self, reply_token: &ReplyToken, text: &str) -> Result<(), DeliveryError> {
        let request = ReplyRequest {
            reply_token: reply_token.as_str(),
            messages: [TextMessage {
                message_type: "text",
                text,
            }],
        };

        let response = self
            .client
            .post(&self.reply_url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DeliveryError::Status { status, body });
        }

        debug!("Reply delivered with {reply_token:?}");
        Ok(())
    }
}
