use crate::gemini::{CompletionClient, CompletionError, CompletionRequest, CompletionResult};
use crate::line::{DeliveryError, MessagingClient, ReplyToken};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Mutex;
use std::time::Duration;

pub enum Completion {
    Reply(String),
    Fail,
    Hang,
    Slow(Duration, String),
}

pub struct FakeCompletions {
    behaviour: Completion,
    prompts: Mutex<Vec<String>>,
}
impl FakeCompletions {
    pub fn new(behaviour: Completion) -> Self {
        Self {
            behaviour,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Completion::Reply(text.to_string()))
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionClient for FakeCompletions {
    async fn generate(&self, request: CompletionRequest<'_>) -> CompletionResult {
        self.prompts.lock().unwrap().push(request.prompt.to_string());
        match &self.behaviour {
            Completion::Reply(text) => Ok(text.clone()),
            Completion::Fail => Err(CompletionError::Api {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "upstream exploded".to_string(),
            }),
            Completion::Hang => std::future::pending().await,
            Completion::Slow(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }
}

#[derive(Default)]
pub struct FakeMessaging {
    fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}
impl FakeMessaging {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingClient for FakeMessaging {
    async fn send_reply(&self, reply_token: &ReplyToken, text: &str) -> Result<(), DeliveryError> {
        self.sent
            .lock()
            .unwrap()
            .push((reply_token.as_str().to_string(), text.to_string()));

        if self.fail {
            return Err(DeliveryError::Status {
                status: StatusCode::BAD_REQUEST,
                body: r#"{"message":"Invalid reply token"}"#.to_string(),
            });
        }
        Ok(())
    }
}
