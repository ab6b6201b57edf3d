mod fallback;

#[cfg(test)]
pub mod testing;

use crate::config::{PersonaConfig, RelayConfig};
use crate::gemini::{CompletionClient, CompletionError, CompletionRequest, CompletionResult};
use crate::line::{MessageEvent, MessagingClient};
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use tracing::log::{debug, error, warn};

pub use fallback::fallback_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyOutcome {
    pub source: ReplySource,
    pub delivered: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub events: usize,
    pub fallbacks: usize,
    pub undelivered: usize,
}

/// Answers message events: one completion call, then exactly one reply per event.
#[derive(Clone)]
pub struct Relay {
    completions: Arc<dyn CompletionClient>,
    messaging: Arc<dyn MessagingClient>,
    persona: Arc<PersonaConfig>,
    completion_timeout: Duration,
    concurrency_limit: usize,
}
impl Relay {
    pub fn new(
        completions: Arc<dyn CompletionClient>,
        messaging: Arc<dyn MessagingClient>,
        persona: Arc<PersonaConfig>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            completions,
            messaging,
            persona,
            completion_timeout: config.completion_timeout(),
            concurrency_limit: config.concurrency_limit.max(1),
        }
    }

    /// Handles every event of a webhook batch. Replies go to distinct reply tokens,
    /// so they're sent concurrently with no ordering between them.
    pub async fn handle_all(&self, events: Vec<MessageEvent>) -> BatchSummary {
        let events_count = events.len();
        stream::iter(events)
            .map(|event| self.handle(event))
            .buffer_unordered(self.concurrency_limit)
            .fold(
                BatchSummary {
                    events: events_count,
                    ..BatchSummary::default()
                },
                |mut summary, outcome| async move {
                    if outcome.source == ReplySource::Fallback {
                        summary.fallbacks += 1;
                    }
                    if !outcome.delivered {
                        summary.undelivered += 1;
                    }
                    summary
                },
            )
            .await
    }

    /// Never fails: a failed completion becomes the fallback reply, and a failed
    /// delivery is only logged since the reply token can't be used again.
    #[instrument(
        skip(self, event),
        fields(
            message_id = event.message_id.as_deref().unwrap_or("-"),
            user_id = event.user_id.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn handle(&self, event: MessageEvent) -> ReplyOutcome {
        let completion = if event.text.trim().is_empty() {
            Err(CompletionError::EmptyPrompt)
        } else {
            self.complete(&event.text).await
        };

        let (reply, source) = match completion {
            Ok(text) if !text.trim().is_empty() => (text, ReplySource::Generated),
            Ok(_) => {
                warn!("Completion returned blank text, sending fallback reply");
                (fallback_text(&self.persona).to_string(), ReplySource::Fallback)
            }
            Err(e) => {
                warn!("Completion failed, sending fallback reply: {e}");
                (fallback_text(&self.persona).to_string(), ReplySource::Fallback)
            }
        };

        let delivered = match self.messaging.send_reply(&event.reply_token, &reply).await {
            Ok(()) => {
                debug!("Sent {source:?} reply ({} chars)", reply.chars().count());
                true
            }
            Err(e) => {
                error!("Failed to deliver {source:?} reply: {e}");
                false
            }
        };

        ReplyOutcome { source, delivered }
    }

    async fn complete(&self, prompt: &str) -> CompletionResult {
        let request = CompletionRequest::new(prompt, &self.persona);
        tokio::time::timeout(self.completion_timeout, self.completions.generate(request))
            .await
            .unwrap_or_else(|_| Err(CompletionError::Timeout(self.completion_timeout)))
    }
}
