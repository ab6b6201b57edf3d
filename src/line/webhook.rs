use serde::Deserialize;
use std::fmt;
use tracing::log::debug;

/// Single use credential LINE hands out per event, good for exactly one reply.
#[derive(Clone, PartialEq, Eq)]
pub struct ReplyToken(String);
impl ReplyToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials, keep them out of logs.
impl fmt::Debug for ReplyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(6).collect();
        write!(f, "ReplyToken({prefix}…)")
    }
}

/// A text message that can be answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub reply_token: ReplyToken,
    pub text: String,
    pub message_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum DispatchError {
    #[error("Malformed webhook body: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct WebhookBody {
    #[serde(default)]
    destination: Option<String>,

    // Kept raw so one odd event can't fail the whole batch.
    events: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,

    #[serde(default)]
    mode: Option<String>,

    #[serde(default)]
    reply_token: Option<String>,

    #[serde(default)]
    source: Option<RawSource>,

    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct RawMessage {
    #[serde(rename = "type")]
    message_type: String,

    #[serde(default)]
    id: Option<String>,

    #[serde(default)]
    text: Option<String>,
}

impl RawEvent {
    fn into_message_event(self) -> Option<MessageEvent> {
        if self.event_type != "message" {
            debug!("Ignoring {} event", self.event_type);
            return None;
        }

        // Standby channels receive events they must not reply to.
        if self.mode.as_deref() == Some("standby") {
            debug!("Ignoring message event in standby mode");
            return None;
        }

        let message = self.message?;
        if message.message_type != "text" {
            debug!("Ignoring {} message", message.message_type);
            return None;
        }

        let Some(reply_token) = self.reply_token.filter(|t| !t.is_empty()) else {
            debug!("Ignoring text message without a reply token");
            return None;
        };

        // Still answered (with the fallback) when LINE leaves the text out.
        Some(MessageEvent {
            reply_token: ReplyToken::new(reply_token),
            text: message.text.unwrap_or_default(),
            message_id: message.id,
            user_id: self.source.and_then(|s| s.user_id),
        })
    }
}

/// Parses an already verified webhook body into the text messages it carries,
/// in the order they were sent. Everything else in the batch is skipped.
pub fn dispatch(body: &[u8]) -> Result<Vec<MessageEvent>, DispatchError> {
    let webhook: WebhookBody = serde_json::from_slice(body)?;
    debug!(
        "Webhook for {} carries {} event(s)",
        webhook.destination.as_deref().unwrap_or("unknown destination"),
        webhook.events.len()
    );

    let events = webhook
        .events
        .into_iter()
        .enumerate()
        .filter_map(|(idx, value)| match serde_json::from_value::<RawEvent>(value) {
            Ok(event) => event.into_message_event(),
            Err(e) => {
                debug!("Skipping unrecognised event #{idx}: {e}");
                None
            }
        })
        .collect();

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text_event(token: &str, text: &str) -> serde_json::Value {
        json!({
            "type": "message",
            "mode": "active",
            "timestamp": 1462629479859u64,
            "replyToken": token,
            "source": { "type": "user", "userId": "U4af4980629" },
            "webhookEventId": "01FZ74A0TDDPYRVKNK77XKC3ZR",
            "deliveryContext": { "isRedelivery": false },
            "message": { "id": "444573844083572737", "type": "text", "text": text }
        })
    }

    fn body(events: Vec<serde_json::Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({ "destination": "Uxxxxxxxx", "events": events })).unwrap()
    }

    #[test]
    fn test_single_text_message() {
        let events = dispatch(&body(vec![text_event("nHuyWiB7yP", "I failed my exam today")])).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reply_token.as_str(), "nHuyWiB7yP");
        assert_eq!(events[0].text, "I failed my exam today");
        assert_eq!(events[0].message_id.as_deref(), Some("444573844083572737"));
        assert_eq!(events[0].user_id.as_deref(), Some("U4af4980629"));
    }

    #[test]
    fn test_mixed_batch_keeps_text_in_order() {
        let sticker = json!({
            "type": "message",
            "replyToken": "sticker-token",
            "message": { "id": "1", "type": "sticker", "packageId": "1", "stickerId": "1" }
        });
        let follow = json!({ "type": "follow", "replyToken": "follow-token" });
        let unsend = json!({ "type": "unsend", "unsend": { "messageId": "325708" } });

        let events = dispatch(&body(vec![
            text_event("t1", "first"),
            sticker,
            follow,
            text_event("t2", "second"),
            unsend,
            text_event("t3", "third"),
        ]))
        .unwrap();

        let texts: Vec<&str> = events.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);

        let tokens: Vec<&str> = events.iter().map(|e| e.reply_token.as_str()).collect();
        assert_eq!(tokens, vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn test_non_text_only() {
        let sticker = json!({
            "type": "message",
            "replyToken": "sticker-token",
            "message": { "id": "1", "type": "sticker" }
        });
        assert!(dispatch(&body(vec![sticker])).unwrap().is_empty());
    }

    #[test]
    fn test_empty_events_verification_request() {
        assert!(dispatch(br#"{"destination":"U1","events":[]}"#).unwrap().is_empty());
    }

    #[test]
    fn test_unrepliable_events_skipped() {
        let mut standby = text_event("standby-token", "hello");
        standby["mode"] = json!("standby");

        let mut no_token = text_event("", "hello");
        no_token.as_object_mut().unwrap().remove("replyToken");

        let empty_token = text_event("", "hello");

        let events = dispatch(&body(vec![standby, no_token, empty_token])).unwrap();
        assert!(events.is_empty());
    }

    #[test]
    fn test_text_message_without_text_is_kept() {
        let mut event = text_event("t1", "");
        event["message"].as_object_mut().unwrap().remove("text");

        let events = dispatch(&body(vec![event])).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reply_token.as_str(), "t1");
        assert!(events[0].text.is_empty());
    }

    #[test]
    fn test_odd_event_does_not_fail_batch() {
        let events = dispatch(&body(vec![
            json!({ "no_type": true }),
            json!("not even an object"),
            text_event("t1", "still here"),
        ]))
        .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "still here");
    }

    #[test]
    fn test_malformed_body() {
        assert!(dispatch(b"").is_err());
        assert!(dispatch(b"not json").is_err());
        assert!(dispatch(br#"{"destination":"U1"}"#).is_err());
        assert!(dispatch(br#"{"events":{}}"#).is_err());
        assert!(dispatch(br#"[1,2,3]"#).is_err());
    }

    #[test]
    fn test_reply_token_debug_is_redacted() {
        let token = ReplyToken::new("nHuyWiB7yP5Zw52FIkcQobQuGDXCTA");
        let printed = format!("{token:?}");
        assert!(!printed.contains("nHuyWiB7yP5Zw52FIkcQobQuGDXCTA"));
        assert!(printed.starts_with("ReplyToken(nHuyWi"));
    }
}
