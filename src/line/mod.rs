//! LINE Messaging API: webhook signature checks, webhook event parsing and replies.

mod client;
mod signature;
mod webhook;

pub use client::{DeliveryError, LineClient, MessagingClient};
pub use signature::{verify_signature, SIGNATURE_HEADER};
#[cfg(test)]
pub use signature::sign;
pub use webhook::{dispatch, DispatchError, MessageEvent, ReplyToken};
