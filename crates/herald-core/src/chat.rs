//! Chat-platform client boundary.
//!
//! The orchestrator only ever talks to the platform through [`ChatClient`],
//! so tests can substitute an in-process double and the Discord REST client
//! lives in its own crate. Sends return a [`DispatchOutcome`] instead of a
//! `Result`: a failed delivery to one recipient is data, not an error that
//! should unwind the whole dispatch step.

use async_trait::async_trait;

/// Terminal-or-retryable outcome of a single platform send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The platform accepted the message. `message_id` is the platform's id
    /// for the created message, when the client can recover it — the safety
    /// notice post needs it to build the verification deep link.
    Delivered { message_id: Option<String> },
    /// Worth retrying: rate limit, 5xx, transport error.
    Transient { reason: String },
    /// Never worth retrying: DMs closed, unknown channel, missing access.
    Permanent { reason: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

/// Minimal surface the delivery engine needs from a chat platform.
///
/// `mention` and `message_link` are synchronous because they are pure
/// string construction in every known platform.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Post `text` to a public channel.
    async fn send_channel_message(&self, channel_id: &str, text: &str) -> DispatchOutcome;

    /// Deliver `text` to a user's direct messages.
    async fn send_direct_message(&self, user_id: &str, text: &str) -> DispatchOutcome;

    /// Platform-specific mention syntax for an external user id.
    fn mention(&self, user_id: &str) -> String;

    /// Deep link to a previously posted message.
    fn message_link(&self, guild_id: &str, channel_id: &str, message_id: &str) -> String;
}
