use async_trait::async_trait;
use herald_core::{ChatClient, DispatchOutcome};
use serde_json::json;
use tracing::debug;

const API_BASE: &str = "https://discord.com/api/v10";

/// How an HTTP status maps onto the dispatch outcome taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusClass {
    Success,
    /// Rate limits and server errors are worth retrying.
    Transient,
    /// Everything else 4xx: DMs closed, unknown channel, missing access.
    Permanent,
}

fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        429 => StatusClass::Transient,
        500..=599 => StatusClass::Transient,
        _ => StatusClass::Permanent,
    }
}

/// REST-only Discord client.
///
/// Each send is a plain HTTP call; the engine's own retry/backoff loop sits
/// above this, keyed off the returned [`DispatchOutcome`].
pub struct DiscordHttpClient {
    http: reqwest::Client,
    token: String,
}

impl DiscordHttpClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
        }
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> DispatchOutcome {
        let url = format!("{API_BASE}/channels/{channel_id}/messages");
        let res = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "content": text }))
            .send()
            .await;

        let resp = match res {
            Ok(resp) => resp,
            Err(e) => {
                return DispatchOutcome::Transient {
                    reason: format!("transport error: {e}"),
                }
            }
        };

        let status = resp.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => {
                let message_id = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str().map(String::from)));
                debug!(channel_id, ?message_id, "discord: message posted");
                DispatchOutcome::Delivered { message_id }
            }
            StatusClass::Transient => DispatchOutcome::Transient {
                reason: format!("discord returned {status}"),
            },
            StatusClass::Permanent => {
                let body = resp.text().await.unwrap_or_default();
                DispatchOutcome::Permanent {
                    reason: format!("discord returned {status}: {body}"),
                }
            }
        }
    }

    /// Open (or fetch the cached) DM channel for `user_id`.
    async fn open_dm_channel(&self, user_id: &str) -> Result<String, DispatchOutcome> {
        let url = format!("{API_BASE}/users/@me/channels");
        let res = self
            .http
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .json(&json!({ "recipient_id": user_id }))
            .send()
            .await;

        let resp = match res {
            Ok(resp) => resp,
            Err(e) => {
                return Err(DispatchOutcome::Transient {
                    reason: format!("transport error: {e}"),
                })
            }
        };

        let status = resp.status().as_u16();
        match classify_status(status) {
            StatusClass::Success => resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str().map(String::from)))
                .ok_or_else(|| DispatchOutcome::Permanent {
                    reason: "DM channel response had no id".into(),
                }),
            StatusClass::Transient => Err(DispatchOutcome::Transient {
                reason: format!("discord returned {status}"),
            }),
            StatusClass::Permanent => Err(DispatchOutcome::Permanent {
                reason: format!("cannot open DM channel: discord returned {status}"),
            }),
        }
    }
}

#[async_trait]
impl ChatClient for DiscordHttpClient {
    async fn send_channel_message(&self, channel_id: &str, text: &str) -> DispatchOutcome {
        self.post_message(channel_id, text).await
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> DispatchOutcome {
        match self.open_dm_channel(user_id).await {
            Ok(dm_channel) => self.post_message(&dm_channel, text).await,
            Err(outcome) => outcome,
        }
    }

    fn mention(&self, user_id: &str) -> String {
        format!("<@{user_id}>")
    }

    fn message_link(&self, guild_id: &str, channel_id: &str, message_id: &str) -> String {
        format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        assert_eq!(classify_status(429), StatusClass::Transient);
        assert_eq!(classify_status(500), StatusClass::Transient);
        assert_eq!(classify_status(503), StatusClass::Transient);
    }

    #[test]
    fn client_errors_are_permanent() {
        // 403: user has DMs disabled; 404: unknown channel.
        assert_eq!(classify_status(403), StatusClass::Permanent);
        assert_eq!(classify_status(404), StatusClass::Permanent);
        assert_eq!(classify_status(400), StatusClass::Permanent);
    }

    #[test]
    fn success_range_is_success() {
        assert_eq!(classify_status(200), StatusClass::Success);
        assert_eq!(classify_status(204), StatusClass::Success);
    }

    #[test]
    fn mention_and_link_syntax() {
        let client = DiscordHttpClient::new("t");
        assert_eq!(client.mention("123"), "<@123>");
        assert_eq!(
            client.message_link("g", "c", "m"),
            "https://discord.com/channels/g/c/m"
        );
    }
}
