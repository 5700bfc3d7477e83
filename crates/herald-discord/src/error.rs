/// Errors produced by the Discord client.
#[derive(Debug, thiserror::Error)]
pub enum DiscordError {
    #[error("no bot token configured")]
    NoToken,
}
