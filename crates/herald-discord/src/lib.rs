//! `herald-discord` — Discord REST implementation of the chat-client
//! boundary.
//!
//! Covers exactly what the delivery engine needs: channel posts, direct
//! messages, mention syntax, and message deep links. Gateway/voice/slash
//! command surfaces are deliberately absent.

pub mod client;
pub mod error;

pub use client::DiscordHttpClient;
pub use error::DiscordError;
