//! `herald-core` — shared types for the announcement delivery engine.
//!
//! Holds the identifiers, the configuration layer, and the [`chat::ChatClient`]
//! trait that the orchestrator dispatches through. No persistence lives here;
//! each subsystem crate owns its own tables.

pub mod chat;
pub mod config;
pub mod types;

pub use chat::{ChatClient, DispatchOutcome};
pub use config::HeraldConfig;
pub use types::{AnnouncementId, PlatformId};
