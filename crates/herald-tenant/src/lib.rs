//! `herald-tenant` — per-platform datastore access.
//!
//! Each connected platform gets an isolated SQLite file under a common root
//! directory (`<tenant_root>/<guild_id>.db`). [`resolver::TenantResolver`]
//! maps a platform id to an open handle on that file; [`audience`] runs the
//! read-only recipient queries the saga orchestrator needs.

pub mod audience;
pub mod db;
pub mod error;
pub mod resolver;

pub use error::{Result, TenantError};
pub use resolver::{TenantHandle, TenantResolver};
