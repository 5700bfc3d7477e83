//! `herald-store` — the persisted announcement entity and its CRUD surface.
//!
//! Announcements live in the control-plane SQLite database, in the same file
//! as the trigger queue so `herald-scheduler` can wrap record mutation and
//! trigger registration in one transaction. This crate therefore exposes two
//! layers:
//!
//! - plain functions over `&Connection` ([`sql`]) usable inside a caller's
//!   transaction, and
//! - [`AnnouncementStore`], a `Mutex<Connection>` manager for standalone CRUD.

pub mod db;
pub mod error;
pub mod sql;
pub mod store;
pub mod types;

pub use error::{Result, StoreError};
pub use store::AnnouncementStore;
pub use types::{
    Announcement, AnnouncementPatch, AnnouncementTarget, NewAnnouncement, TargetAudience,
};
