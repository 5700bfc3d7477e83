//! `herald-scheduler` — durable trigger queue for announcements.
//!
//! # Overview
//!
//! Triggers are persisted to a `triggers` table in the same SQLite file as
//! the announcements themselves, so every schedule operation wraps record
//! mutation and trigger registration in one transaction: a crash between the
//! two can never leave an announcement without its trigger or a trigger
//! pointing at a missing announcement.
//!
//! [`engine::SchedulerEngine`] polls the table and forwards the announcement
//! id of every due trigger over an mpsc channel to the orchestrator worker.
//! The fired message carries the id only — the orchestrator re-reads current
//! state, so edits made between scheduling and firing are respected.

pub mod db;
pub mod engine;
pub mod error;
pub mod queue;
pub mod scheduler;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use queue::{Trigger, TriggerStatus};
pub use scheduler::Scheduler;
