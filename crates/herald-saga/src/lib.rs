//! `herald-saga` — resumable dispatch workflows for fired announcements.
//!
//! # Overview
//!
//! When a trigger fires, the orchestrator re-reads the announcement and runs
//! one saga per dispatchable target:
//!
//! ```text
//! Started → AudienceResolved → MessagesComposed → Dispatching → Done
//!                    └──────────── Failed (from any non-terminal state) ─┘
//! ```
//!
//! Each state carries exactly the data its step produced (a tagged union —
//! no free-form payload), and the saga row is persisted after every advance,
//! so a restart can pick up a half-dispatched saga and skip recipients that
//! already have a recorded outcome.

pub mod compose;
pub mod db;
pub mod error;
pub mod log;
pub mod orchestrator;
pub mod types;

pub use error::{Result, SagaError};
pub use log::SagaLog;
pub use orchestrator::{run_worker, Orchestrator};
pub use types::{DeliveryAddress, DeliveryOutcome, OutcomeRecord, Saga, SagaState};
