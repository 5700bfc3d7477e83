use thiserror::Error;

/// Errors that can occur within the scheduling subsystem.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Announcement-store failure inside a scheduling transaction.
    #[error(transparent)]
    Store(#[from] herald_store::StoreError),

    /// No announcement with the given id exists.
    #[error("announcement not found: {id}")]
    AnnouncementNotFound { id: String },

    /// No trigger with the given job id is live in the queue.
    #[error("trigger not found: {job_id}")]
    TriggerNotFound { job_id: String },

    /// `schedule_remove` called on an announcement with no registered job.
    /// Deliberately not idempotent — this signals upstream state corruption.
    #[error("job associated with announcement {id} not found")]
    JobAssociationMissing { id: String },

    /// `schedule_add` called on an announcement that already has a job.
    #[error("job associated with announcement {id} already exists: {job_id}")]
    JobAlreadyExists { id: String, job_id: String },

    /// A non-draft announcement without a `scheduled_at` cannot be scheduled.
    #[error("announcement {id} has no scheduled_at to register a trigger for")]
    MissingScheduledAt { id: String },

    /// `scheduled_at` must be in the future at registration time.
    #[error("scheduled_at {scheduled_at} is in the past")]
    ScheduleInPast { scheduled_at: String },

    /// Drafts never carry triggers; schedule them by un-drafting.
    #[error("draft announcements cannot be scheduled")]
    DraftNotSchedulable,
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
