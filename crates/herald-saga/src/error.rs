use thiserror::Error;

/// Errors that can occur while driving a saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Underlying SQLite / rusqlite error on the saga log.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A saga state payload could not be (de)serialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Tenant resolution or audience query failed.
    #[error(transparent)]
    Tenant(#[from] herald_tenant::TenantError),

    /// Announcement-store read failed.
    #[error(transparent)]
    Store(#[from] herald_store::StoreError),

    /// A step tried to advance out of order.
    #[error("illegal saga transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    /// The safety verification notice could not be posted, so private
    /// messages cannot carry their deep link.
    #[error("safety notice post failed: {reason}")]
    SafetyNotice { reason: String },

    /// No saga with the given id exists.
    #[error("saga not found: {id}")]
    NotFound { id: String },
}

pub type Result<T> = std::result::Result<T, SagaError>;
