use thiserror::Error;

/// Errors that can occur while resolving tenants or audiences.
#[derive(Debug, Error)]
pub enum TenantError {
    /// The platform has no connected metadata or its datastore cannot be
    /// opened. Surfaced to the caller as-is; this layer never retries.
    #[error("tenant unavailable for platform {platform}: {reason}")]
    TenantUnavailable { platform: String, reason: String },

    /// Underlying SQLite / rusqlite error on an open handle.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, TenantError>;
