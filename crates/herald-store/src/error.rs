use thiserror::Error;

/// Errors that can occur within the announcement store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite / rusqlite error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The `data` column could not be (de)serialised.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No announcement with the given id exists.
    #[error("announcement not found: {id}")]
    NotFound { id: String },

    /// `create_draft` was called with `draft == false`.
    #[error("cannot create a draft announcement with draft set to false")]
    NotADraft,
}

pub type Result<T> = std::result::Result<T, StoreError>;
