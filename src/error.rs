use crate::repository::StoreError;

/// Outcome taxonomy of the note lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum NoteError {
    /// A required field was missing or out of range. The message is safe to
    /// echo back to the caller.
    #[error("{0}")]
    Validation(String),

    /// Password did not match. Nothing was mutated.
    #[error("incorrect password")]
    Forbidden,

    /// Absent, already consumed, expired, or never existed.
    #[error("note not found or already destroyed")]
    NotFound,

    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl NoteError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
