use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CreateNoteRequest {
    /// Secret content
    pub content: Option<String>,
    /// Password required to read the note
    pub password: Option<String>,
    /// Opaque value returned to the reader unchanged
    pub salt: Option<String>,
    /// Lifetime in minutes
    pub ttl: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateNoteResponse {
    pub message: String,
    /// Note ID
    pub note_id: Uuid,
    /// One-time shareable link
    pub link: String,
    /// Creation time, seconds since epoch
    pub created_at: i64,
    /// Expiry deadline, seconds since epoch
    pub expires_at: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ReadNoteRequest {
    pub password: Option<String>,
}

/// A delivered note. The stored password is never echoed back.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NoteResponse {
    pub message: String,
    pub content: String,
    pub salt: Option<String>,
    /// Creation time, seconds since epoch
    pub created_at: i64,
    /// Expiry deadline, seconds since epoch
    pub ttl: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PreviewResponse {
    pub message: String,
    pub content: String,
}

impl Default for PreviewResponse {
    fn default() -> Self {
        Self {
            message: "Secure Note Link Preview".to_string(),
            content: "This content is hidden for security reasons. \
                      Please open the link directly in your browser."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct CleanupRequest {
    pub note_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
