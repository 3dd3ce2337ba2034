use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// A stored secret. Never mutated after creation; it only leaves the store
/// by being taken, deleted, or expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: Uuid,
    pub content: String,
    pub password: String,
    /// Opaque value handed back to the reader unchanged.
    pub salt: Option<String>,
    /// Seconds since the Unix epoch.
    pub created_at: i64,
    /// Seconds since the Unix epoch. Past this point the note is gone.
    pub expires_at: i64,
}

impl Note {
    pub const fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Current wall-clock time in whole seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
}
