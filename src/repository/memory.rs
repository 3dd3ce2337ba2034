use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use std::collections::HashMap;

use super::{NoteCheck, NoteStore, StoreError, TakeOutcome};
use crate::models::{Note, unix_now};

/// Process-local store. A single lock around the map makes every operation
/// atomic, which is all the read-once protocol needs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    notes: Mutex<HashMap<Uuid, Note>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.notes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.notes.lock().await.is_empty()
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn insert(&self, note: &Note) -> Result<(), StoreError> {
        let mut notes = self.notes.lock().await;
        if notes.contains_key(&note.id) {
            return Err(StoreError::Conflict(note.id));
        }
        notes.insert(note.id, note.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        let notes = self.notes.lock().await;
        let now = unix_now();
        Ok(notes.get(&id).filter(|n| !n.is_expired(now)).cloned())
    }

    async fn take(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        let mut notes = self.notes.lock().await;
        let now = unix_now();
        Ok(notes.remove(&id).filter(|n| !n.is_expired(now)))
    }

    async fn take_if(&self, id: Uuid, check: NoteCheck<'_>) -> Result<TakeOutcome, StoreError> {
        let mut notes = self.notes.lock().await;

        let Some(note) = notes.get(&id) else {
            return Ok(TakeOutcome::Absent);
        };

        if note.is_expired(unix_now()) {
            notes.remove(&id);
            return Ok(TakeOutcome::Absent);
        }

        if !check(note) {
            return Ok(TakeOutcome::Refused);
        }

        Ok(notes
            .remove(&id)
            .map_or(TakeOutcome::Absent, TakeOutcome::Taken))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.notes.lock().await.remove(&id).is_some())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut notes = self.notes.lock().await;
        let before = notes.len();
        notes.retain(|_, n| !n.is_expired(now));
        Ok((before - notes.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    fn live_note(password: &str) -> Note {
        let now = unix_now();
        Note {
            id: Uuid::new_v4(),
            content: "secret".to_string(),
            password: password.to_string(),
            salt: Some("c2FsdA".to_string()),
            created_at: now,
            expires_at: now + 3600,
        }
    }

    #[tokio::test]
    async fn insert_rejects_existing_id() {
        let store = MemoryStore::new();
        let note = live_note("pw");

        store.insert(&note).await.unwrap();
        let err = store.insert(&note).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict(id) if id == note.id));
    }

    #[tokio::test]
    async fn take_returns_the_note_once() {
        let store = MemoryStore::new();
        let note = live_note("pw");
        store.insert(&note).await.unwrap();

        assert_eq!(store.take(note.id).await.unwrap(), Some(note.clone()));
        assert_eq!(store.take(note.id).await.unwrap(), None);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn expired_notes_are_invisible() {
        let store = MemoryStore::new();
        let mut note = live_note("pw");
        note.created_at -= 7200;
        note.expires_at = note.created_at + 60;
        store.insert(&note).await.unwrap();

        assert_eq!(store.get(note.id).await.unwrap(), None);
        assert_eq!(store.take(note.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn refused_take_keeps_the_record() {
        let store = MemoryStore::new();
        let note = live_note("right");
        store.insert(&note).await.unwrap();

        let outcome = store.take_if(note.id, &|n| n.password == "wrong").await.unwrap();
        assert_eq!(outcome, TakeOutcome::Refused);
        assert_eq!(store.get(note.id).await.unwrap(), Some(note.clone()));

        let outcome = store.take_if(note.id, &|n| n.password == "right").await.unwrap();
        assert_eq!(outcome, TakeOutcome::Taken(note.clone()));

        let outcome = store.take_if(note.id, &|_| true).await.unwrap();
        assert_eq!(outcome, TakeOutcome::Absent);
    }

    #[tokio::test]
    async fn delete_reports_presence() {
        let store = MemoryStore::new();
        let note = live_note("pw");
        store.insert(&note).await.unwrap();

        assert!(store.delete(note.id).await.unwrap());
        assert!(!store.delete(note.id).await.unwrap());
    }

    #[tokio::test]
    async fn purge_only_removes_past_deadline() {
        let store = MemoryStore::new();
        let keep = live_note("pw");
        let mut stale = live_note("pw");
        stale.expires_at = stale.created_at + 1;
        store.insert(&keep).await.unwrap();
        store.insert(&stale).await.unwrap();

        let removed = store.purge_expired(stale.expires_at).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.len().await, 1);
        assert!(store.get(keep.id).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_takes_deliver_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let note = live_note("pw");
        store.insert(&note).await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let store = store.clone();
                let id = note.id;
                tokio::spawn(async move { store.take(id).await.unwrap() })
            })
            .collect();

        let mut delivered = 0;
        for handle in handles {
            if handle.await.unwrap().is_some() {
                delivered += 1;
            }
        }

        assert_eq!(delivered, 1);
    }
}
