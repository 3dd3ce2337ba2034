//! Note lifecycle: create, read-once retrieval, explicit deletion.
//!
//! Two retrieval paths exist. [`NoteService::read_unverified`] is a single
//! atomic take and destroys the note whoever asks. [`NoteService::read_with_password`]
//! checks the password inside the store's compare-and-delete, so a wrong
//! guess leaves the note in place and two correct concurrent readers cannot
//! both receive it.

use subtle::ConstantTimeEq;
use uuid::Uuid;

use std::sync::Arc;

use crate::{
    dto::{CreateNoteRequest, CreateNoteResponse, NoteResponse},
    error::NoteError,
    guard::{Access, RequestClassifier, RequestMeta},
    models::{Note, unix_now},
    repository::{NoteStore, TakeOutcome},
    scheduler::{CleanupJob, CleanupScheduler},
};

#[derive(Debug, Clone)]
pub struct NoteSettings {
    pub base_url: String,
    pub default_ttl_minutes: i64,
    pub max_ttl_minutes: i64,
}

impl NoteSettings {
    pub fn from_config(config: &crate::config::Config) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            default_ttl_minutes: config.default_ttl_minutes,
            max_ttl_minutes: config.max_ttl_minutes,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Retrieval {
    /// A link unfurler asked. Nothing was read or destroyed.
    Preview,
    Delivered(NoteResponse),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deletion {
    Deleted,
    AlreadyGone,
}

pub struct NoteService {
    store: Arc<dyn NoteStore>,
    scheduler: Arc<dyn CleanupScheduler>,
    classifier: Arc<dyn RequestClassifier>,
    settings: NoteSettings,
}

fn required(field: Option<String>, message: &str) -> Result<String, NoteError> {
    field
        .filter(|value| !value.is_empty())
        .ok_or_else(|| NoteError::validation(message))
}

/// Empty ids are a malformed request. Anything else that is not a UUID
/// cannot name a note, and reads the same as a consumed one.
fn parse_id(id: &str) -> Result<Uuid, NoteError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(NoteError::validation("Note ID is missing"));
    }
    Uuid::parse_str(id).map_err(|_| NoteError::NotFound)
}

fn passwords_match(stored: &str, supplied: &str) -> bool {
    stored.as_bytes().ct_eq(supplied.as_bytes()).into()
}

fn delivered(note: Note) -> NoteResponse {
    NoteResponse {
        message: "Note retrieved and destroyed successfully".to_string(),
        content: note.content,
        salt: note.salt,
        created_at: note.created_at,
        ttl: note.expires_at,
    }
}

impl NoteService {
    pub fn new(
        store: Arc<dyn NoteStore>,
        scheduler: Arc<dyn CleanupScheduler>,
        classifier: Arc<dyn RequestClassifier>,
        settings: NoteSettings,
    ) -> Self {
        Self {
            store,
            scheduler,
            classifier,
            settings,
        }
    }

    fn ttl_minutes(&self, requested: Option<i64>) -> Result<i64, NoteError> {
        let ttl = requested.unwrap_or(self.settings.default_ttl_minutes);
        if ttl <= 0 {
            return Err(NoteError::validation("TTL must be a positive number of minutes"));
        }
        if ttl > self.settings.max_ttl_minutes {
            return Err(NoteError::validation(format!(
                "TTL must not exceed {} minutes",
                self.settings.max_ttl_minutes
            )));
        }
        Ok(ttl)
    }

    pub async fn create(&self, request: CreateNoteRequest) -> Result<CreateNoteResponse, NoteError> {
        let content = required(request.content, "Content is required")?;
        let password = required(request.password, "Password is required")?;
        let ttl = self.ttl_minutes(request.ttl)?;

        let created_at = unix_now();
        let expires_at = ttl
            .checked_mul(60)
            .and_then(|secs| created_at.checked_add(secs))
            .ok_or_else(|| NoteError::validation("TTL is too large"))?;
        let note = Note {
            id: Uuid::new_v4(),
            content,
            password,
            salt: request.salt,
            created_at,
            expires_at,
        };

        self.store.insert(&note).await?;
        tracing::info!(note_id = %note.id, expires_at = note.expires_at, "Note created");

        let job = CleanupJob {
            note_id: note.id,
            fire_at: note.expires_at,
        };
        if let Err(e) = self.scheduler.schedule(job).await {
            tracing::warn!(note_id = %note.id, "Failed to schedule cleanup, relying on store expiry: {e}");
        }

        Ok(CreateNoteResponse {
            message: "Note created successfully".to_string(),
            note_id: note.id,
            link: format!("{}/read/{}", self.settings.base_url, note.id),
            created_at: note.created_at,
            expires_at: note.expires_at,
        })
    }

    fn is_automated(&self, meta: &RequestMeta<'_>) -> bool {
        if self.classifier.classify(meta) == Access::Automated {
            tracing::info!(
                user_agent = meta.user_agent.unwrap_or_default(),
                "Automated fetch detected, note left untouched"
            );
            return true;
        }
        false
    }

    /// Destroys the note and returns it without looking at the password.
    pub async fn read_unverified(
        &self,
        id: &str,
        meta: &RequestMeta<'_>,
    ) -> Result<Retrieval, NoteError> {
        if self.is_automated(meta) {
            return Ok(Retrieval::Preview);
        }
        let id = parse_id(id)?;

        let note = self.store.take(id).await?.ok_or(NoteError::NotFound)?;
        tracing::info!(note_id = %id, "Note delivered and destroyed");

        Ok(Retrieval::Delivered(delivered(note)))
    }

    /// Destroys and returns the note only if `password` matches.
    pub async fn read_with_password(
        &self,
        id: &str,
        password: Option<&str>,
        meta: &RequestMeta<'_>,
    ) -> Result<Retrieval, NoteError> {
        if self.is_automated(meta) {
            return Ok(Retrieval::Preview);
        }
        let id = parse_id(id)?;
        let supplied = password
            .filter(|p| !p.is_empty())
            .ok_or_else(|| NoteError::validation("Password is required"))?;

        let check = |note: &Note| passwords_match(&note.password, supplied);
        match self.store.take_if(id, &check).await? {
            TakeOutcome::Taken(note) => {
                tracing::info!(note_id = %id, "Note delivered and destroyed");
                Ok(Retrieval::Delivered(delivered(note)))
            }
            TakeOutcome::Refused => {
                tracing::info!(note_id = %id, "Password mismatch, note kept");
                Err(NoteError::Forbidden)
            }
            TakeOutcome::Absent => Err(NoteError::NotFound),
        }
    }

    /// Idempotent: an absent note is a normal outcome, not an error.
    pub async fn delete(&self, id: &str) -> Result<Deletion, NoteError> {
        let id = match parse_id(id) {
            Ok(id) => id,
            Err(NoteError::NotFound) => return Ok(Deletion::AlreadyGone),
            Err(e) => return Err(e),
        };

        if self.store.delete(id).await? {
            tracing::info!(note_id = %id, "Note deleted");
            Ok(Deletion::Deleted)
        } else {
            tracing::debug!(note_id = %id, "Note already gone");
            Ok(Deletion::AlreadyGone)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        guard::UserAgentGuard,
        repository::MemoryStore,
        scheduler::SchedulerError,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    const BROWSER: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";
    const SLACK: &str = "Slackbot-LinkExpanding 1.0 (+https://api.slack.com/robots)";

    #[derive(Default)]
    struct RecordingScheduler {
        jobs: Mutex<Vec<CleanupJob>>,
    }

    #[async_trait]
    impl CleanupScheduler for RecordingScheduler {
        async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError> {
            self.jobs.lock().await.push(job);
            Ok(())
        }
    }

    struct FailingScheduler;

    #[async_trait]
    impl CleanupScheduler for FailingScheduler {
        async fn schedule(&self, job: CleanupJob) -> Result<(), SchedulerError> {
            Err(SchedulerError::InvalidFireTime(job.fire_at))
        }
    }

    fn settings() -> NoteSettings {
        NoteSettings {
            base_url: "https://notes.test".to_string(),
            default_ttl_minutes: 60,
            max_ttl_minutes: 1440,
        }
    }

    fn service_with(
        store: Arc<MemoryStore>,
        scheduler: Arc<dyn CleanupScheduler>,
    ) -> NoteService {
        NoteService::new(
            store,
            scheduler,
            Arc::new(UserAgentGuard::default()),
            settings(),
        )
    }

    fn service() -> (NoteService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(RecordingScheduler::default()));
        (service, store)
    }

    fn request(content: &str, password: &str, ttl: Option<i64>) -> CreateNoteRequest {
        CreateNoteRequest {
            content: Some(content.to_string()),
            password: Some(password.to_string()),
            salt: Some("abcd".to_string()),
            ttl,
        }
    }

    fn human() -> RequestMeta<'static> {
        RequestMeta::with_user_agent(BROWSER)
    }

    #[tokio::test]
    async fn create_computes_expiry_and_link() {
        let (service, store) = service();

        let created = service.create(request("secret", "pw1", Some(1))).await.unwrap();

        assert_eq!(created.expires_at, created.created_at + 60);
        assert_eq!(
            created.link,
            format!("https://notes.test/read/{}", created.note_id)
        );
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn create_defaults_ttl() {
        let (service, _) = service();
        let created = service.create(request("secret", "pw", None)).await.unwrap();
        assert_eq!(created.expires_at - created.created_at, 3600);
    }

    #[tokio::test]
    async fn create_rejects_missing_fields() {
        let (service, store) = service();

        let err = service
            .create(CreateNoteRequest {
                password: Some("pw".to_string()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Content is required");

        let err = service.create(request("secret", "", None)).await.unwrap_err();
        assert_eq!(err.to_string(), "Password is required");

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn create_rejects_out_of_range_ttl() {
        let (service, _) = service();

        for ttl in [0, -5, 1441] {
            let err = service.create(request("s", "p", Some(ttl))).await.unwrap_err();
            assert!(matches!(err, NoteError::Validation(_)), "ttl {ttl}");
        }
    }

    #[tokio::test]
    async fn create_rejects_ttl_that_overflows_expiry() {
        let store = Arc::new(MemoryStore::new());
        let service = NoteService::new(
            store.clone(),
            Arc::new(RecordingScheduler::default()),
            Arc::new(UserAgentGuard::default()),
            NoteSettings {
                max_ttl_minutes: i64::MAX,
                ..settings()
            },
        );

        for ttl in [i64::MAX / 2, i64::MAX / 60] {
            let err = service.create(request("s", "p", Some(ttl))).await.unwrap_err();
            assert_eq!(err.to_string(), "TTL is too large", "ttl {ttl}");
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn create_schedules_cleanup_at_expiry() {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Arc::new(RecordingScheduler::default());
        let service = service_with(store, scheduler.clone());

        let created = service.create(request("s", "p", Some(5))).await.unwrap();

        let jobs = scheduler.jobs.lock().await;
        assert_eq!(
            *jobs,
            vec![CleanupJob {
                note_id: created.note_id,
                fire_at: created.expires_at,
            }]
        );
    }

    #[tokio::test]
    async fn scheduler_failure_does_not_fail_create() {
        let store = Arc::new(MemoryStore::new());
        let service = service_with(store.clone(), Arc::new(FailingScheduler));

        let created = service.create(request("s", "p", None)).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert!(store.get(created.note_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn password_read_delivers_once() {
        let (service, _) = service();
        let created = service.create(request("secret", "pw1", Some(1))).await.unwrap();
        let id = created.note_id.to_string();

        let Retrieval::Delivered(note) = service
            .read_with_password(&id, Some("pw1"), &human())
            .await
            .unwrap()
        else {
            panic!("expected delivery");
        };
        assert_eq!(note.content, "secret");
        assert_eq!(note.salt.as_deref(), Some("abcd"));
        assert_eq!(note.ttl, created.expires_at);

        let err = service
            .read_with_password(&id, Some("pw1"), &human())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound));
    }

    #[tokio::test]
    async fn wrong_password_keeps_the_note() {
        let (service, store) = service();
        let created = service.create(request("secret", "pw1", None)).await.unwrap();
        let id = created.note_id.to_string();

        let err = service
            .read_with_password(&id, Some("pw2"), &human())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::Forbidden));
        assert_eq!(store.len().await, 1);

        let retrieval = service
            .read_with_password(&id, Some("pw1"), &human())
            .await
            .unwrap();
        assert!(matches!(retrieval, Retrieval::Delivered(_)));
    }

    #[tokio::test]
    async fn password_read_requires_password() {
        let (service, store) = service();
        let created = service.create(request("secret", "pw1", None)).await.unwrap();

        let err = service
            .read_with_password(&created.note_id.to_string(), None, &human())
            .await
            .unwrap_err();

        assert!(matches!(err, NoteError::Validation(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn unverified_read_destroys_once() {
        let (service, store) = service();
        let created = service.create(request("secret", "pw1", None)).await.unwrap();
        let id = created.note_id.to_string();

        let retrieval = service.read_unverified(&id, &human()).await.unwrap();
        assert!(matches!(retrieval, Retrieval::Delivered(ref n) if n.content == "secret"));
        assert!(store.is_empty().await);

        let err = service.read_unverified(&id, &human()).await.unwrap_err();
        assert!(matches!(err, NoteError::NotFound));
    }

    #[tokio::test]
    async fn bots_never_consume_notes() {
        let (service, store) = service();
        let created = service.create(request("secret", "pw1", None)).await.unwrap();
        let id = created.note_id.to_string();
        let bot = RequestMeta::with_user_agent(SLACK);

        let retrieval = service.read_unverified(&id, &bot).await.unwrap();
        assert!(matches!(retrieval, Retrieval::Preview));
        let retrieval = service
            .read_with_password(&id, Some("pw1"), &bot)
            .await
            .unwrap();
        assert!(matches!(retrieval, Retrieval::Preview));
        assert_eq!(store.len().await, 1);

        let retrieval = service
            .read_with_password(&id, Some("pw1"), &human())
            .await
            .unwrap();
        assert!(matches!(retrieval, Retrieval::Delivered(_)));
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let (service, _) = service();

        let err = service
            .read_unverified(&Uuid::new_v4().to_string(), &human())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound));

        let err = service
            .read_with_password("not-a-uuid", Some("pw"), &human())
            .await
            .unwrap_err();
        assert!(matches!(err, NoteError::NotFound));

        let err = service.read_unverified("  ", &human()).await.unwrap_err();
        assert!(matches!(err, NoteError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let (service, _) = service();
        let created = service.create(request("secret", "pw", None)).await.unwrap();
        let id = created.note_id.to_string();

        assert_eq!(service.delete(&id).await.unwrap(), Deletion::Deleted);
        assert_eq!(service.delete(&id).await.unwrap(), Deletion::AlreadyGone);
        assert_eq!(service.delete(&id).await.unwrap(), Deletion::AlreadyGone);
        assert_eq!(service.delete("garbage").await.unwrap(), Deletion::AlreadyGone);
        assert!(matches!(
            service.delete("").await,
            Err(NoteError::Validation(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reads_deliver_exactly_once() {
        let (service, _) = service();
        let service = Arc::new(service);

        for verified in [false, true] {
            let created = service.create(request("secret", "pw", None)).await.unwrap();
            let id = created.note_id.to_string();

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let service = service.clone();
                    let id = id.clone();
                    tokio::spawn(async move {
                        let meta = RequestMeta::with_user_agent(BROWSER);
                        if verified {
                            service.read_with_password(&id, Some("pw"), &meta).await
                        } else {
                            service.read_unverified(&id, &meta).await
                        }
                    })
                })
                .collect();

            let mut delivered = 0;
            let mut not_found = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(Retrieval::Delivered(_)) => delivered += 1,
                    Err(NoteError::NotFound) => not_found += 1,
                    other => panic!("unexpected outcome: {other:?}"),
                }
            }

            assert_eq!(delivered, 1, "verified = {verified}");
            assert_eq!(not_found, 15, "verified = {verified}");
        }
    }

    #[test]
    fn password_comparison() {
        assert!(passwords_match("hunter2", "hunter2"));
        assert!(!passwords_match("hunter2", "hunter3"));
        assert!(!passwords_match("hunter2", "hunter"));
        assert!(!passwords_match("", "x"));
    }
}
