use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls, Row};
use uuid::Uuid;

use super::{NoteCheck, NoteStore, StoreError, TakeOutcome, embedded::migrations};
use crate::models::{Note, unix_now};

const NOTE_COLUMNS: &str = "id, content, password, salt, created_at, expires_at";

/// Two connections: plain statements are pipelined over `client` without any
/// in-process lock, while compare-and-delete needs exclusive use of a
/// connection for its transaction and takes `tx_client`.
pub struct PgStore {
    client: Client,
    tx_client: Mutex<Client>,
}

async fn open_connection(database_dsn: &str) -> Result<Client, StoreError> {
    let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = con.await {
            tracing::error!("connection error: {}", e);
        }
    });

    Ok(client)
}

impl PgStore {
    pub async fn connect(database_dsn: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: open_connection(database_dsn).await?,
            tx_client: Mutex::new(open_connection(database_dsn).await?),
        })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut client = self.tx_client.lock().await;
        let migrations_report = migrations::runner().run_async(&mut *client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: row.get("id"),
        content: row.get("content"),
        password: row.get("password"),
        salt: row.get("salt"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn insert(&self, note: &Note) -> Result<(), StoreError> {
        let rows = self
            .client
            .execute(
                "INSERT INTO notes (id, content, password, salt, created_at, expires_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
                &[
                    &note.id,
                    &note.content,
                    &note.password,
                    &note.salt,
                    &note.created_at,
                    &note.expires_at,
                ],
            )
            .await?;

        if rows == 0 {
            return Err(StoreError::Conflict(note.id));
        }

        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        let row = self
            .client
            .query_opt(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 AND expires_at > $2"),
                &[&id, &unix_now()],
            )
            .await?;

        Ok(row.as_ref().map(note_from_row))
    }

    async fn take(&self, id: Uuid) -> Result<Option<Note>, StoreError> {
        // An expired row is still removed here; it just isn't handed out.
        let row = self
            .client
            .query_opt(
                &format!("DELETE FROM notes WHERE id = $1 RETURNING {NOTE_COLUMNS}"),
                &[&id],
            )
            .await?;

        let now = unix_now();
        Ok(row
            .as_ref()
            .map(note_from_row)
            .filter(|n| !n.is_expired(now)))
    }

    async fn take_if(&self, id: Uuid, check: NoteCheck<'_>) -> Result<TakeOutcome, StoreError> {
        let mut client = self.tx_client.lock().await;
        let tx = client.transaction().await?;

        let Some(row) = tx
            .query_opt(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 FOR UPDATE"),
                &[&id],
            )
            .await?
        else {
            return Ok(TakeOutcome::Absent);
        };
        let note = note_from_row(&row);

        if note.is_expired(unix_now()) {
            tx.execute("DELETE FROM notes WHERE id = $1", &[&id]).await?;
            tx.commit().await?;
            return Ok(TakeOutcome::Absent);
        }

        if !check(&note) {
            tx.rollback().await?;
            return Ok(TakeOutcome::Refused);
        }

        tx.execute("DELETE FROM notes WHERE id = $1", &[&id]).await?;
        tx.commit().await?;

        Ok(TakeOutcome::Taken(note))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows = self
            .client
            .execute("DELETE FROM notes WHERE id = $1", &[&id])
            .await?;

        Ok(rows == 1)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let rows = self
            .client
            .execute("DELETE FROM notes WHERE expires_at <= $1", &[&now])
            .await?;

        Ok(rows)
    }
}
