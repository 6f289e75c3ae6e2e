//! Durable job queue backing the document ingestion pipeline.
//!
//! Jobs move `queued → running → completed`, or `running → queued` when a
//! worker gives up and another retries, or `→ failed` once `attempts`
//! exhausts the caller's retry budget. The queue itself has no opinion on
//! retry limits — it just tracks attempts and lets the pipeline decide.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl rusqlite::types::FromSql for JobStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let s = value.as_str()?;
        Ok(match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => {
                return Err(rusqlite::types::FromSqlError::Other(
                    format!("unknown ingestion job status: {other}").into(),
                ));
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: String,
    pub document_id: String,
    pub status: JobStatus,
    pub attempts: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Clone)]
pub struct IngestionJobStore {
    db: Database,
}

impl IngestionJobStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn enqueue(&self, document_id: &str) -> StoreResult<IngestionJob> {
        let id = Uuid::now_v7().to_string();
        let document_id = document_id.to_string();
        let now = Utc::now().timestamp();
        let job = IngestionJob {
            id: id.clone(),
            document_id: document_id.clone(),
            status: JobStatus::Queued,
            attempts: 0,
            created_at: now,
            updated_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO document_ingestion_job \
                     (id, document_id, status, attempts, created_at, updated_at) \
                     VALUES (?1, ?2, 'queued', 0, ?3, ?3)",
                    rusqlite::params![id, document_id, now],
                )?;
                Ok(())
            })
            .await?;

        Ok(job)
    }

    /// Atomically claim the oldest `queued` job, flipping it to `running`
    /// and incrementing `attempts`. Returns `None` if the queue is empty.
    ///
    /// Uses a transaction so two workers racing this call never claim the
    /// same row: the `SELECT` and `UPDATE` happen under a single writer
    /// lock on the underlying `Arc<Mutex<Connection>>`, which already
    /// serializes all access to this database.
    #[instrument(skip(self))]
    pub async fn claim_next(&self) -> StoreResult<Option<IngestionJob>> {
        let now = Utc::now().timestamp();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;
                let claimed: Option<(String, String, i64)> = tx
                    .query_row(
                        "SELECT id, document_id, attempts FROM document_ingestion_job \
                         WHERE status = 'queued' ORDER BY created_at ASC LIMIT 1",
                        [],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                    )
                    .map(Some)
                    .or_else(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => Ok(None),
                        other => Err(other),
                    })?;

                let Some((id, document_id, attempts)) = claimed else {
                    tx.commit()?;
                    return Ok(None);
                };

                let attempts = attempts + 1;
                tx.execute(
                    "UPDATE document_ingestion_job SET status = 'running', attempts = ?2, updated_at = ?3 \
                     WHERE id = ?1",
                    rusqlite::params![id, attempts, now],
                )?;
                tx.commit()?;

                Ok(Some(IngestionJob {
                    id,
                    document_id,
                    status: JobStatus::Running,
                    attempts,
                    created_at: now,
                    updated_at: now,
                }))
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn mark_completed(&self, id: &str) -> StoreResult<()> {
        self.set_status(id, JobStatus::Completed).await
    }

    /// Return a job to `queued` so another worker can retry it.
    #[instrument(skip(self))]
    pub async fn requeue(&self, id: &str) -> StoreResult<()> {
        self.set_status(id, JobStatus::Queued).await
    }

    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: &str) -> StoreResult<()> {
        self.set_status(id, JobStatus::Failed).await
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<IngestionJob> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT id, document_id, status, attempts, created_at, updated_at \
                     FROM document_ingestion_job WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_job,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "document_ingestion_job",
                        id: id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    async fn set_status(&self, id: &str, status: JobStatus) -> StoreResult<()> {
        let id = id.to_string();
        let status_str = status.as_str();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE document_ingestion_job SET status = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![id, status_str, now],
                )?;
                if updated == 0 {
                    return Err(StoreError::NotFound {
                        entity: "document_ingestion_job",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestionJob> {
    Ok(IngestionJob {
        id: row.get(0)?,
        document_id: row.get(1)?,
        status: row.get(2)?,
        attempts: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}
