//! Single-writer-per-session guard for in-flight chat streams.
//!
//! A row in `active_streams` means "a turn is currently being generated for
//! this session." [`ActiveStreamStore::acquire`] inserts the row and fails
//! with [`StoreError::Conflict`] if one already exists; [`release`] removes
//! it unconditionally. Callers are expected to release via a `Drop` guard so
//! a cancelled or panicking stream never leaves the row behind.

use chrono::Utc;
use tracing::instrument;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

#[derive(Clone)]
pub struct ActiveStreamStore {
    db: Database,
}

impl ActiveStreamStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Claim the write lock for `session_id`. Returns
    /// `StoreError::Conflict` if another stream is already active for it.
    #[instrument(skip(self))]
    pub async fn acquire(&self, session_id: &str) -> StoreResult<()> {
        let session_id = session_id.to_string();
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let outcome = conn.execute(
                    "INSERT INTO active_streams (session_id, started_at) VALUES (?1, ?2)",
                    rusqlite::params![session_id, now],
                );
                match outcome {
                    Ok(_) => Ok(()),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Err(StoreError::Conflict(format!(
                            "a stream is already active for session {session_id}"
                        )))
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    /// Release the write lock. A no-op if none is held (idempotent, safe
    /// to call from a `Drop` impl that may race a normal completion path).
    #[instrument(skip(self))]
    pub async fn release(&self, session_id: &str) -> StoreResult<()> {
        let session_id = session_id.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "DELETE FROM active_streams WHERE session_id = ?1",
                    rusqlite::params![session_id],
                )?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn is_active(&self, session_id: &str) -> StoreResult<bool> {
        let session_id = session_id.to_string();
        self.db
            .execute(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT count(*) FROM active_streams WHERE session_id = ?1",
                    rusqlite::params![session_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> ActiveStreamStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        ActiveStreamStore::new(db)
    }

    #[tokio::test]
    async fn second_acquire_conflicts() {
        let store = store().await;
        store.acquire("s1").await.unwrap();
        let err = store.acquire("s1").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn release_then_reacquire_succeeds() {
        let store = store().await;
        store.acquire("s1").await.unwrap();
        store.release("s1").await.unwrap();
        store.acquire("s1").await.unwrap();
    }

    #[tokio::test]
    async fn release_without_acquire_is_a_noop() {
        let store = store().await;
        store.release("s1").await.unwrap();
    }

    #[tokio::test]
    async fn is_active_reflects_state() {
        let store = store().await;
        assert!(!store.is_active("s1").await.unwrap());
        store.acquire("s1").await.unwrap();
        assert!(store.is_active("s1").await.unwrap());
    }
}
