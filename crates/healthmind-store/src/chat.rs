//! Chat session and message persistence.
//!
//! A [`ChatSession`] owns an ordered sequence of [`ChatMessage`]s. Deleting a
//! session cascades to its messages via the `ON DELETE CASCADE` foreign key
//! declared in the schema — no in-process traversal is needed.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// A conversation container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub owner: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub last_activity_at: i64,
}

/// One turn in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: String,
    pub content: String,
    /// For assistant turns, the JSON-encoded list of tool calls made
    /// (`[{name, arguments, result}]`). `None` for plain turns.
    pub metadata: Option<String>,
    pub created_at: i64,
}

/// Repository for chat sessions and their messages.
#[derive(Clone)]
pub struct ChatSessionStore {
    db: Database,
}

impl ChatSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn create(&self, owner: &str, title: Option<&str>) -> StoreResult<ChatSession> {
        let id = Uuid::now_v7().to_string();
        let owner = owner.to_string();
        let title = title.map(|s| s.to_string());
        let now = Utc::now().timestamp();

        let session = ChatSession {
            id: id.clone(),
            owner: owner.clone(),
            title: title.clone(),
            created_at: now,
            last_activity_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO chat_session (id, owner, title, created_at, last_activity_at) \
                     VALUES (?1, ?2, ?3, ?4, ?4)",
                    rusqlite::params![id, owner, title, now],
                )?;
                Ok(())
            })
            .await?;

        debug!(session_id = %session.id, "chat session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<ChatSession> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT id, owner, title, created_at, last_activity_at \
                     FROM chat_session WHERE id = ?1",
                    rusqlite::params![id],
                    row_to_session,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "chat_session",
                        id: id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<ChatSession>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, title, created_at, last_activity_at \
                     FROM chat_session WHERE owner = ?1 ORDER BY last_activity_at DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], row_to_session)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Fill `title` from the first user message when the session was
    /// created without one. A no-op once a title is set.
    #[instrument(skip(self, title))]
    pub async fn set_title_if_unset(&self, id: &str, title: &str) -> StoreResult<()> {
        let id = id.to_string();
        let title = title.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE chat_session SET title = ?2 WHERE id = ?1 AND title IS NULL",
                    rusqlite::params![id, title],
                )?;
                Ok(())
            })
            .await
    }

    /// Delete a session and all of its messages (cascade).
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM chat_session WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "chat_session",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// Append a message to a session and atomically advance `last_activity_at`.
    ///
    /// Returns the new message's row ID.
    #[instrument(skip(self, content, metadata))]
    pub async fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        metadata: Option<&str>,
    ) -> StoreResult<i64> {
        let session_id = session_id.to_string();
        let role = role.to_string();
        let content = content.to_string();
        let metadata = metadata.map(|s| s.to_string());
        let now = Utc::now().timestamp();

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO chat_message (session_id, role, content, metadata, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![session_id, role, content, metadata, now],
                )?;
                let msg_id = conn.last_insert_rowid();

                conn.execute(
                    "UPDATE chat_session SET last_activity_at = ?2 WHERE id = ?1",
                    rusqlite::params![session_id, now],
                )?;

                Ok(msg_id)
            })
            .await
    }

    /// Get all messages for a session, ordered by `created_at` then `id`
    /// (the secondary key breaks ties deterministically).
    #[instrument(skip(self))]
    pub async fn get_messages(&self, session_id: &str) -> StoreResult<Vec<ChatMessage>> {
        let session_id = session_id.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, session_id, role, content, metadata, created_at \
                     FROM chat_message WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![session_id], row_to_message)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    Ok(ChatSession {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        last_activity_at: row.get(4)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: row.get(2)?,
        content: row.get(3)?,
        metadata: row.get(4)?,
        created_at: row.get(5)?,
    })
}
