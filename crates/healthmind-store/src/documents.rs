//! Medical document persistence and status-machine transitions.
//!
//! `status` is monotonic: a document only moves forward along
//! `uploading → parsing → parsed → extracting → completed`, or to `failed`
//! from any stage. Nothing in this repository enforces that monotonicity
//! beyond exposing one update method per legal transition — callers (the
//! ingestion pipeline) are expected to drive the machine edge by edge.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploading,
    Parsing,
    Parsed,
    Extracting,
    Completed,
    Failed,
}

impl DocumentStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Parsing => "parsing",
            Self::Parsed => "parsed",
            Self::Extracting => "extracting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

}

impl rusqlite::types::FromSql for DocumentStatus {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let s = value.as_str()?;
        Ok(match s {
            "uploading" => Self::Uploading,
            "parsing" => Self::Parsing,
            "parsed" => Self::Parsed,
            "extracting" => Self::Extracting,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            other => {
                return Err(rusqlite::types::FromSqlError::Other(
                    format!("unknown document status: {other}").into(),
                ));
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalDocument {
    pub id: String,
    pub owner: String,
    pub title: String,
    pub document_type: String,
    pub file_path: String,
    pub file_type: String,
    pub raw_text: Option<String>,
    pub parsed_data: Option<String>,
    pub document_date: Option<i64>,
    pub status: DocumentStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewMedicalDocument {
    pub owner: String,
    pub title: String,
    pub document_type: String,
    pub file_path: String,
    pub file_type: String,
    pub document_date: Option<i64>,
}

#[derive(Clone)]
pub struct DocumentStore {
    db: Database,
}

impl DocumentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a document row in the initial `uploading` status. Called
    /// synchronously by the upload endpoint before the ingestion job is
    /// enqueued.
    #[instrument(skip(self, attrs))]
    pub async fn create(&self, attrs: NewMedicalDocument) -> StoreResult<MedicalDocument> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();
        let doc = MedicalDocument {
            id: id.clone(),
            owner: attrs.owner.clone(),
            title: attrs.title.clone(),
            document_type: attrs.document_type.clone(),
            file_path: attrs.file_path.clone(),
            file_type: attrs.file_type.clone(),
            raw_text: None,
            parsed_data: None,
            document_date: attrs.document_date,
            status: DocumentStatus::Uploading,
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO medical_document \
                     (id, owner, title, document_type, file_path, file_type, document_date, status, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'uploading', ?8)",
                    rusqlite::params![
                        id,
                        attrs.owner,
                        attrs.title,
                        attrs.document_type,
                        attrs.file_path,
                        attrs.file_type,
                        attrs.document_date,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(doc)
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<MedicalDocument> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let doc = conn
                    .query_row(
                        "SELECT id, owner, title, document_type, file_path, file_type, \
                         raw_text, parsed_data, document_date, status, created_at \
                         FROM medical_document WHERE id = ?1",
                        rusqlite::params![id],
                        row_to_document,
                    )
                    .map_err(|e| match e {
                        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                            entity: "medical_document",
                            id: id.clone(),
                        },
                        other => StoreError::Sqlite(other),
                    })?;
                Ok(doc)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn list_for_owner(&self, owner: &str) -> StoreResult<Vec<MedicalDocument>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, title, document_type, file_path, file_type, \
                     raw_text, parsed_data, document_date, status, created_at \
                     FROM medical_document WHERE owner = ?1 ORDER BY created_at DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], row_to_document)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM medical_document WHERE id = ?1",
                    rusqlite::params![id],
                )?;
                if deleted == 0 {
                    return Err(StoreError::NotFound {
                        entity: "medical_document",
                        id,
                    });
                }
                Ok(())
            })
            .await
    }

    /// `uploading → parsing` or `parsed → extracting`: a bare status flip
    /// with no artifact written.
    #[instrument(skip(self))]
    pub async fn transition(&self, id: &str, to: DocumentStatus) -> StoreResult<()> {
        self.set_status(id, to).await
    }

    /// `parsing → parsed`: write the OCR output.
    #[instrument(skip(self, raw_text))]
    pub async fn mark_parsed(&self, id: &str, raw_text: &str) -> StoreResult<()> {
        let id = id.to_string();
        let raw_text = raw_text.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE medical_document SET raw_text = ?2, status = 'parsed' WHERE id = ?1",
                    rusqlite::params![id, raw_text],
                )?;
                Ok(())
            })
            .await
    }

    /// `extracting → completed`: write the structured extraction payload.
    #[instrument(skip(self, parsed_data))]
    pub async fn mark_completed(&self, id: &str, parsed_data: &str) -> StoreResult<()> {
        let id = id.to_string();
        let parsed_data = parsed_data.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE medical_document SET parsed_data = ?2, status = 'completed' WHERE id = ?1",
                    rusqlite::params![id, parsed_data],
                )?;
                Ok(())
            })
            .await
    }

    /// Any stage `→ failed`, recording `{error, stage}` diagnostics.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, id: &str, stage: &str, error: &str) -> StoreResult<()> {
        let id = id.to_string();
        let diagnostics = serde_json::json!({ "error": error, "stage": stage }).to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE medical_document SET parsed_data = ?2, status = 'failed' WHERE id = ?1",
                    rusqlite::params![id, diagnostics],
                )?;
                Ok(())
            })
            .await
    }

    async fn set_status(&self, id: &str, status: DocumentStatus) -> StoreResult<()> {
        let id = id.to_string();
        let status_str = status.as_str();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "UPDATE medical_document SET status = ?2 WHERE id = ?1",
                    rusqlite::params![id, status_str],
                )?;
                Ok(())
            })
            .await
    }
}

fn row_to_document(row: &rusqlite::Row<'_>) -> rusqlite::Result<MedicalDocument> {
    Ok(MedicalDocument {
        id: row.get(0)?,
        owner: row.get(1)?,
        title: row.get(2)?,
        document_type: row.get(3)?,
        file_path: row.get(4)?,
        file_type: row.get(5)?,
        raw_text: row.get(6)?,
        parsed_data: row.get(7)?,
        document_date: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> DocumentStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        DocumentStore::new(db)
    }

    fn sample() -> NewMedicalDocument {
        NewMedicalDocument {
            owner: "u1".into(),
            title: "Bloodwork March".into(),
            document_type: "lab_report".into(),
            file_path: "/uploads/a.pdf".into(),
            file_type: "application/pdf".into(),
            document_date: None,
        }
    }

    #[tokio::test]
    async fn create_starts_in_uploading() {
        let store = store().await;
        let doc = store.create(sample()).await.unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploading);
    }

    #[tokio::test]
    async fn full_happy_path_transition() {
        let store = store().await;
        let doc = store.create(sample()).await.unwrap();

        store.transition(&doc.id, DocumentStatus::Parsing).await.unwrap();
        store.mark_parsed(&doc.id, "raw markdown").await.unwrap();
        store.transition(&doc.id, DocumentStatus::Extracting).await.unwrap();
        store.mark_completed(&doc.id, "{\"labs\":[]}").await.unwrap();

        let fetched = store.get(&doc.id).await.unwrap();
        assert_eq!(fetched.status, DocumentStatus::Completed);
        assert_eq!(fetched.raw_text.as_deref(), Some("raw markdown"));
    }

    #[tokio::test]
    async fn mark_failed_records_stage_diagnostics() {
        let store = store().await;
        let doc = store.create(sample()).await.unwrap();
        store.transition(&doc.id, DocumentStatus::Parsing).await.unwrap();
        store.mark_failed(&doc.id, "parsing", "connection refused").await.unwrap();

        let fetched = store.get(&doc.id).await.unwrap();
        assert_eq!(fetched.status, DocumentStatus::Failed);
        let diagnostics: serde_json::Value =
            serde_json::from_str(&fetched.parsed_data.unwrap()).unwrap();
        assert_eq!(diagnostics["stage"], "parsing");
    }

    #[tokio::test]
    async fn delete_does_not_cascade_to_lab_results() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        let docs = DocumentStore::new(db.clone());
        let labs = crate::labs::LabResultStore::new(db);

        let doc = docs.create(sample()).await.unwrap();
        labs.insert_or_skip(crate::labs::NewLabResult {
            owner: "u1".into(),
            document_id: Some(doc.id.clone()),
            test_name: "HbA1c".into(),
            test_code: Some("4548-4".into()),
            value: 5.6,
            unit: "%".into(),
            reference_min: None,
            reference_max: None,
            status: None,
            recorded_at: 0,
        })
        .await
        .unwrap();

        docs.delete(&doc.id).await.unwrap();

        let rows = labs.list_for_owner("u1", crate::labs::LabFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1, "lab rows must outlive their document");
        assert!(rows[0].document_id.is_none(), "FK must null out, not cascade");
    }
}
