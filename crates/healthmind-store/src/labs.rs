//! Lab result persistence.
//!
//! Deduplication follows a fixed policy: when
//! `test_code` is present, uniqueness is `(owner, test_code, recorded_at)`;
//! when absent, it falls back to `(owner, test_name, recorded_at)`. Both
//! policies are enforced by partial `UNIQUE` indexes in the schema (see
//! `migration.rs`), so this repository never has to compute the key itself —
//! it just catches the resulting `SQLITE_CONSTRAINT` and reports a skip.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: String,
    pub owner: String,
    pub document_id: Option<String>,
    pub test_name: String,
    pub test_code: Option<String>,
    pub value: f64,
    pub unit: String,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub status: Option<String>,
    pub recorded_at: i64,
    pub created_at: i64,
}

/// Fields needed to insert a new lab result.
#[derive(Debug, Clone)]
pub struct NewLabResult {
    pub owner: String,
    pub document_id: Option<String>,
    pub test_name: String,
    pub test_code: Option<String>,
    pub value: f64,
    pub unit: String,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub status: Option<String>,
    pub recorded_at: i64,
}

/// Optional filters for listing lab results.
#[derive(Debug, Clone, Default)]
pub struct LabFilter {
    pub test_name: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u32>,
}

#[derive(Clone)]
pub struct LabResultStore {
    db: Database,
}

impl LabResultStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new lab result, returning `None` if it collides with an
    /// existing row under the dedup policy (the insert is skipped, not
    /// merged or updated).
    #[instrument(skip(self, attrs))]
    pub async fn insert_or_skip(&self, attrs: NewLabResult) -> StoreResult<Option<LabResult>> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();
        let result = LabResult {
            id: id.clone(),
            owner: attrs.owner.clone(),
            document_id: attrs.document_id.clone(),
            test_name: attrs.test_name.clone(),
            test_code: attrs.test_code.clone(),
            value: attrs.value,
            unit: attrs.unit.clone(),
            reference_min: attrs.reference_min,
            reference_max: attrs.reference_max,
            status: attrs.status.clone(),
            recorded_at: attrs.recorded_at,
            created_at: now,
        };

        let inserted = self
            .db
            .execute(move |conn| {
                let outcome = conn.execute(
                    "INSERT INTO lab_result \
                     (id, owner, document_id, test_name, test_code, value, unit, \
                      reference_min, reference_max, status, recorded_at, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    rusqlite::params![
                        id,
                        attrs.owner,
                        attrs.document_id,
                        attrs.test_name,
                        attrs.test_code,
                        attrs.value,
                        attrs.unit,
                        attrs.reference_min,
                        attrs.reference_max,
                        attrs.status,
                        attrs.recorded_at,
                        now,
                    ],
                );
                match outcome {
                    Ok(_) => Ok(true),
                    Err(rusqlite::Error::SqliteFailure(e, _))
                        if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                    {
                        Ok(false)
                    }
                    Err(e) => Err(e.into()),
                }
            })
            .await?;

        Ok(if inserted { Some(result) } else { None })
    }

    #[instrument(skip(self))]
    pub async fn list_for_owner(
        &self,
        owner: &str,
        filter: LabFilter,
    ) -> StoreResult<Vec<LabResult>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut sql = String::from(
                    "SELECT id, owner, document_id, test_name, test_code, value, unit, \
                     reference_min, reference_max, status, recorded_at, created_at \
                     FROM lab_result \
                     WHERE owner = ?1 \
                       AND (?2 IS NULL OR test_name = ?2) \
                       AND (?3 IS NULL OR recorded_at >= ?3) \
                       AND (?4 IS NULL OR recorded_at <= ?4) \
                     ORDER BY recorded_at DESC",
                );
                if let Some(limit) = filter.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![owner, filter.test_name, filter.since, filter.until],
                        row_to_lab,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Distinct `test_name` values recorded for this owner, most recent first.
    #[instrument(skip(self))]
    pub async fn distinct_test_names(&self, owner: &str) -> StoreResult<Vec<String>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT test_name FROM lab_result WHERE owner = ?1 \
                     GROUP BY test_name ORDER BY MAX(recorded_at) DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_lab(row: &rusqlite::Row<'_>) -> rusqlite::Result<LabResult> {
    Ok(LabResult {
        id: row.get(0)?,
        owner: row.get(1)?,
        document_id: row.get(2)?,
        test_name: row.get(3)?,
        test_code: row.get(4)?,
        value: row.get(5)?,
        unit: row.get(6)?,
        reference_min: row.get(7)?,
        reference_max: row.get(8)?,
        status: row.get(9)?,
        recorded_at: row.get(10)?,
        created_at: row.get(11)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> LabResultStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        LabResultStore::new(db)
    }

    fn sample(owner: &str, value: f64) -> NewLabResult {
        NewLabResult {
            owner: owner.to_string(),
            document_id: None,
            test_name: "HbA1c".to_string(),
            test_code: Some("4548-4".to_string()),
            value,
            unit: "%".to_string(),
            reference_min: Some(4.0),
            reference_max: Some(5.6),
            status: Some("normal".to_string()),
            recorded_at: 1_700_000_000,
        }
    }

    #[tokio::test]
    async fn insert_then_list() {
        let store = store().await;
        store.insert_or_skip(sample("u1", 5.6)).await.unwrap();
        let rows = store.list_for_owner("u1", LabFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5.6);
    }

    #[tokio::test]
    async fn duplicate_test_code_recorded_at_is_skipped() {
        let store = store().await;
        let first = store.insert_or_skip(sample("u1", 5.6)).await.unwrap();
        assert!(first.is_some());

        let second = store.insert_or_skip(sample("u1", 5.7)).await.unwrap();
        assert!(second.is_none(), "conflicting insert must be skipped");

        let rows = store.list_for_owner("u1", LabFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 5.6, "original value must survive skip-on-conflict");
    }

    #[tokio::test]
    async fn dedup_falls_back_to_test_name_when_code_absent() {
        let store = store().await;
        let mut a = sample("u1", 5.6);
        a.test_code = None;
        let mut b = sample("u1", 9.9);
        b.test_code = None;

        assert!(store.insert_or_skip(a).await.unwrap().is_some());
        assert!(store.insert_or_skip(b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn zero_day_window_returns_empty() {
        let store = store().await;
        store.insert_or_skip(sample("u1", 5.6)).await.unwrap();
        let filter = LabFilter {
            since: Some(i64::MAX),
            ..Default::default()
        };
        let rows = store.list_for_owner("u1", filter).await.unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn distinct_test_names_deduplicates() {
        let store = store().await;
        store.insert_or_skip(sample("u1", 5.6)).await.unwrap();
        let mut glucose = sample("u1", 95.0);
        glucose.test_name = "Glucose".into();
        glucose.test_code = Some("2345-7".into());
        store.insert_or_skip(glucose).await.unwrap();

        let names = store.distinct_test_names("u1").await.unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"HbA1c".to_string()));
        assert!(names.contains(&"Glucose".to_string()));
    }
}
