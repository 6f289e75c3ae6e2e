//! Symptom entry persistence.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::db::Database;
use crate::error::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymptomEntry {
    pub id: String,
    pub owner: String,
    pub symptom_type: String,
    pub severity: i64,
    pub notes: Option<String>,
    pub recorded_at: i64,
    pub duration_minutes: Option<i64>,
    /// JSON-encoded list of strings.
    pub triggers: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone)]
pub struct NewSymptomEntry {
    pub owner: String,
    pub symptom_type: String,
    pub severity: i64,
    pub notes: Option<String>,
    pub recorded_at: i64,
    pub duration_minutes: Option<i64>,
    pub triggers: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SymptomFilter {
    pub symptom_type: Option<String>,
    pub since: Option<i64>,
    pub until: Option<i64>,
}

#[derive(Clone)]
pub struct SymptomStore {
    db: Database,
}

impl SymptomStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, attrs))]
    pub async fn create(&self, attrs: NewSymptomEntry) -> StoreResult<SymptomEntry> {
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().timestamp();
        let entry = SymptomEntry {
            id: id.clone(),
            owner: attrs.owner.clone(),
            symptom_type: attrs.symptom_type.clone(),
            severity: attrs.severity,
            notes: attrs.notes.clone(),
            recorded_at: attrs.recorded_at,
            duration_minutes: attrs.duration_minutes,
            triggers: attrs.triggers.clone(),
            created_at: now,
        };

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO symptom_entry \
                     (id, owner, symptom_type, severity, notes, recorded_at, duration_minutes, triggers, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        id,
                        attrs.owner,
                        attrs.symptom_type,
                        attrs.severity,
                        attrs.notes,
                        attrs.recorded_at,
                        attrs.duration_minutes,
                        attrs.triggers,
                        now,
                    ],
                )?;
                Ok(())
            })
            .await?;

        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn list_for_owner(
        &self,
        owner: &str,
        filter: SymptomFilter,
    ) -> StoreResult<Vec<SymptomEntry>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, symptom_type, severity, notes, recorded_at, \
                     duration_minutes, triggers, created_at \
                     FROM symptom_entry \
                     WHERE owner = ?1 \
                       AND (?2 IS NULL OR symptom_type = ?2) \
                       AND (?3 IS NULL OR recorded_at >= ?3) \
                       AND (?4 IS NULL OR recorded_at <= ?4) \
                     ORDER BY recorded_at DESC",
                )?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![owner, filter.symptom_type, filter.since, filter.until],
                        row_to_symptom,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Distinct symptom types seen for this owner, most-recently-used first.
    #[instrument(skip(self))]
    pub async fn distinct_types(&self, owner: &str) -> StoreResult<Vec<String>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT symptom_type FROM symptom_entry WHERE owner = ?1 \
                     GROUP BY symptom_type ORDER BY MAX(recorded_at) DESC",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_symptom(row: &rusqlite::Row<'_>) -> rusqlite::Result<SymptomEntry> {
    Ok(SymptomEntry {
        id: row.get(0)?,
        owner: row.get(1)?,
        symptom_type: row.get(2)?,
        severity: row.get(3)?,
        notes: row.get(4)?,
        recorded_at: row.get(5)?,
        duration_minutes: row.get(6)?,
        triggers: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    async fn store() -> SymptomStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        SymptomStore::new(db)
    }

    #[tokio::test]
    async fn create_and_list() {
        let store = store().await;
        store
            .create(NewSymptomEntry {
                owner: "u1".into(),
                symptom_type: "headache".into(),
                severity: 6,
                notes: None,
                recorded_at: 1_700_000_000,
                duration_minutes: Some(45),
                triggers: None,
            })
            .await
            .unwrap();

        let rows = store.list_for_owner("u1", SymptomFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].symptom_type, "headache");
    }

    #[tokio::test]
    async fn distinct_types_deduplicates() {
        let store = store().await;
        for _ in 0..3 {
            store
                .create(NewSymptomEntry {
                    owner: "u1".into(),
                    symptom_type: "migraine".into(),
                    severity: 5,
                    notes: None,
                    recorded_at: 1_700_000_000,
                    duration_minutes: None,
                    triggers: None,
                })
                .await
                .unwrap();
        }
        let types = store.distinct_types("u1").await.unwrap();
        assert_eq!(types, vec!["migraine".to_string()]);
    }
}
