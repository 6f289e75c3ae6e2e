//! Read-only wearable time series.
//!
//! Rows are populated by an external sync process that this crate does not
//! own; the store only ever reads from `wearable_series`.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::Database;
use crate::error::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WearableSample {
    pub id: i64,
    pub owner: String,
    pub series_type: String,
    pub recorded_at: i64,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default)]
pub struct WearableFilter {
    pub since: Option<i64>,
    pub until: Option<i64>,
}

#[derive(Clone)]
pub struct WearableStore {
    db: Database,
}

impl WearableStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn list_series(
        &self,
        owner: &str,
        series_type: &str,
        filter: WearableFilter,
    ) -> StoreResult<Vec<WearableSample>> {
        let owner = owner.to_string();
        let series_type = series_type.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, owner, series_type, recorded_at, value, unit \
                     FROM wearable_series \
                     WHERE owner = ?1 AND series_type = ?2 \
                       AND (?3 IS NULL OR recorded_at >= ?3) \
                       AND (?4 IS NULL OR recorded_at <= ?4) \
                     ORDER BY recorded_at ASC",
                )?;
                let rows = stmt
                    .query_map(
                        rusqlite::params![owner, series_type, filter.since, filter.until],
                        row_to_sample,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }

    /// Distinct `series_type` values recorded for this owner.
    #[instrument(skip(self))]
    pub async fn distinct_series_types(&self, owner: &str) -> StoreResult<Vec<String>> {
        let owner = owner.to_string();
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT DISTINCT series_type FROM wearable_series WHERE owner = ?1 ORDER BY series_type",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![owner], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn row_to_sample(row: &rusqlite::Row<'_>) -> rusqlite::Result<WearableSample> {
    Ok(WearableSample {
        id: row.get(0)?,
        owner: row.get(1)?,
        series_type: row.get(2)?,
        recorded_at: row.get(3)?,
        value: row.get(4)?,
        unit: row.get(5)?,
    })
}
