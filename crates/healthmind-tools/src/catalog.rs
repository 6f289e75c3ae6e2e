//! The declarative health tool catalog and its dispatcher.
//!
//! Grounded on `openintent-adapters`'s `Adapter::tools()`/`Adapter::execute_tool`
//! split, narrowed to a single `dispatch` entry point since these tools carry
//! no connection state. Every tool reads the store; none of them write to
//! it or make an outbound network call.

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::{Map, Value, json};
use tracing::warn;

use healthmind_store::{HealthStore, LabFilter, StoreResult, SymptomFilter, WearableFilter};

use crate::correlate::{MIN_OVERLAP_DAYS, align_daily, daily_buckets, day_to_iso, pearson_correlation};
use crate::error::ToolError;
use crate::types::ToolDefinition;

const SECONDS_PER_DAY: i64 = 86_400;

/// The fixed set of tools this assistant can call, plus the dispatcher that
/// resolves a name and arguments to a JSON result.
pub struct HealthToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl Default for HealthToolCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthToolCatalog {
    pub fn new() -> Self {
        Self { definitions: build_definitions() }
    }

    /// The catalog, for handing to the gateway's tool-enabled chat call.
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// Resolve `name` against the fixed catalog and run it. Never returns an
    /// `Err` — failures are folded into the `{"error": ...}` result shapes
    /// the catalog's contract promises, since the caller feeds this straight
    /// back to the model as a tool result.
    pub async fn dispatch(&self, name: &str, args: Value, owner: &str, store: &HealthStore) -> Value {
        let result = match name {
            "get_recent_labs" => get_recent_labs(&args, owner, store).await,
            "get_lab_trend" => get_lab_trend(&args, owner, store).await,
            "get_symptom_timeline" => get_symptom_timeline(&args, owner, store).await,
            "get_wearable_summary" => get_wearable_summary(&args, owner, store).await,
            "get_daily_summary" => get_daily_summary(&args, owner, store).await,
            "correlate_metrics" => correlate_metrics(&args, owner, store).await,
            _ => return json!({ "error": "unknown_tool" }),
        };

        match result {
            Ok(value) => value,
            Err(ToolError::InvalidArguments(detail)) => json!({ "error": "invalid_arguments", "detail": detail }),
            Err(other) => {
                warn!(tool = name, error = %other, "tool dispatch failed");
                json!({ "error": "tool_failed", "detail": other.to_string() })
            }
        }
    }
}

fn build_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_recent_labs".into(),
            description: "List recent lab results, newest first.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "days": { "type": "integer", "minimum": 0, "default": 90 },
                    "test_name": { "type": "string" },
                },
            }),
        },
        ToolDefinition {
            name: "get_lab_trend".into(),
            description: "Chronological trend for a single lab test, with its latest value.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "test_name": { "type": "string" },
                    "months": { "type": "integer", "minimum": 0, "default": 12 },
                },
                "required": ["test_name"],
            }),
        },
        ToolDefinition {
            name: "get_symptom_timeline".into(),
            description: "Logged symptom entries with a per-type frequency summary.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "symptom_type": { "type": "string" },
                    "days": { "type": "integer", "minimum": 0, "default": 30 },
                },
            }),
        },
        ToolDefinition {
            name: "get_wearable_summary".into(),
            description: "Aggregate statistics for a wearable metric (e.g. heart_rate, steps, hrv, sleep).".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "metric": { "type": "string" },
                    "days": { "type": "integer", "minimum": 0, "default": 30 },
                },
                "required": ["metric"],
            }),
        },
        ToolDefinition {
            name: "get_daily_summary".into(),
            description: "Combined snapshot of symptoms, labs, and wearable aggregates for a single day.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string", "format": "date" },
                },
                "required": ["date"],
            }),
        },
        ToolDefinition {
            name: "correlate_metrics".into(),
            description: "Pearson correlation between two metrics (lab, symptom, or wearable) over their overlapping days.".into(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "metric_a": { "type": "string" },
                    "metric_b": { "type": "string" },
                    "days": { "type": "integer", "minimum": 0, "default": 90 },
                },
                "required": ["metric_a", "metric_b"],
            }),
        },
    ]
}

fn now_ts() -> i64 {
    Utc::now().timestamp()
}

fn arg_u64(args: &Value, key: &str, default: u64) -> Result<u64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| ToolError::InvalidArguments(format!("`{key}` must be a non-negative integer"))),
    }
}

fn arg_str_opt(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn arg_str_required(args: &Value, key: &str) -> Result<String, ToolError> {
    arg_str_opt(args, key)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidArguments(format!("`{key}` is required")))
}

async fn get_recent_labs(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let days = arg_u64(args, "days", 90)?;
    let test_name = arg_str_opt(args, "test_name");
    let since = now_ts() - days as i64 * SECONDS_PER_DAY;

    let rows = store
        .labs
        .list_for_owner(owner, LabFilter { test_name, since: Some(since), until: None, limit: Some(100) })
        .await?;
    Ok(serde_json::to_value(rows)?)
}

async fn get_lab_trend(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let test_name = arg_str_required(args, "test_name")?;
    let months = arg_u64(args, "months", 12)?;
    let since = now_ts() - months as i64 * 30 * SECONDS_PER_DAY;

    // `list_for_owner` orders by `recorded_at DESC`, so the first row is
    // already the latest value for the summary.
    let mut rows = store
        .labs
        .list_for_owner(owner, LabFilter { test_name: Some(test_name), since: Some(since), until: None, limit: None })
        .await?;

    let summary = match rows.first() {
        Some(latest) => json!({
            "latest_value": latest.value,
            "latest_status": latest.status,
            "unit": latest.unit,
        }),
        None => json!({ "latest_value": null, "latest_status": null, "unit": null }),
    };

    rows.reverse();
    let points: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                "recorded_at": r.recorded_at,
                "value": r.value,
                "unit": r.unit,
                "status": r.status,
                "reference_min": r.reference_min,
                "reference_max": r.reference_max,
            })
        })
        .collect();

    Ok(json!({ "points": points, "summary": summary }))
}

async fn get_symptom_timeline(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let symptom_type = arg_str_opt(args, "symptom_type");
    let days = arg_u64(args, "days", 30)?;
    let since = now_ts() - days as i64 * SECONDS_PER_DAY;

    let rows = store
        .symptoms
        .list_for_owner(owner, SymptomFilter { symptom_type, since: Some(since), until: None })
        .await?;

    let mut by_type: std::collections::BTreeMap<String, (i64, i64)> = std::collections::BTreeMap::new();
    for row in &rows {
        let entry = by_type.entry(row.symptom_type.clone()).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += row.severity;
    }
    let frequency: Vec<Value> = by_type
        .into_iter()
        .map(|(symptom_type, (count, severity_sum))| {
            json!({
                "symptom_type": symptom_type,
                "count": count,
                "avg_severity": severity_sum as f64 / count as f64,
            })
        })
        .collect();

    let entries: Vec<Value> = rows
        .iter()
        .map(|row| {
            let triggers: Option<Value> = row.triggers.as_deref().and_then(|s| serde_json::from_str(s).ok());
            json!({
                "symptom_type": row.symptom_type,
                "severity": row.severity,
                "notes": row.notes,
                "recorded_at": row.recorded_at,
                "duration_minutes": row.duration_minutes,
                "triggers": triggers,
            })
        })
        .collect();

    Ok(json!({ "entries": entries, "frequency": frequency }))
}

async fn get_wearable_summary(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let metric = arg_str_required(args, "metric")?;
    let days = arg_u64(args, "days", 30)?;
    let since = now_ts() - days as i64 * SECONDS_PER_DAY;

    let rows = store
        .wearable
        .list_series(owner, &metric, WearableFilter { since: Some(since), until: None })
        .await?;

    if rows.is_empty() {
        return Ok(json!({ "min": null, "max": null, "mean": null, "count": 0, "daily": [] }));
    }

    let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = values.iter().sum::<f64>() / values.len() as f64;

    let daily: Vec<Value> = daily_buckets(rows.iter().map(|r| (r.recorded_at, r.value)))
        .into_iter()
        .map(|(day, value)| json!({ "date": day_to_iso(day), "value": value }))
        .collect();

    Ok(json!({ "min": min, "max": max, "mean": mean, "count": rows.len(), "daily": daily }))
}

async fn get_daily_summary(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let date_str = arg_str_required(args, "date")?;
    let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
        .map_err(|_| ToolError::InvalidArguments(format!("`date` must be an ISO day (YYYY-MM-DD), got {date_str:?}")))?;
    let start = Utc
        .from_utc_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is always a valid time"))
        .timestamp();
    let end = start + SECONDS_PER_DAY - 1;

    let symptoms = store
        .symptoms
        .list_for_owner(owner, SymptomFilter { symptom_type: None, since: Some(start), until: Some(end) })
        .await?;
    let labs = store
        .labs
        .list_for_owner(owner, LabFilter { test_name: None, since: Some(start), until: Some(end), limit: None })
        .await?;

    let series_types = store.wearable.distinct_series_types(owner).await?;
    let mut wearable = Map::new();
    for series_type in series_types {
        let rows = store
            .wearable
            .list_series(owner, &series_type, WearableFilter { since: Some(start), until: Some(end) })
            .await?;
        if rows.is_empty() {
            continue;
        }
        let mean = rows.iter().map(|r| r.value).sum::<f64>() / rows.len() as f64;
        wearable.insert(series_type, json!(mean));
    }

    Ok(json!({
        "date": date_str,
        "symptoms": symptoms,
        "labs": labs,
        "wearable": Value::Object(wearable),
    }))
}

async fn correlate_metrics(args: &Value, owner: &str, store: &HealthStore) -> Result<Value, ToolError> {
    let metric_a = arg_str_required(args, "metric_a")?;
    let metric_b = arg_str_required(args, "metric_b")?;
    let days = arg_u64(args, "days", 90)?;
    let since = now_ts() - days as i64 * SECONDS_PER_DAY;

    let series_a = resolve_daily_series(&metric_a, owner, store, since).await?;
    let series_b = resolve_daily_series(&metric_b, owner, store, since).await?;

    let (xs, ys) = align_daily(&series_a, &series_b);
    if xs.len() < MIN_OVERLAP_DAYS {
        return Ok(json!({ "insufficient_data": true }));
    }

    let coefficient = pearson_correlation(&xs, &ys);
    Ok(json!({
        "coefficient": coefficient,
        "sample_size": xs.len(),
        "metric_a": metric_a,
        "metric_b": metric_b,
    }))
}

/// Resolve `metric` to a lab series (by `test_name`), a symptom series (by
/// `symptom_type`, using severity as the value), or a wearable series, in
/// that priority order.
async fn resolve_daily_series(
    metric: &str,
    owner: &str,
    store: &HealthStore,
    since: i64,
) -> StoreResult<std::collections::BTreeMap<i64, f64>> {
    let lab_names = store.labs.distinct_test_names(owner).await?;
    if lab_names.iter().any(|n| n == metric) {
        let rows = store
            .labs
            .list_for_owner(owner, LabFilter { test_name: Some(metric.to_string()), since: Some(since), until: None, limit: None })
            .await?;
        return Ok(daily_buckets(rows.iter().map(|r| (r.recorded_at, r.value))));
    }

    let symptom_types = store.symptoms.distinct_types(owner).await?;
    if symptom_types.iter().any(|t| t == metric) {
        let rows = store
            .symptoms
            .list_for_owner(owner, SymptomFilter { symptom_type: Some(metric.to_string()), since: Some(since), until: None })
            .await?;
        return Ok(daily_buckets(rows.iter().map(|r| (r.recorded_at, r.severity as f64))));
    }

    let rows = store
        .wearable
        .list_series(owner, metric, WearableFilter { since: Some(since), until: None })
        .await?;
    Ok(daily_buckets(rows.iter().map(|r| (r.recorded_at, r.value))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthmind_store::{Database, NewLabResult, NewSymptomEntry};

    async fn store_with(owner: &str) -> HealthStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        HealthStore::new(db)
    }

    #[tokio::test]
    async fn unknown_tool_reports_unknown_tool() {
        let store = store_with("u1").await;
        let catalog = HealthToolCatalog::new();
        let result = catalog.dispatch("not_a_tool", json!({}), "u1", &store).await;
        assert_eq!(result, json!({ "error": "unknown_tool" }));
    }

    #[tokio::test]
    async fn get_recent_labs_zero_days_returns_empty_list() {
        let store = store_with("u1").await;
        store
            .labs
            .insert_or_skip(NewLabResult {
                owner: "u1".into(),
                document_id: None,
                test_name: "HbA1c".into(),
                test_code: None,
                value: 5.8,
                unit: "%".into(),
                reference_min: None,
                reference_max: None,
                status: Some("normal".into()),
                recorded_at: now_ts(),
            })
            .await
            .unwrap();

        let catalog = HealthToolCatalog::new();
        let result = catalog.dispatch("get_recent_labs", json!({ "days": 0 }), "u1", &store).await;
        assert_eq!(result, json!([]));
    }

    #[tokio::test]
    async fn get_lab_trend_unknown_test_name_returns_empty_points_and_null_latest() {
        let store = store_with("u1").await;
        let catalog = HealthToolCatalog::new();
        let result = catalog
            .dispatch("get_lab_trend", json!({ "test_name": "nonexistent" }), "u1", &store)
            .await;
        assert_eq!(result["points"], json!([]));
        assert_eq!(result["summary"]["latest_value"], json!(null));
    }

    #[tokio::test]
    async fn get_lab_trend_missing_required_argument_is_invalid_arguments() {
        let store = store_with("u1").await;
        let catalog = HealthToolCatalog::new();
        let result = catalog.dispatch("get_lab_trend", json!({}), "u1", &store).await;
        assert_eq!(result["error"], json!("invalid_arguments"));
    }

    #[tokio::test]
    async fn get_lab_trend_summary_reflects_latest_value() {
        let store = store_with("u1").await;
        for (value, recorded_at) in [(5.6, 1_700_000_000), (5.8, 1_700_500_000)] {
            store
                .labs
                .insert_or_skip(NewLabResult {
                    owner: "u1".into(),
                    document_id: None,
                    test_name: "HbA1c".into(),
                    test_code: None,
                    value,
                    unit: "%".into(),
                    reference_min: None,
                    reference_max: None,
                    status: Some("normal".into()),
                    recorded_at,
                })
                .await
                .unwrap();
        }

        let catalog = HealthToolCatalog::new();
        let result = catalog
            .dispatch("get_lab_trend", json!({ "test_name": "HbA1c", "months": 120 }), "u1", &store)
            .await;
        assert_eq!(result["summary"]["latest_value"], json!(5.8));
        assert_eq!(result["points"].as_array().unwrap().len(), 2);
        // points are chronological ascending.
        assert_eq!(result["points"][0]["value"], json!(5.6));
    }

    #[tokio::test]
    async fn get_symptom_timeline_aggregates_frequency() {
        let store = store_with("u1").await;
        for severity in [4, 6] {
            store
                .symptoms
                .create(NewSymptomEntry {
                    owner: "u1".into(),
                    symptom_type: "headache".into(),
                    severity,
                    notes: None,
                    recorded_at: now_ts(),
                    duration_minutes: None,
                    triggers: None,
                })
                .await
                .unwrap();
        }

        let catalog = HealthToolCatalog::new();
        let result = catalog.dispatch("get_symptom_timeline", json!({}), "u1", &store).await;
        let frequency = result["frequency"].as_array().unwrap();
        assert_eq!(frequency.len(), 1);
        assert_eq!(frequency[0]["count"], json!(2));
        assert_eq!(frequency[0]["avg_severity"], json!(5.0));
    }

    #[tokio::test]
    async fn get_wearable_summary_empty_series_is_null_not_an_error() {
        let store = store_with("u1").await;
        let catalog = HealthToolCatalog::new();
        let result = catalog
            .dispatch("get_wearable_summary", json!({ "metric": "heart_rate" }), "u1", &store)
            .await;
        assert_eq!(result["count"], json!(0));
        assert_eq!(result["min"], json!(null));
    }

    #[tokio::test]
    async fn correlate_metrics_reports_insufficient_data_under_five_days() {
        let store = store_with("u1").await;
        for (severity, recorded_at) in [(3, 0), (4, SECONDS_PER_DAY), (5, 2 * SECONDS_PER_DAY)] {
            store
                .symptoms
                .create(NewSymptomEntry {
                    owner: "u1".into(),
                    symptom_type: "headache".into(),
                    severity,
                    notes: None,
                    recorded_at,
                    duration_minutes: None,
                    triggers: None,
                })
                .await
                .unwrap();
        }

        let catalog = HealthToolCatalog::new();
        let result = catalog
            .dispatch(
                "correlate_metrics",
                json!({ "metric_a": "headache", "metric_b": "sleep", "days": 90 }),
                "u1",
                &store,
            )
            .await;
        assert_eq!(result, json!({ "insufficient_data": true }));
    }

    #[tokio::test]
    async fn correlate_metrics_resolves_metric_to_symptom_series() {
        let store = store_with("u1").await;
        for (severity, recorded_at) in [
            (1, 0),
            (2, SECONDS_PER_DAY),
            (3, 2 * SECONDS_PER_DAY),
            (4, 3 * SECONDS_PER_DAY),
            (5, 4 * SECONDS_PER_DAY),
        ] {
            store
                .symptoms
                .create(NewSymptomEntry {
                    owner: "u1".into(),
                    symptom_type: "headache".into(),
                    severity,
                    notes: None,
                    recorded_at,
                    duration_minutes: None,
                    triggers: None,
                })
                .await
                .unwrap();
        }

        let catalog = HealthToolCatalog::new();
        let result = catalog
            .dispatch(
                "correlate_metrics",
                json!({ "metric_a": "headache", "metric_b": "headache", "days": 90 }),
                "u1",
                &store,
            )
            .await;
        assert_eq!(result["sample_size"], json!(5));
        assert!((result["coefficient"].as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn dispatch_never_mutates_the_store() {
        let store = store_with("u1").await;
        store
            .labs
            .insert_or_skip(NewLabResult {
                owner: "u1".into(),
                document_id: None,
                test_name: "HbA1c".into(),
                test_code: None,
                value: 5.8,
                unit: "%".into(),
                reference_min: None,
                reference_max: None,
                status: Some("normal".into()),
                recorded_at: now_ts(),
            })
            .await
            .unwrap();

        let catalog = HealthToolCatalog::new();
        for tool in ["get_recent_labs", "get_lab_trend", "correlate_metrics"] {
            catalog
                .dispatch(
                    tool,
                    json!({ "test_name": "HbA1c", "metric_a": "HbA1c", "metric_b": "HbA1c" }),
                    "u1",
                    &store,
                )
                .await;
        }

        let rows = store.labs.list_for_owner("u1", Default::default()).await.unwrap();
        assert_eq!(rows.len(), 1, "tool dispatch must never insert, update, or delete rows");
    }
}
