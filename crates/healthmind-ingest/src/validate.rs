//! Stage 3: validation of extracted lab records.
//!
//! Each record from [`crate::extraction::extract_labs`] is checked against
//! the fixed rule set from the pipeline's validation contract: required
//! fields present, `value` finite and numeric, `unit` non-empty,
//! `recorded_at` parseable as an ISO date. Records that fail any check are
//! dropped, not repaired; the caller is told how many were dropped so it
//! can record that count in the document's diagnostics.

use chrono::{NaiveDate, TimeZone, Utc};

use crate::extraction::RawLabRecord;

/// A lab record that has passed every Stage 3 check and is ready to insert.
#[derive(Debug, Clone)]
pub struct ValidatedLabRecord {
    pub test_name: String,
    pub test_code: Option<String>,
    pub value: f64,
    pub unit: String,
    pub reference_min: Option<f64>,
    pub reference_max: Option<f64>,
    pub status: Option<String>,
    pub recorded_at: i64,
}

/// The outcome of validating a batch of extracted records.
pub struct ValidationOutcome {
    pub records: Vec<ValidatedLabRecord>,
    pub dropped: usize,
}

/// Validate every extracted record, dropping (and counting) the ones that
/// fail any check.
pub fn validate_records(raw: Vec<RawLabRecord>) -> ValidationOutcome {
    let mut records = Vec::with_capacity(raw.len());
    let mut dropped = 0;

    for record in raw {
        match validate_one(record) {
            Some(valid) => records.push(valid),
            None => dropped += 1,
        }
    }

    ValidationOutcome { records, dropped }
}

fn validate_one(record: RawLabRecord) -> Option<ValidatedLabRecord> {
    let test_name = record.test_name.filter(|s| !s.trim().is_empty())?;
    let unit = record.unit.filter(|s| !s.trim().is_empty())?;
    let value = record.value.as_ref().and_then(|v| v.as_f64()).filter(|v| v.is_finite())?;
    let recorded_at = parse_recorded_at(record.recorded_at.as_deref()?)?;

    Some(ValidatedLabRecord {
        test_name,
        test_code: record.test_code.filter(|s| !s.trim().is_empty()),
        value,
        unit,
        reference_min: record.reference_min,
        reference_max: record.reference_max,
        status: record.status.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()),
        recorded_at,
    })
}

/// Parse `recorded_at` as an ISO calendar day (`YYYY-MM-DD`) or a full
/// RFC 3339 timestamp, returning a Unix timestamp at UTC midnight for the
/// former.
fn parse_recorded_at(value: &str) -> Option<i64> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        let midnight = date.and_hms_opt(0, 0, 0)?;
        return Some(Utc.from_utc_datetime(&midnight).timestamp());
    }
    chrono::DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.timestamp())
}
