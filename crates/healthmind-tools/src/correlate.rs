//! Calendar-day alignment and Pearson correlation for `correlate_metrics`.
//!
//! All alignment is performed in UTC (see the timezone open question in
//! DESIGN.md); a "day" is `timestamp.div_euclid(86_400)` Unix days, which is
//! always correct for UTC since the epoch itself falls on a day boundary.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};

const SECONDS_PER_DAY: i64 = 86_400;

/// Minimum number of overlapping calendar days `correlate_metrics` requires
/// before it will report a coefficient.
pub const MIN_OVERLAP_DAYS: usize = 5;

fn day_bucket(recorded_at: i64) -> i64 {
    recorded_at.div_euclid(SECONDS_PER_DAY)
}

/// Render a Unix day index back to an ISO calendar date.
pub fn day_to_iso(day: i64) -> String {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid epoch date");
    (epoch + Duration::days(day)).format("%Y-%m-%d").to_string()
}

/// Bucket `(unix_timestamp, value)` pairs by calendar day, averaging samples
/// that land on the same day.
pub fn daily_buckets(samples: impl Iterator<Item = (i64, f64)>) -> BTreeMap<i64, f64> {
    let mut sums: BTreeMap<i64, (f64, u32)> = BTreeMap::new();
    for (ts, value) in samples {
        let entry = sums.entry(day_bucket(ts)).or_insert((0.0, 0));
        entry.0 += value;
        entry.1 += 1;
    }
    sums.into_iter().map(|(day, (sum, count))| (day, sum / count as f64)).collect()
}

/// Intersect two daily series on shared calendar days, returning aligned
/// value vectors in ascending day order.
pub fn align_daily(a: &BTreeMap<i64, f64>, b: &BTreeMap<i64, f64>) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    for (day, value_a) in a {
        if let Some(value_b) = b.get(day) {
            xs.push(*value_a);
            ys.push(*value_b);
        }
    }
    (xs, ys)
}

/// Pearson product-moment correlation coefficient. Returns `0.0` if either
/// series has zero variance.
pub fn pearson_correlation(xs: &[f64], ys: &[f64]) -> f64 {
    debug_assert_eq!(xs.len(), ys.len());
    let n = xs.len() as f64;
    if n == 0.0 {
        return 0.0;
    }
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        covariance += dx * dy;
        variance_x += dx * dx;
        variance_y += dy * dy;
    }

    if variance_x == 0.0 || variance_y == 0.0 {
        return 0.0;
    }
    covariance / (variance_x.sqrt() * variance_y.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_correlated_series_yields_one() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![2.0, 4.0, 6.0, 8.0, 10.0];
        assert!((pearson_correlation(&xs, &ys) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn perfectly_anticorrelated_series_yields_negative_one() {
        let xs = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ys = vec![5.0, 4.0, 3.0, 2.0, 1.0];
        assert!((pearson_correlation(&xs, &ys) + 1.0).abs() < 1e-9);
    }

    #[test]
    fn constant_series_has_zero_correlation() {
        let xs = vec![1.0, 1.0, 1.0];
        let ys = vec![3.0, 7.0, 2.0];
        assert_eq!(pearson_correlation(&xs, &ys), 0.0);
    }

    #[test]
    fn daily_buckets_averages_same_day_samples() {
        let samples = vec![(0, 10.0), (3600, 20.0), (SECONDS_PER_DAY, 5.0)];
        let buckets = daily_buckets(samples.into_iter());
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[&0], 15.0);
        assert_eq!(buckets[&1], 5.0);
    }

    #[test]
    fn align_daily_keeps_only_shared_days() {
        let mut a = BTreeMap::new();
        a.insert(0, 1.0);
        a.insert(1, 2.0);
        a.insert(2, 3.0);
        let mut b = BTreeMap::new();
        b.insert(1, 20.0);
        b.insert(2, 30.0);
        b.insert(3, 40.0);

        let (xs, ys) = align_daily(&a, &b);
        assert_eq!(xs, vec![2.0, 3.0]);
        assert_eq!(ys, vec![20.0, 30.0]);
    }

    #[test]
    fn four_overlapping_days_is_below_the_minimum() {
        let mut a = BTreeMap::new();
        let mut b = BTreeMap::new();
        for day in 0..4 {
            a.insert(day, day as f64);
            b.insert(day, day as f64 * 2.0);
        }
        let (xs, _) = align_daily(&a, &b);
        assert_eq!(xs.len(), 4);
        assert!(xs.len() < MIN_OVERLAP_DAYS);
    }

    #[test]
    fn five_overlapping_days_meets_the_minimum() {
        let mut a = BTreeMap::new();
        let mut b = BTreeMap::new();
        for day in 0..5 {
            a.insert(day, day as f64);
            b.insert(day, day as f64 * 2.0);
        }
        let (xs, _) = align_daily(&a, &b);
        assert_eq!(xs.len(), 5);
        assert!(xs.len() >= MIN_OVERLAP_DAYS);
    }

    #[test]
    fn day_to_iso_renders_epoch_and_offsets() {
        assert_eq!(day_to_iso(0), "1970-01-01");
        assert_eq!(day_to_iso(1), "1970-01-02");
    }
}
