//! Test utilities and helpers for unit testing
//!
//! This module provides common test infrastructure including:
//! - Mock activity factories
//! - Raw cache fixtures on disk
//! - Helper assertions

use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::path::Path;

use crate::models::{parse_datetime, Activity, Lap, Platform, SourceId, SourceTag};
use crate::sources::{RawActivity, RawCache, SourceBatch};
use crate::store::ActivityStore;

/// ---------------------------------------------------------------------------
/// Time Helpers
/// ---------------------------------------------------------------------------

/// Parse a `"YYYY-MM-DD HH:MM:SS[.fff]"` literal
pub fn datetime(value: &str) -> NaiveDateTime {
  parse_datetime(value).unwrap_or_else(|| panic!("Bad test datetime: {}", value))
}

/// ---------------------------------------------------------------------------
/// Mock Data Factories
/// ---------------------------------------------------------------------------

/// A plain run with no HR, laps or cross reference
pub fn mock_activity(platform: Platform, native_id: &str, start: &str, distance_km: f64) -> Activity {
  Activity {
    id: SourceId::new(platform, native_id),
    cross_ref_id: None,
    source: SourceTag::from(platform),
    name: "Morning Run".to_string(),
    activity_type: "running".to_string(),
    start: datetime(start),
    distance_km,
    duration_seconds: distance_km * 330.0,
    avg_pace_min_km: None,
    avg_hr: None,
    max_hr: None,
    avg_cadence: None,
    elevation_gain_m: None,
    elevation_loss_m: None,
    calories: None,
    laps: vec![],
    splits_source: None,
  }
}

/// Laps from `(distance_m, speed_mps, avg_hr)` tuples
pub fn mock_laps(laps: &[(f64, f64, Option<f64>)]) -> Vec<Lap> {
  laps
    .iter()
    .enumerate()
    .map(|(i, (distance_m, speed, hr))| Lap {
      index: i as u32 + 1,
      distance_m: *distance_m,
      duration_s: Some(distance_m / speed),
      average_speed: *speed,
      average_hr: *hr,
      ..Default::default()
    })
    .collect()
}

/// `n` Garmin runs, one per day at 07:00 from 2026-01-01, ids `h0..`
pub fn mock_history(n: usize) -> Vec<Activity> {
  let first = NaiveDate::from_ymd_opt(2026, 1, 1)
    .and_then(|d| d.and_hms_opt(7, 0, 0))
    .unwrap();
  (0..n)
    .map(|i| {
      let start = first + Duration::days(i as i64);
      let mut activity = mock_activity(
        Platform::Garmin,
        &format!("h{}", i),
        &start.format("%Y-%m-%d %H:%M:%S").to_string(),
        5.0 + (i % 7) as f64,
      );
      activity.avg_hr = Some(140.0 + (i % 10) as f64);
      activity
    })
    .collect()
}

/// Strava copies of `activities`: 20 minutes later, same distance, ids `s-<native>`
pub fn strava_twins(activities: &[Activity]) -> Vec<Activity> {
  activities
    .iter()
    .map(|a| {
      let mut twin = a.clone();
      twin.id = SourceId::new(Platform::Strava, format!("s-{}", a.id.native_id));
      twin.cross_ref_id = None;
      twin.source = SourceTag::Strava;
      twin.start = a.start + Duration::minutes(20);
      twin
    })
    .collect()
}

pub fn mock_batch(platform: Platform, activities: Vec<Activity>) -> SourceBatch {
  SourceBatch {
    platform,
    activities,
    rejected: 0,
  }
}

pub fn mock_store(activities: Vec<Activity>) -> ActivityStore {
  ActivityStore::new(activities)
}

/// ---------------------------------------------------------------------------
/// Fixture Files
/// ---------------------------------------------------------------------------

/// Write a raw platform export the way the external fetchers do
pub fn write_raw_cache(path: &Path, activities: Vec<RawActivity>) {
  let json = serde_json::to_string_pretty(&RawCache { activities }).unwrap();
  std::fs::write(path, json).unwrap();
}

/// ---------------------------------------------------------------------------
/// Test Macros
/// ---------------------------------------------------------------------------

/// Assert two floats are approximately equal within a tolerance
#[macro_export]
macro_rules! assert_approx_eq {
  ($left:expr, $right:expr, $tolerance:expr) => {
    let diff = ($left - $right).abs();
    assert!(
      diff < $tolerance,
      "Values not approximately equal: {} vs {} (diff: {}, tolerance: {})",
      $left,
      $right,
      diff,
      $tolerance
    );
  };
}

/// ---------------------------------------------------------------------------
/// Tests for Test Utilities
/// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sources::load_cache_file;

  #[test]
  fn test_mock_factories_create_valid_data() {
    let run = mock_activity(Platform::Strava, "42", "2026-02-01 07:00:00", 10.0);
    assert_eq!(run.id.to_string(), "strava:42");
    assert_eq!(run.source, SourceTag::Strava);
    assert!(run.is_running());
    assert!(!run.has_hr());

    let laps = mock_laps(&[(1000.0, 2.5, Some(150.0)), (500.0, 2.5, None)]);
    assert_eq!(laps[1].index, 2);
    assert_eq!(laps[0].duration_s, Some(400.0));
    assert!(laps[0].has_hr() && !laps[1].has_hr());
  }

  #[test]
  fn test_history_and_twins_line_up() {
    let history = mock_history(3);
    assert_eq!(history[2].start, datetime("2026-01-03 07:00:00"));

    let twins = strava_twins(&history);
    assert_eq!(twins[0].id.to_string(), "strava:s-h0");
    assert_eq!(twins[0].start - history[0].start, Duration::minutes(20));
    assert_eq!(twins[0].distance_km, history[0].distance_km);
  }

  #[test]
  fn test_raw_cache_fixture_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    write_raw_cache(
      &path,
      vec![RawActivity {
        date: "2026-02-01 07:00:00".to_string(),
        ..Default::default()
      }],
    );
    assert_eq!(load_cache_file(&path).unwrap().len(), 1);
  }

  #[test]
  fn test_datetime_accepts_fractional_seconds() {
    let dt = datetime("2026-02-01 07:00:00.250");
    assert_eq!(dt.and_utc().timestamp_subsec_millis(), 250);
  }
}
