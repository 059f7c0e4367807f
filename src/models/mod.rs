pub mod activity;
pub mod insights;

pub use activity::{Activity, Lap, Platform, SourceId, SourceTag};
pub use insights::{RunMetrics, WeekMetrics};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &[
  "%Y-%m-%d %H:%M:%S%.f",
  "%Y-%m-%dT%H:%M:%S%.fZ",
  "%Y-%m-%dT%H:%M:%S%.f",
];

/// Parse an activity start time as written by the source adapters
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
  let value = value.trim();
  DATE_FORMATS
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.naive_local()))
}

/// ISO week key (`YYYY-Wnn`, Monday start)
pub fn week_key(date: NaiveDate) -> String {
  let iso = date.iso_week();
  format!("{}-W{:02}", iso.year(), iso.week())
}

/// Serde adapter for `"YYYY-MM-DD HH:MM:SS[.ffffff]"` timestamps
pub mod date_format {
  use chrono::NaiveDateTime;
  use serde::{Deserialize, Deserializer, Serializer};

  const FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

  pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&value.format(FORMAT).to_string())
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(deserializer)?;
    super::parse_datetime(&raw)
      .ok_or_else(|| serde::de::Error::custom(format!("Unrecognized date: {}", raw)))
  }
}
