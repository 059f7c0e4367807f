//! Source adapters
//!
//! Each adapter yields raw per-activity records in the shared export format
//! (`id`/`strava_id`, `date`, `distance_km`, `splits.lapDTOs[]`, ...). The
//! reconciliation engine only ever sees [`Activity`] values built from them.

pub mod garmin;
pub mod strava;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::models::{parse_datetime, Activity, Lap, Platform, SourceId, SourceTag};

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
  #[error("Missing configuration: {0}")]
  MissingConfig(String),

  #[error("Source cache not found: {0}")]
  CacheMissing(String),

  #[error("Failed to read {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("HTTP request failed: {0}")]
  Request(#[from] reqwest::Error),

  #[error("API error: {0}")]
  Api(String),

  #[error("Not authenticated with {0}")]
  NotAuthenticated(Platform),

  #[error("Invalid record: {0}")]
  InvalidRecord(String),
}

/// ---------------------------------------------------------------------------
/// Raw Record Format
/// ---------------------------------------------------------------------------

/// Native ids arrive as JSON numbers or strings depending on the exporter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
  Number(i64),
  Text(String),
}

impl RawId {
  pub fn as_string(&self) -> String {
    match self {
      RawId::Number(n) => n.to_string(),
      RawId::Text(s) => s.clone(),
    }
  }
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawLap {
  #[serde(default)]
  pub lapIndex: Option<u32>,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub duration: Option<f64>,
  #[serde(default)]
  pub averageSpeed: Option<f64>,
  #[serde(default)]
  pub averageHR: Option<f64>,
  #[serde(default)]
  pub maxHR: Option<f64>,
  #[serde(default)]
  pub averageRunCadence: Option<f64>,
  #[serde(default)]
  pub strideLength: Option<f64>,
  #[serde(default)]
  pub elevationGain: Option<f64>,
  #[serde(default)]
  pub elevationLoss: Option<f64>,
}

#[allow(non_snake_case)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawSplits {
  #[serde(default)]
  pub lapDTOs: Vec<RawLap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct RawActivity {
  #[serde(default)]
  pub id: Option<RawId>,
  #[serde(default)]
  pub strava_id: Option<RawId>,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(rename = "type", default)]
  pub activity_type: Option<String>,
  pub date: String,
  #[serde(default)]
  pub distance_km: Option<f64>,
  #[serde(default)]
  pub duration_seconds: Option<f64>,
  #[serde(default)]
  pub avg_pace_min_km: Option<String>,
  #[serde(default)]
  pub avg_hr: Option<f64>,
  #[serde(default)]
  pub max_hr: Option<f64>,
  #[serde(default)]
  pub avg_cadence: Option<f64>,
  #[serde(default)]
  pub elevation_gain_m: Option<f64>,
  #[serde(default)]
  pub elevation_loss_m: Option<f64>,
  #[serde(default)]
  pub calories: Option<f64>,
  #[serde(default)]
  pub splits: Option<RawSplits>,
}

/// Raw cache file layout: `{ "activities": [...] }`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawCache {
  #[serde(default)]
  pub activities: Vec<RawActivity>,
}

/// Records fetched from one platform in one run
#[derive(Debug, Clone)]
pub struct SourceBatch {
  pub platform: Platform,
  pub activities: Vec<Activity>,
  /// Records dropped because they could not be converted
  pub rejected: usize,
}

impl SourceBatch {
  /// Convert raw records, logging and counting the ones that are unusable
  pub fn from_raw(platform: Platform, raw: Vec<RawActivity>) -> Self {
    let mut activities = Vec::with_capacity(raw.len());
    let mut rejected = 0;

    for record in raw {
      match record.into_activity(platform) {
        Ok(activity) => activities.push(activity),
        Err(e) => {
          log::warn!("[{}] Skipping record: {}", platform, e);
          rejected += 1;
        }
      }
    }

    Self {
      platform,
      activities,
      rejected,
    }
  }

  pub fn empty(platform: Platform) -> Self {
    Self {
      platform,
      activities: vec![],
      rejected: 0,
    }
  }
}

/// Non-positive readings are treated as absent
fn positive(value: Option<f64>) -> Option<f64> {
  value.filter(|v| *v > 0.0)
}

impl RawLap {
  fn into_lap(self, position: usize) -> Lap {
    Lap {
      index: self.lapIndex.unwrap_or(position as u32 + 1),
      distance_m: self.distance.unwrap_or(0.0),
      duration_s: self.duration,
      average_speed: self.averageSpeed.unwrap_or(0.0),
      average_hr: positive(self.averageHR),
      max_hr: positive(self.maxHR),
      average_cadence: positive(self.averageRunCadence),
      stride_length_cm: positive(self.strideLength),
      elevation_gain_m: self.elevationGain,
      elevation_loss_m: self.elevationLoss,
    }
  }
}

impl RawActivity {
  pub fn start_time(&self) -> Option<NaiveDateTime> {
    parse_datetime(&self.date)
  }

  /// Native id for `platform`: Garmin records use `id`, Strava prefers `strava_id`
  pub fn native_id(&self, platform: Platform) -> Option<String> {
    let id = match platform {
      Platform::Garmin => self.id.as_ref(),
      Platform::Strava => self.strava_id.as_ref().or(self.id.as_ref()),
    };
    id.map(RawId::as_string).filter(|s| !s.is_empty())
  }

  pub fn is_running(&self) -> bool {
    self
      .activity_type
      .as_deref()
      .map_or(true, |t| t.eq_ignore_ascii_case("running") || t.eq_ignore_ascii_case("run"))
  }

  pub fn into_activity(self, platform: Platform) -> Result<Activity, SourceError> {
    let native_id = self
      .native_id(platform)
      .ok_or_else(|| SourceError::InvalidRecord(format!("no {} id ({})", platform, self.date)))?;
    let start = self
      .start_time()
      .ok_or_else(|| SourceError::InvalidRecord(format!("unparseable date '{}'", self.date)))?;

    // A Garmin record already linked to Strava keeps the link
    let cross_ref_id = match platform {
      Platform::Garmin => self
        .strava_id
        .as_ref()
        .map(|id| SourceId::new(Platform::Strava, id.as_string())),
      Platform::Strava => None,
    };

    let running = self.is_running();
    let laps: Vec<Lap> = self
      .splits
      .map(|s| s.lapDTOs)
      .unwrap_or_default()
      .into_iter()
      .enumerate()
      .map(|(i, lap)| lap.into_lap(i))
      .collect();
    let splits_source = if laps.is_empty() { None } else { Some(platform) };
    let activity_type = if running {
      "running".to_string()
    } else {
      self.activity_type.unwrap_or_default().to_lowercase()
    };

    Ok(Activity {
      id: SourceId::new(platform, native_id),
      source: if cross_ref_id.is_some() {
        SourceTag::Both
      } else {
        SourceTag::from(platform)
      },
      cross_ref_id,
      name: self.name.unwrap_or_default(),
      activity_type,
      start,
      distance_km: self.distance_km.unwrap_or(0.0),
      duration_seconds: self.duration_seconds.unwrap_or(0.0),
      avg_pace_min_km: self.avg_pace_min_km.filter(|p| !p.is_empty()),
      avg_hr: positive(self.avg_hr),
      max_hr: positive(self.max_hr),
      avg_cadence: positive(self.avg_cadence),
      elevation_gain_m: self.elevation_gain_m,
      elevation_loss_m: self.elevation_loss_m,
      calories: self.calories,
      laps,
      splits_source,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Cache Files and Lookback
/// ---------------------------------------------------------------------------

pub fn load_cache_file(path: &Path) -> Result<Vec<RawActivity>, SourceError> {
  let display = path.display().to_string();
  if !path.exists() {
    return Err(SourceError::CacheMissing(display));
  }

  let raw = fs::read_to_string(path).map_err(|source| SourceError::Io {
    path: display.clone(),
    source,
  })?;
  let cache: RawCache =
    serde_json::from_str(&raw).map_err(|source| SourceError::Parse { path: display, source })?;
  Ok(cache.activities)
}

/// Keep running records that started within `days` of `now`
pub fn within_lookback(
  records: Vec<RawActivity>,
  days: u32,
  now: NaiveDateTime,
) -> Vec<RawActivity> {
  let cutoff = now - Duration::days(i64::from(days));
  records
    .into_iter()
    .filter(|r| r.is_running())
    .filter(|r| r.start_time().map_or(true, |start| start >= cutoff))
    .collect()
}

/// Convert m/s to a `"M:SS"` pace string
pub fn pace_from_speed(mps: Option<f64>) -> Option<String> {
  let mps = positive(mps)?;
  let min_per_km = 1000.0 / (mps * 60.0);
  let minutes = min_per_km.trunc() as u32;
  let seconds = ((min_per_km - minutes as f64) * 60.0).trunc() as u32;
  Some(format!("{}:{:02}", minutes, seconds))
}
