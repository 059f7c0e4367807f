use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// ---------------------------------------------------------------------------
/// Platforms and Source Tags
/// ---------------------------------------------------------------------------

/// Originating platform of a raw record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
  Garmin,
  Strava,
}

impl Platform {
  pub fn as_str(&self) -> &'static str {
    match self {
      Platform::Garmin => "garmin",
      Platform::Strava => "strava",
    }
  }
}

impl fmt::Display for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Platform {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "garmin" => Ok(Self::Garmin),
      "strava" => Ok(Self::Strava),
      _ => Err(format!("Unknown platform: {}", s)),
    }
  }
}

/// Which platforms contributed to a canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
  Garmin,
  Strava,
  Both,
}

impl SourceTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      SourceTag::Garmin => "garmin",
      SourceTag::Strava => "strava",
      SourceTag::Both => "both",
    }
  }

  /// Tag after merging data from `platform` into a record carrying this tag
  pub fn escalate(self, platform: Platform) -> Self {
    match (self, platform) {
      (SourceTag::Garmin, Platform::Garmin) => SourceTag::Garmin,
      (SourceTag::Strava, Platform::Strava) => SourceTag::Strava,
      _ => SourceTag::Both,
    }
  }
}

impl From<Platform> for SourceTag {
  fn from(platform: Platform) -> Self {
    match platform {
      Platform::Garmin => SourceTag::Garmin,
      Platform::Strava => SourceTag::Strava,
    }
  }
}

impl fmt::Display for SourceTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// ---------------------------------------------------------------------------
/// Source-Qualified Id
/// ---------------------------------------------------------------------------

/// Activity identifier namespaced by platform, serialized as `garmin:1234`.
///
/// Bare numeric ids from older store files are rejected; `rebuild` writes
/// the namespaced form from the raw caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId {
  pub platform: Platform,
  pub native_id: String,
}

impl SourceId {
  pub fn new(platform: Platform, native_id: impl Into<String>) -> Self {
    Self {
      platform,
      native_id: native_id.into(),
    }
  }
}

impl fmt::Display for SourceId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.platform, self.native_id)
  }
}

impl FromStr for SourceId {
  type Err = String;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let (platform, native_id) = s
      .split_once(':')
      .ok_or_else(|| format!("Source id missing platform prefix: {}", s))?;
    if native_id.is_empty() {
      return Err(format!("Source id missing native id: {}", s));
    }
    Ok(Self::new(platform.parse()?, native_id))
  }
}

impl TryFrom<String> for SourceId {
  type Error = String;
  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<SourceId> for String {
  fn from(id: SourceId) -> Self {
    id.to_string()
  }
}

/// ---------------------------------------------------------------------------
/// Canonical Activity
/// ---------------------------------------------------------------------------

/// One lap/split of an activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Lap {
  pub index: u32,
  pub distance_m: f64,
  #[serde(default)]
  pub duration_s: Option<f64>,
  /// m/s
  pub average_speed: f64,
  #[serde(default)]
  pub average_hr: Option<f64>,
  #[serde(default)]
  pub max_hr: Option<f64>,
  /// steps per minute
  #[serde(default)]
  pub average_cadence: Option<f64>,
  #[serde(default)]
  pub stride_length_cm: Option<f64>,
  #[serde(default)]
  pub elevation_gain_m: Option<f64>,
  #[serde(default)]
  pub elevation_loss_m: Option<f64>,
}

impl Lap {
  pub fn has_hr(&self) -> bool {
    self.average_hr.map_or(false, |hr| hr > 0.0)
  }
}

fn default_activity_type() -> String {
  "running".to_string()
}

/// A canonical record in the activity store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
  pub id: SourceId,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cross_ref_id: Option<SourceId>,
  pub source: SourceTag,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type", default = "default_activity_type")]
  pub activity_type: String,
  #[serde(rename = "date", with = "crate::models::date_format")]
  pub start: NaiveDateTime,
  pub distance_km: f64,
  pub duration_seconds: f64,
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
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub laps: Vec<Lap>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub splits_source: Option<Platform>,
}

impl Activity {
  pub fn is_running(&self) -> bool {
    self.activity_type == "running"
  }

  /// The id this record carries for `platform`, primary or cross reference
  pub fn id_for(&self, platform: Platform) -> Option<&SourceId> {
    if self.id.platform == platform {
      return Some(&self.id);
    }
    self.cross_ref_id.as_ref().filter(|id| id.platform == platform)
  }

  /// All source-qualified ids that resolve to this record
  pub fn ids(&self) -> impl Iterator<Item = &SourceId> {
    std::iter::once(&self.id).chain(self.cross_ref_id.iter())
  }

  pub fn has_hr(&self) -> bool {
    self.avg_hr.map_or(false, |hr| hr > 0.0)
  }

  pub fn laps_with_hr(&self) -> usize {
    self.laps.iter().filter(|l| l.has_hr()).count()
  }

  /// ISO week key, e.g. `2026-W03`
  pub fn week_key(&self) -> String {
    crate::models::week_key(self.start.date())
  }
}
