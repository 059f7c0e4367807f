use std::env;
use std::path::{Path, PathBuf};

use crate::reconcile::MatchThresholds;
use crate::sources::strava::StravaConfig;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const DEFAULT_DATA_DIR: &str = "tracking";
const CANONICAL_FILE: &str = "unified-cache.json";
const INSIGHTS_FILE: &str = "ai-insights.json";
const GARMIN_CACHE_FILE: &str = "garmin-cache.json";
const STRAVA_CACHE_FILE: &str = "strava-cache.json";
const BACKUPS_DIR: &str = "backups";
const LOCK_FILE: &str = "sync.lock";

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Invalid value for {key}: {value}")]
  InvalidValue { key: String, value: String },
}

/// ---------------------------------------------------------------------------
/// Data Layout
/// ---------------------------------------------------------------------------

/// File locations under the data directory
#[derive(Debug, Clone, PartialEq)]
pub struct DataPaths {
  pub data_dir: PathBuf,
  pub canonical: PathBuf,
  pub insights: PathBuf,
  pub garmin_cache: PathBuf,
  pub strava_cache: PathBuf,
  pub backups_dir: PathBuf,
  pub lock_file: PathBuf,
}

impl DataPaths {
  pub fn new(data_dir: impl AsRef<Path>) -> Self {
    let data_dir = data_dir.as_ref().to_path_buf();
    Self {
      canonical: data_dir.join(CANONICAL_FILE),
      insights: data_dir.join(INSIGHTS_FILE),
      garmin_cache: data_dir.join(GARMIN_CACHE_FILE),
      strava_cache: data_dir.join(STRAVA_CACHE_FILE),
      backups_dir: data_dir.join(BACKUPS_DIR),
      lock_file: data_dir.join(LOCK_FILE),
      data_dir,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Application Config
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub paths: DataPaths,
  pub plan_file: Option<PathBuf>,
  pub thresholds: MatchThresholds,
  /// None when no Strava token is configured; the adapter is skipped
  pub strava: Option<StravaConfig>,
}

impl AppConfig {
  pub fn from_env() -> Result<Self, ConfigError> {
    let data_dir = env::var("TRAINER_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());

    let mut thresholds = MatchThresholds::default();
    if let Some(secs) = parse_env::<i64>("MATCH_MAX_TIME_GAP_SECS")? {
      thresholds.max_time_gap_secs = secs;
    }
    if let Some(km) = parse_env::<f64>("MATCH_MAX_DISTANCE_KM")? {
      thresholds.max_distance_diff_km = km;
    }

    Ok(Self {
      paths: DataPaths::new(data_dir),
      plan_file: env::var("TRAINER_PLAN_FILE").ok().map(PathBuf::from),
      thresholds,
      strava: StravaConfig::from_env().ok(),
    })
  }

  pub fn with_data_dir(mut self, data_dir: impl AsRef<Path>) -> Self {
    self.paths = DataPaths::new(data_dir);
    self
  }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
  match env::var(key) {
    Ok(value) => value
      .trim()
      .parse()
      .map(Some)
      .map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value,
      }),
    Err(_) => Ok(None),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;

  const KEYS: [&str; 6] = [
    "TRAINER_DATA_DIR",
    "TRAINER_PLAN_FILE",
    "MATCH_MAX_TIME_GAP_SECS",
    "MATCH_MAX_DISTANCE_KM",
    "STRAVA_ACCESS_TOKEN",
    "STRAVA_API_BASE",
  ];

  #[test]
  #[serial]
  fn test_defaults_without_env() {
    temp_env::with_vars_unset(KEYS, || {
      let config = AppConfig::from_env().unwrap();
      assert_eq!(config.paths.canonical, PathBuf::from("tracking/unified-cache.json"));
      assert_eq!(config.paths.backups_dir, PathBuf::from("tracking/backups"));
      assert_eq!(config.thresholds, MatchThresholds::default());
      assert!(config.strava.is_none());
      assert!(config.plan_file.is_none());
    });
  }

  #[test]
  #[serial]
  fn test_env_overrides() {
    temp_env::with_vars(
      [
        ("TRAINER_DATA_DIR", Some("/tmp/ledger")),
        ("MATCH_MAX_TIME_GAP_SECS", Some("3600")),
        ("MATCH_MAX_DISTANCE_KM", Some("0.25")),
        ("STRAVA_ACCESS_TOKEN", Some("token-abc")),
        ("STRAVA_API_BASE", None),
        ("TRAINER_PLAN_FILE", None),
      ],
      || {
        let config = AppConfig::from_env().unwrap();
        assert_eq!(config.paths.insights, PathBuf::from("/tmp/ledger/ai-insights.json"));
        assert_eq!(config.thresholds.max_time_gap_secs, 3600);
        assert_eq!(config.thresholds.max_distance_diff_km, 0.25);
        assert_eq!(config.strava.unwrap().access_token, "token-abc");
      },
    );
  }

  #[test]
  #[serial]
  fn test_invalid_threshold_is_rejected() {
    temp_env::with_vars(
      [
        ("MATCH_MAX_TIME_GAP_SECS", Some("two hours")),
        ("MATCH_MAX_DISTANCE_KM", None),
      ],
      || {
        let err = AppConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("MATCH_MAX_TIME_GAP_SECS"));
      },
    );
  }

  #[test]
  fn test_cli_data_dir_override() {
    let config = AppConfig {
      paths: DataPaths::new("tracking"),
      plan_file: None,
      thresholds: MatchThresholds::default(),
      strava: None,
    }
    .with_data_dir("/data/runs");
    assert_eq!(config.paths.lock_file, PathBuf::from("/data/runs/sync.lock"));
  }
}
