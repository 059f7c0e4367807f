//! Strava source adapter
//!
//! Fetches recent runs and their laps from the Strava v3 API. OAuth lives
//! outside this crate: a valid access token is taken from the environment.
//! Requests carry a timeout and are retried with exponential backoff on
//! transport errors, 429 and 5xx responses.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration as StdDuration;
use url::Url;

use super::{
  load_cache_file, pace_from_speed, RawActivity, RawId, RawLap, RawSplits, SourceBatch,
  SourceError,
};
use crate::models::Platform;

/// ---------------------------------------------------------------------------
/// Configuration Constants
/// ---------------------------------------------------------------------------

const STRAVA_API_BASE: &str = "https://www.strava.com/api/v3";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const PER_PAGE: u32 = 100;

#[derive(Debug, Clone)]
pub struct StravaConfig {
  pub access_token: String,
  pub api_base: String,
  pub timeout_secs: u64,
  pub max_retries: u32,
  pub retry_backoff_ms: u64,
}

impl StravaConfig {
  pub fn from_env() -> Result<Self, SourceError> {
    Ok(Self {
      access_token: env::var("STRAVA_ACCESS_TOKEN")
        .map_err(|_| SourceError::MissingConfig("STRAVA_ACCESS_TOKEN".into()))?,
      api_base: env::var("STRAVA_API_BASE").unwrap_or_else(|_| STRAVA_API_BASE.to_string()),
      timeout_secs: REQUEST_TIMEOUT_SECS,
      max_retries: MAX_RETRIES,
      retry_backoff_ms: RETRY_BACKOFF_MS,
    })
  }
}

/// ---------------------------------------------------------------------------
/// Strava API Payloads
/// ---------------------------------------------------------------------------

/// Activity summary from Strava API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaActivity {
  pub id: i64,
  pub name: String,
  /// Strava uses "type" for legacy and "sport_type" for newer activities
  #[serde(rename = "type", default)]
  pub activity_type: String,
  #[serde(default)]
  pub sport_type: Option<String>,
  pub start_date: DateTime<Utc>,
  /// Local wall-clock time, formatted as UTC by Strava
  #[serde(default)]
  pub start_date_local: Option<String>,
  #[serde(default)]
  pub elapsed_time: i64,
  #[serde(default)]
  pub moving_time: i64,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub total_elevation_gain: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<f64>,
  #[serde(default)]
  pub max_heartrate: Option<f64>,
  /// Strides per minute for one foot
  #[serde(default)]
  pub average_cadence: Option<f64>,
  #[serde(default)]
  pub calories: Option<f64>,
}

impl StravaActivity {
  pub fn is_run(&self) -> bool {
    let kind = self.sport_type.as_deref().unwrap_or(&self.activity_type);
    matches!(kind, "Run" | "TrailRun" | "VirtualRun")
  }
}

/// Lap from `/activities/{id}/laps`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StravaLap {
  #[serde(default)]
  pub lap_index: Option<u32>,
  #[serde(default)]
  pub distance: Option<f64>,
  #[serde(default)]
  pub moving_time: Option<f64>,
  #[serde(default)]
  pub average_speed: Option<f64>,
  #[serde(default)]
  pub average_heartrate: Option<f64>,
  #[serde(default)]
  pub max_heartrate: Option<f64>,
  #[serde(default)]
  pub average_cadence: Option<f64>,
  #[serde(default)]
  pub total_elevation_gain: Option<f64>,
}

/// Strava reports one-foot cadence for runs
fn steps_per_minute(cadence: Option<f64>) -> Option<f64> {
  cadence.filter(|c| *c > 0.0).map(|c| c * 2.0)
}

/// Stride length in cm from speed (m/s) and cadence (steps/min)
fn stride_cm(speed: Option<f64>, spm: Option<f64>) -> Option<f64> {
  match (speed, spm) {
    (Some(speed), Some(spm)) if speed > 0.0 && spm > 0.0 => {
      Some(((speed * 60.0 / spm) * 1000.0).round() / 10.0)
    }
    _ => None,
  }
}

impl StravaLap {
  fn into_raw(self) -> RawLap {
    let spm = steps_per_minute(self.average_cadence);
    RawLap {
      lapIndex: self.lap_index,
      distance: self.distance,
      duration: self.moving_time,
      averageSpeed: self.average_speed,
      averageHR: self.average_heartrate,
      maxHR: self.max_heartrate,
      averageRunCadence: spm,
      strideLength: stride_cm(self.average_speed, spm),
      elevationGain: self.total_elevation_gain,
      elevationLoss: None,
    }
  }
}

/// Convert an API activity plus its laps into the shared export format
pub fn to_raw_activity(activity: StravaActivity, laps: Vec<StravaLap>) -> RawActivity {
  let date = activity
    .start_date_local
    .clone()
    .unwrap_or_else(|| activity.start_date.format("%Y-%m-%d %H:%M:%S").to_string());
  let splits = if laps.is_empty() {
    None
  } else {
    Some(RawSplits {
      lapDTOs: laps.into_iter().map(StravaLap::into_raw).collect(),
    })
  };

  RawActivity {
    id: None,
    strava_id: Some(RawId::Number(activity.id)),
    name: Some(activity.name),
    activity_type: Some("running".to_string()),
    date,
    distance_km: activity.distance.map(|m| (m / 10.0).round() / 100.0),
    duration_seconds: Some(activity.moving_time as f64),
    avg_pace_min_km: pace_from_speed(activity.average_speed),
    avg_hr: activity.average_heartrate,
    max_hr: activity.max_heartrate,
    avg_cadence: steps_per_minute(activity.average_cadence),
    elevation_gain_m: activity.total_elevation_gain,
    elevation_loss_m: None,
    calories: activity.calories,
    splits,
  }
}

/// ---------------------------------------------------------------------------
/// Strava API Client
/// ---------------------------------------------------------------------------

pub struct StravaClient {
  client: Client,
  config: StravaConfig,
}

impl StravaClient {
  pub fn new(config: StravaConfig) -> Result<Self, SourceError> {
    let client = Client::builder()
      .timeout(StdDuration::from_secs(config.timeout_secs))
      .build()?;
    Ok(Self { client, config })
  }

  fn endpoint(&self, path: &str) -> Result<Url, SourceError> {
    Url::parse(&format!("{}{}", self.config.api_base.trim_end_matches('/'), path))
      .map_err(|e| SourceError::Api(format!("Invalid Strava URL: {}", e)))
  }

  /// GET with retry. `Ok(None)` means the resource does not exist.
  async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>, SourceError> {
    let mut attempt = 0;

    loop {
      let result = self
        .client
        .get(url.clone())
        .bearer_auth(&self.config.access_token)
        .send()
        .await;

      let retryable = match result {
        Ok(response) => {
          let status = response.status();
          if status == StatusCode::UNAUTHORIZED {
            return Err(SourceError::NotAuthenticated(Platform::Strava));
          }
          if status == StatusCode::NOT_FOUND {
            return Ok(None);
          }
          if status.is_success() {
            let body = response.text().await?;
            return serde_json::from_str(&body).map(Some).map_err(|e| {
              log::error!(
                "Failed to parse Strava response: {} (first 500 chars: {})",
                e,
                body.chars().take(500).collect::<String>()
              );
              SourceError::Api(format!("Failed to parse Strava response: {}", e))
            });
          }

          let error_text = response.text().await.unwrap_or_default();
          if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            SourceError::Api(format!("{} from {}: {}", status, url.path(), error_text))
          } else {
            return Err(SourceError::Api(format!(
              "{} from {}: {}",
              status,
              url.path(),
              error_text
            )));
          }
        }
        Err(e) => SourceError::Request(e),
      };

      if attempt >= self.config.max_retries {
        return Err(retryable);
      }
      let backoff = self.config.retry_backoff_ms * 2u64.pow(attempt);
      log::warn!(
        "Strava request failed ({}), retry {}/{} in {}ms",
        retryable,
        attempt + 1,
        self.config.max_retries,
        backoff
      );
      tokio::time::sleep(StdDuration::from_millis(backoff)).await;
      attempt += 1;
    }
  }

  /// Fetch activities that started after `after` (epoch seconds)
  pub async fn fetch_activities(
    &self,
    after: Option<i64>,
    per_page: u32,
  ) -> Result<Vec<StravaActivity>, SourceError> {
    let mut url = self.endpoint("/athlete/activities")?;
    url
      .query_pairs_mut()
      .append_pair("per_page", &per_page.to_string());
    if let Some(after) = after {
      url.query_pairs_mut().append_pair("after", &after.to_string());
    }

    Ok(self.get_json(url).await?.unwrap_or_default())
  }

  pub async fn fetch_laps(&self, activity_id: i64) -> Result<Vec<StravaLap>, SourceError> {
    let url = self.endpoint(&format!("/activities/{}/laps", activity_id))?;
    Ok(self.get_json(url).await?.unwrap_or_default())
  }

  /// Runs from the last `days` days with their laps.
  /// A lap fetch failure keeps the activity without laps.
  pub async fn fetch_recent(&self, days: u32, now: NaiveDateTime) -> Result<SourceBatch, SourceError> {
    let after = (now - Duration::days(i64::from(days))).and_utc().timestamp();
    let activities = self.fetch_activities(Some(after), PER_PAGE).await?;
    let total = activities.len();

    let mut raw = Vec::new();
    for activity in activities.into_iter().filter(StravaActivity::is_run) {
      let laps = match self.fetch_laps(activity.id).await {
        Ok(laps) => laps,
        Err(e) => {
          log::warn!("[WARN] Could not fetch laps for Strava activity {}: {}", activity.id, e);
          vec![]
        }
      };
      raw.push(to_raw_activity(activity, laps));
    }

    log::info!("[FETCH] Strava: {} runs of {} activities", raw.len(), total);
    Ok(SourceBatch::from_raw(Platform::Strava, raw))
  }
}

/// Raw Strava cache written by earlier syncs (rebuild path)
pub fn fetch_cached(path: &Path) -> Result<SourceBatch, SourceError> {
  let raw: Vec<_> = load_cache_file(path)?
    .into_iter()
    .filter(|r| r.is_running())
    .collect();
  log::info!("[FETCH] Strava cache: {} running records", raw.len());
  Ok(SourceBatch::from_raw(Platform::Strava, raw))
}
