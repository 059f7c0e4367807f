//! Garmin source adapter
//!
//! Garmin Connect login and session handling live outside this crate. The
//! external fetcher writes its raw export to `garmin-cache.json`; this
//! adapter reads that export and narrows it to the lookback window.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use super::{load_cache_file, within_lookback, SourceBatch, SourceError};
use crate::models::Platform;

#[derive(Debug, Clone)]
pub struct GarminSource {
  cache_path: PathBuf,
}

impl GarminSource {
  pub fn new(cache_path: impl AsRef<Path>) -> Self {
    Self {
      cache_path: cache_path.as_ref().to_path_buf(),
    }
  }

  /// Running activities from the last `days` days
  pub fn fetch_recent(&self, days: u32, now: NaiveDateTime) -> Result<SourceBatch, SourceError> {
    let raw = load_cache_file(&self.cache_path)?;
    let total = raw.len();
    let recent = within_lookback(raw, days, now);
    log::info!(
      "[FETCH] Garmin export: {} of {} records within last {} days",
      recent.len(),
      total,
      days
    );
    Ok(SourceBatch::from_raw(Platform::Garmin, recent))
  }

  /// Every running activity in the export (rebuild path)
  pub fn fetch_all(&self) -> Result<SourceBatch, SourceError> {
    let raw: Vec<_> = load_cache_file(&self.cache_path)?
      .into_iter()
      .filter(|r| r.is_running())
      .collect();
    log::info!("[FETCH] Garmin export: {} running records", raw.len());
    Ok(SourceBatch::from_raw(Platform::Garmin, raw))
  }
}
