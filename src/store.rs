//! Canonical activity store
//!
//! The whole dataset is loaded into memory, mutated by the reconciliation
//! engine, and written back once per invocation. Writes are guarded by a
//! count check, preceded by a timestamped backup, and land atomically.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::config::DataPaths;
use crate::models::{Activity, SourceId, SourceTag};
use crate::reconcile::{merge_batch, MatchThresholds, MergeStats};
use crate::sources::SourceBatch;

/// Literal token the operator must pass to `rebuild`
pub const REBUILD_CONFIRMATION: &str = "DISCARD-ENRICHMENTS";

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error(
    "Canonical store not found at {0}. Bootstrap it with `training-ledger rebuild --confirm DISCARD-ENRICHMENTS`"
  )]
  MissingCanonical(String),

  #[error("Data loss detected: {before} activities before merge, {after} after. Nothing was written")]
  DataLoss { before: usize, after: usize },

  #[error("Another sync holds {0}. Remove it only if no other process is running")]
  Locked(String),

  #[error("Rebuild discards enrichments; pass --confirm DISCARD-ENRICHMENTS to proceed")]
  RebuildNotConfirmed,

  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error(
    "Failed to parse {path}: {source}. Stores from older exporters carry bare numeric ids; regenerate with `training-ledger rebuild --confirm DISCARD-ENRICHMENTS`"
  )]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Failed to serialize store: {0}")]
  Serialize(#[source] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
  move |source| StoreError::Io {
    path: path.display().to_string(),
    source,
  }
}

/// ---------------------------------------------------------------------------
/// File Layout
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMethod {
  Incremental,
  Rebuild,
}

impl SyncMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      SyncMethod::Incremental => "incremental",
      SyncMethod::Rebuild => "rebuild",
    }
  }
}

/// On-disk shape; unknown top-level keys survive a load/save cycle
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
  #[serde(default)]
  last_sync: Option<String>,
  #[serde(default)]
  sync_method: Option<String>,
  #[serde(default)]
  activities: Vec<Activity>,
  #[serde(flatten)]
  extra: serde_json::Map<String, serde_json::Value>,
}

/// ---------------------------------------------------------------------------
/// Activity Store
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ActivityStore {
  activities: Vec<Activity>,
  /// Primary and cross-reference ids -> position in `activities`
  index: HashMap<SourceId, usize>,
  last_sync: Option<String>,
  sync_method: Option<String>,
  extra: serde_json::Map<String, serde_json::Value>,
}

impl ActivityStore {
  /// Records are kept newest first; the order holds from construction on
  pub fn new(activities: Vec<Activity>) -> Self {
    let mut store = Self {
      activities,
      ..Default::default()
    };
    store.sort_newest_first();
    store
  }

  /// Load the canonical file. A missing file is fatal; it is never created here.
  pub fn load(path: &Path) -> Result<Self, StoreError> {
    if !path.exists() {
      return Err(StoreError::MissingCanonical(path.display().to_string()));
    }

    let raw = fs::read_to_string(path).map_err(io_error(path))?;
    let file: StoreFile = serde_json::from_str(&raw).map_err(|source| StoreError::Parse {
      path: path.display().to_string(),
      source,
    })?;

    let mut store = Self::new(file.activities);
    store.last_sync = file.last_sync;
    store.sync_method = file.sync_method;
    store.extra = file.extra;

    log::info!(
      "[LOAD] {} activities from {} (last sync: {})",
      store.len(),
      path.display(),
      store.last_sync.as_deref().unwrap_or("never")
    );
    Ok(store)
  }

  pub fn len(&self) -> usize {
    self.activities.len()
  }

  pub fn is_empty(&self) -> bool {
    self.activities.is_empty()
  }

  pub fn activities(&self) -> &[Activity] {
    &self.activities
  }

  pub fn last_sync(&self) -> Option<&str> {
    self.last_sync.as_deref()
  }

  pub fn position_of(&self, id: &SourceId) -> Option<usize> {
    self.index.get(id).copied()
  }

  pub fn get(&self, id: &SourceId) -> Option<&Activity> {
    self.position_of(id).map(|idx| &self.activities[idx])
  }

  pub fn push(&mut self, activity: Activity) {
    let idx = self.activities.len();
    for id in activity.ids() {
      self.index.entry(id.clone()).or_insert(idx);
    }
    self.activities.push(activity);
  }

  /// Swap in a merged record, indexing any id it gained
  pub fn replace(&mut self, idx: usize, activity: Activity) {
    for id in activity.ids() {
      self.index.entry(id.clone()).or_insert(idx);
    }
    self.activities[idx] = activity;
  }

  /// Stable, so records sharing a start time keep their relative order
  pub fn sort_newest_first(&mut self) {
    self.activities.sort_by(|a, b| b.start.cmp(&a.start));
    self.rebuild_index();
  }

  fn rebuild_index(&mut self) {
    self.index.clear();
    for (idx, activity) in self.activities.iter().enumerate() {
      for id in activity.ids() {
        if self.index.insert(id.clone(), idx).is_some() {
          log::warn!("[INDEX] Duplicate id {} in store; keeping both records", id);
        }
      }
    }
  }

  pub fn stats(&self) -> IntegrityStats {
    IntegrityStats::from_activities(&self.activities)
  }

  /// Back up the current canonical file, then atomically replace it.
  /// Returns the backup path when a previous file existed.
  pub fn save(
    &mut self,
    paths: &DataPaths,
    method: SyncMethod,
    now: NaiveDateTime,
  ) -> Result<Option<PathBuf>, StoreError> {
    self.last_sync = Some(now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
    self.sync_method = Some(method.as_str().to_string());

    let file = StoreFile {
      last_sync: self.last_sync.clone(),
      sync_method: self.sync_method.clone(),
      activities: self.activities.clone(),
      extra: self.extra.clone(),
    };
    let json = serde_json::to_string_pretty(&file).map_err(StoreError::Serialize)?;

    let backup = if paths.canonical.exists() {
      Some(backup_file(&paths.canonical, &paths.backups_dir, now)?)
    } else {
      None
    };

    write_atomic(&paths.canonical, json.as_bytes()).map_err(io_error(&paths.canonical))?;
    log::info!(
      "[SAVE] {} activities written to {}",
      self.len(),
      paths.canonical.display()
    );
    Ok(backup)
  }
}

/// Hard check `after >= before`; soft check `after == before + added`
pub fn safety_check(before: usize, after: usize, added: usize) -> Result<(), StoreError> {
  if after < before {
    log::error!("[SAFETY] Activity count dropped from {} to {}", before, after);
    return Err(StoreError::DataLoss { before, after });
  }
  if after != before + added {
    log::warn!(
      "[SAFETY] Expected {} activities ({} + {} added), found {}",
      before + added,
      before,
      added,
      after
    );
  }
  Ok(())
}

/// ---------------------------------------------------------------------------
/// Backups and Atomic Writes
/// ---------------------------------------------------------------------------

pub fn backup_name(canonical: &Path, now: NaiveDateTime) -> String {
  let stem = canonical
    .file_stem()
    .and_then(|s| s.to_str())
    .unwrap_or("unified-cache");
  format!("{}-{}.json", stem, now.format("%Y%m%d_%H%M%S_%3f"))
}

fn backup_file(canonical: &Path, backups_dir: &Path, now: NaiveDateTime) -> Result<PathBuf, StoreError> {
  fs::create_dir_all(backups_dir).map_err(io_error(backups_dir))?;
  let target = backups_dir.join(backup_name(canonical, now));
  fs::copy(canonical, &target).map_err(io_error(&target))?;
  log::info!("[BACKUP] Created {}", target.display());
  Ok(target)
}

/// Write to a sibling temp file and rename it over `path`
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent)?;
  }

  let mut tmp_name = path.as_os_str().to_owned();
  tmp_name.push(".tmp");
  let tmp = PathBuf::from(tmp_name);

  let mut file = fs::File::create(&tmp)?;
  file.write_all(bytes)?;
  file.sync_all()?;
  drop(file);

  fs::rename(&tmp, path)
}

/// ---------------------------------------------------------------------------
/// Writer Lock
/// ---------------------------------------------------------------------------

/// Exclusive lockfile held for the lifetime of a writing invocation
#[derive(Debug)]
pub struct SyncLock {
  path: PathBuf,
}

impl SyncLock {
  pub fn acquire(path: &Path) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      fs::create_dir_all(parent).map_err(io_error(parent))?;
    }

    let mut file = OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(path)
      .map_err(|source| match source.kind() {
        std::io::ErrorKind::AlreadyExists => StoreError::Locked(path.display().to_string()),
        _ => StoreError::Io {
          path: path.display().to_string(),
          source,
        },
      })?;
    writeln!(file, "{}", std::process::id()).map_err(io_error(path))?;

    log::debug!("[LOCK] Acquired {}", path.display());
    Ok(Self {
      path: path.to_path_buf(),
    })
  }
}

impl Drop for SyncLock {
  fn drop(&mut self) {
    if let Err(e) = fs::remove_file(&self.path) {
      log::warn!("[LOCK] Failed to release {}: {}", self.path.display(), e);
    }
  }
}

/// ---------------------------------------------------------------------------
/// Destructive Rebuild
/// ---------------------------------------------------------------------------

pub fn confirm_rebuild(token: Option<&str>) -> Result<(), StoreError> {
  match token {
    Some(t) if t == REBUILD_CONFIRMATION => Ok(()),
    _ => Err(StoreError::RebuildNotConfirmed),
  }
}

/// Reconstruct a store from raw caches: Garmin first, then Strava merged
/// through the regular engine so twins coalesce.
pub fn rebuild_from_batches(
  garmin: SourceBatch,
  strava: SourceBatch,
  thresholds: &MatchThresholds,
) -> (ActivityStore, MergeStats) {
  let mut store = ActivityStore::default();
  let mut stats = merge_batch(&mut store, garmin, thresholds);
  stats.absorb(&merge_batch(&mut store, strava, thresholds));
  (store, stats)
}

/// ---------------------------------------------------------------------------
/// Integrity Summary
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityStats {
  pub total: usize,
  pub garmin: usize,
  pub strava: usize,
  pub both: usize,
  pub with_hr: usize,
  pub with_laps: usize,
  pub with_lap_hr: usize,
}

impl IntegrityStats {
  pub fn from_activities(activities: &[Activity]) -> Self {
    let mut stats = Self {
      total: activities.len(),
      ..Default::default()
    };
    for activity in activities {
      match activity.source {
        SourceTag::Garmin => stats.garmin += 1,
        SourceTag::Strava => stats.strava += 1,
        SourceTag::Both => stats.both += 1,
      }
      if activity.has_hr() {
        stats.with_hr += 1;
      }
      if !activity.laps.is_empty() {
        stats.with_laps += 1;
      }
      if activity.laps_with_hr() > 0 {
        stats.with_lap_hr += 1;
      }
    }
    stats
  }

  fn pct(&self, n: usize) -> f64 {
    if self.total == 0 {
      0.0
    } else {
      n as f64 / self.total as f64 * 100.0
    }
  }
}

impl fmt::Display for IntegrityStats {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(
      f,
      "Activities: {} (garmin {}, strava {}, both {})",
      self.total, self.garmin, self.strava, self.both
    )?;
    writeln!(f, "With HR:    {} ({:.1}%)", self.with_hr, self.pct(self.with_hr))?;
    writeln!(f, "With laps:  {} ({:.1}%)", self.with_laps, self.pct(self.with_laps))?;
    write!(f, "Lap HR:     {} ({:.1}%)", self.with_lap_hr, self.pct(self.with_lap_hr))
  }
}
