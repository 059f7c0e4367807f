use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::{SyncContext, SyncError};
use crate::models::Platform;
use crate::reconcile::MergeStats;
use crate::sources::garmin::GarminSource;
use crate::sources::strava;
use crate::sources::SourceBatch;
use crate::store::{
  confirm_rebuild, rebuild_from_batches, ActivityStore, IntegrityStats, StoreError, SyncLock, SyncMethod,
};

#[derive(Debug, Clone, Serialize)]
pub struct RebuildSummary {
  /// Record count of the store being replaced, if one existed
  pub previous: Option<usize>,
  pub after: usize,
  pub merge: MergeStats,
  pub rejected: usize,
  pub strava_cache_used: bool,
  pub integrity: IntegrityStats,
  pub backup: Option<PathBuf>,
  pub dry_run: bool,
}

impl fmt::Display for RebuildSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rule = "=".repeat(60);
    let title = if self.dry_run {
      "REBUILD SUMMARY (dry run, nothing written)"
    } else {
      "REBUILD SUMMARY"
    };
    writeln!(f, "{}\n{}\n{}", rule, title, rule)?;
    match self.previous {
      Some(previous) => writeln!(f, "Previous: {}", previous)?,
      None => writeln!(f, "Previous: (no canonical store)")?,
    }
    writeln!(f, "Rebuilt:  {}", self.after)?;
    writeln!(f, "Matched:  {}", self.merge.matched)?;
    if self.rejected > 0 {
      writeln!(f, "Rejected: {}", self.rejected)?;
    }
    if !self.strava_cache_used {
      writeln!(f, "[WARN] No Strava cache; store holds Garmin records only")?;
    }
    if let Some(backup) = &self.backup {
      writeln!(f, "Backup:   {}", backup.display())?;
    }
    write!(f, "{}", self.integrity)
  }
}

/// Reconstruct the canonical store from the raw platform caches.
///
/// Destructive: the merged record set replaces the canonical file, so the
/// caller must pass the confirmation token. Insights are left untouched and
/// become stale until the next `enrich --force`.
pub fn run_rebuild(
  ctx: &SyncContext,
  confirm: Option<&str>,
  dry_run: bool,
) -> Result<RebuildSummary, SyncError> {
  confirm_rebuild(confirm)?;

  let paths = ctx.paths();
  let _lock = if dry_run {
    None
  } else {
    Some(SyncLock::acquire(&paths.lock_file)?)
  };

  let previous = match ActivityStore::load(&paths.canonical) {
    Ok(store) => Some(store.len()),
    Err(StoreError::MissingCanonical(_)) => None,
    Err(e) => {
      log::warn!("[REBUILD] Existing store unreadable, rebuilding from scratch: {}", e);
      None
    }
  };

  let garmin = GarminSource::new(&paths.garmin_cache).fetch_all()?;
  let (strava, strava_cache_used) = match strava::fetch_cached(&paths.strava_cache) {
    Ok(batch) => (batch, true),
    Err(e) => {
      log::warn!("[WARN] Strava cache unavailable: {}", e);
      (SourceBatch::empty(Platform::Strava), false)
    }
  };
  let rejected = garmin.rejected + strava.rejected;

  let (mut store, merge) = rebuild_from_batches(garmin, strava, &ctx.config.thresholds);
  let after = store.len();
  if let Some(previous) = previous.filter(|p| after < *p) {
    log::warn!(
      "[REBUILD] Rebuilt store has {} activities, fewer than the {} it replaces",
      after,
      previous
    );
  }

  let mut summary = RebuildSummary {
    previous,
    after,
    merge,
    rejected,
    strava_cache_used,
    integrity: store.stats(),
    backup: None,
    dry_run,
  };

  if dry_run {
    log::info!("[DRY RUN] Skipping save");
    return Ok(summary);
  }

  summary.backup = store.save(paths, SyncMethod::Rebuild, ctx.now)?;
  Ok(summary)
}
