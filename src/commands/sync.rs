use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::{SyncContext, SyncError};
use crate::insights::{enrich, EnrichOptions, EnrichReport, Insights};
use crate::models::Platform;
use crate::reconcile::{merge_batch, MergeStats};
use crate::sources::garmin::GarminSource;
use crate::sources::strava::StravaClient;
use crate::sources::{SourceBatch, SourceError};
use crate::store::{safety_check, ActivityStore, IntegrityStats, SyncLock, SyncMethod};

pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// ---------------------------------------------------------------------------
/// Options and Summary
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
  pub days: u32,
  /// Run the whole pipeline but persist nothing
  pub dry_run: bool,
  /// Recompute every run's metrics after the merge
  pub force: bool,
  pub skip_enrich: bool,
}

impl Default for SyncOptions {
  fn default() -> Self {
    Self {
      days: DEFAULT_LOOKBACK_DAYS,
      dry_run: false,
      force: false,
      skip_enrich: false,
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
  pub platform: Platform,
  pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncSummary {
  pub before: usize,
  pub after: usize,
  pub merge: MergeStats,
  pub rejected: usize,
  pub failures: Vec<SourceFailure>,
  pub integrity: IntegrityStats,
  pub backup: Option<PathBuf>,
  pub enrichment: Option<EnrichReport>,
  pub dry_run: bool,
}

impl fmt::Display for SyncSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rule = "=".repeat(60);
    let title = if self.dry_run {
      "SYNC SUMMARY (dry run, nothing written)"
    } else {
      "SYNC SUMMARY"
    };
    writeln!(f, "{}\n{}\n{}", rule, title, rule)?;
    writeln!(f, "Before:   {}", self.before)?;
    writeln!(f, "After:    {}", self.after)?;
    writeln!(f, "Fetched:  {}", self.merge.fetched)?;
    writeln!(f, "Added:    {}", self.merge.added)?;
    writeln!(f, "Updated:  {}", self.merge.updated)?;
    writeln!(f, "Matched:  {}", self.merge.matched)?;
    if self.rejected > 0 {
      writeln!(f, "Rejected: {}", self.rejected)?;
    }
    for failure in &self.failures {
      writeln!(f, "[WARN] {} fetch failed: {}", failure.platform, failure.error)?;
    }
    if let Some(backup) = &self.backup {
      writeln!(f, "Backup:   {}", backup.display())?;
    }
    if let Some(report) = &self.enrichment {
      writeln!(
        f,
        "Enriched: {} runs, {} weeks (streak {} weeks)",
        report.runs, report.weeks, report.streak_weeks
      )?;
    }
    write!(f, "{}", self.integrity)
  }
}

/// ---------------------------------------------------------------------------
/// Fetch
/// ---------------------------------------------------------------------------

/// Fetch from every configured source. A failing source is logged and
/// reported; the run continues with whatever the others returned.
pub async fn collect_batches(ctx: &SyncContext, days: u32) -> (Vec<SourceBatch>, Vec<SourceFailure>) {
  let mut batches = Vec::new();
  let mut failures = Vec::new();

  let mut record = |platform: Platform, result: Result<SourceBatch, SourceError>| match result {
    Ok(batch) => batches.push(batch),
    Err(e) => {
      log::warn!("[WARN] {} fetch failed: {}", platform, e);
      failures.push(SourceFailure {
        platform,
        error: e.to_string(),
      });
    }
  };

  let garmin = GarminSource::new(&ctx.paths().garmin_cache);
  record(Platform::Garmin, garmin.fetch_recent(days, ctx.now));

  match &ctx.config.strava {
    Some(config) => {
      let result = match StravaClient::new(config.clone()) {
        Ok(client) => client.fetch_recent(days, ctx.now).await,
        Err(e) => Err(e),
      };
      record(Platform::Strava, result);
    }
    None => log::info!("[SKIP] STRAVA_ACCESS_TOKEN not set; skipping Strava"),
  }

  (batches, failures)
}

/// ---------------------------------------------------------------------------
/// Incremental Sync
/// ---------------------------------------------------------------------------

/// Load, fetch, merge, verify, back up, write, enrich.
///
/// Aborts before any write if the canonical store is missing or the merge
/// would lose records. A dry run reports merge and enrichment counts and
/// writes nothing.
pub async fn run_sync(ctx: &SyncContext, options: SyncOptions) -> Result<SyncSummary, SyncError> {
  let paths = ctx.paths();
  let _lock = if options.dry_run {
    None
  } else {
    Some(SyncLock::acquire(&paths.lock_file)?)
  };

  let mut store = ActivityStore::load(&paths.canonical)?;
  let before = store.len();
  log::info!("[LOAD] By source: {:?}", crate::reconcile::source_breakdown(store.activities()));

  let (batches, failures) = collect_batches(ctx, options.days).await;

  let mut merge = MergeStats::default();
  let mut rejected = 0;
  for batch in batches {
    rejected += batch.rejected;
    merge.absorb(&merge_batch(&mut store, batch, &ctx.config.thresholds));
  }

  let after = store.len();
  safety_check(before, after, merge.added)?;

  let mut summary = SyncSummary {
    before,
    after,
    merge,
    rejected,
    failures,
    integrity: store.stats(),
    backup: None,
    enrichment: None,
    dry_run: options.dry_run,
  };

  if options.dry_run {
    log::info!("[DRY RUN] Skipping save");
  } else {
    summary.backup = store.save(paths, SyncMethod::Incremental, ctx.now)?;
  }

  // Dry runs still enrich in memory for the report
  if !options.skip_enrich {
    let mut insights = Insights::load(&paths.insights)?;
    let enrich_options = EnrichOptions {
      days: Some(options.days),
      force: options.force,
    };
    let report = enrich(&mut insights, store.activities(), &ctx.plan, enrich_options, ctx.now);
    if options.dry_run {
      log::info!("[DRY RUN] Skipping insights save");
    } else if report.runs > 0 {
      insights.save(&paths.insights)?;
    }
    summary.enrichment = Some(report);
  }

  Ok(summary)
}
