use super::{SyncContext, SyncError};
use crate::insights::{enrich, EnrichOptions, EnrichReport, Insights};
use crate::store::{ActivityStore, SyncLock};

/// Recompute derived metrics from the canonical store without fetching.
/// The canonical file is only read.
pub fn run_enrich(
  ctx: &SyncContext,
  options: EnrichOptions,
  dry_run: bool,
) -> Result<EnrichReport, SyncError> {
  let paths = ctx.paths();
  let _lock = if dry_run {
    None
  } else {
    Some(SyncLock::acquire(&paths.lock_file)?)
  };

  let store = ActivityStore::load(&paths.canonical)?;
  let mut insights = Insights::load(&paths.insights)?;
  log::info!(
    "[ENRICH] {} activities in store, {} runs already enriched",
    store.len(),
    insights.runs.len()
  );

  let report = enrich(&mut insights, store.activities(), &ctx.plan, options, ctx.now);

  if dry_run {
    log::info!("[DRY RUN] Skipping insights save");
  } else if report.runs > 0 {
    insights.save(&paths.insights)?;
  }
  Ok(report)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::commands::fixtures::context;
  use crate::models::Platform;
  use crate::store::{StoreError, SyncMethod};
  use crate::test_utils::*;
  use std::fs;

  fn seeded(dir: &std::path::Path) -> SyncContext {
    let ctx = context(dir, "2026-02-10 08:00:00");
    let mut store = mock_store(vec![
      mock_activity(Platform::Garmin, "1", "2026-01-27 07:00:00", 16.0),
      mock_activity(Platform::Garmin, "2", "2026-02-03 07:00:00", 10.0),
      mock_activity(Platform::Garmin, "3", "2026-02-09 07:00:00", 6.0),
    ]);
    store
      .save(ctx.paths(), SyncMethod::Rebuild, datetime("2026-02-09 08:00:00"))
      .unwrap();
    ctx
  }

  #[test]
  fn test_enrich_writes_insights_only() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = seeded(dir.path());
    let canonical = fs::read_to_string(&ctx.paths().canonical).unwrap();

    let report = run_enrich(&ctx, EnrichOptions::default(), false).unwrap();
    assert_eq!(report.runs, 3);
    assert_eq!(report.weeks, 3);

    let insights = Insights::load(&ctx.paths().insights).unwrap();
    assert_eq!(insights.runs.len(), 3);
    assert_eq!(insights.last_computed.as_deref(), Some("2026-02-10T08:00:00"));
    assert_eq!(fs::read_to_string(&ctx.paths().canonical).unwrap(), canonical);
    assert!(!ctx.paths().lock_file.exists());

    // Nothing left to do without --force
    let again = run_enrich(&ctx, EnrichOptions::default(), false).unwrap();
    assert_eq!(again.runs, 0);
  }

  #[test]
  fn test_enrich_force_recomputes_all() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = seeded(dir.path());
    run_enrich(&ctx, EnrichOptions::default(), false).unwrap();

    let forced = EnrichOptions {
      days: None,
      force: true,
    };
    assert_eq!(run_enrich(&ctx, forced, false).unwrap().runs, 3);
  }

  #[test]
  fn test_enrich_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = seeded(dir.path());

    let report = run_enrich(&ctx, EnrichOptions::default(), true).unwrap();
    assert_eq!(report.runs, 3);
    assert!(!ctx.paths().insights.exists());
  }

  #[test]
  fn test_enrich_requires_canonical_store() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path(), "2026-02-10 08:00:00");

    let err = run_enrich(&ctx, EnrichOptions::default(), false).unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::MissingCanonical(_))));
    assert!(!ctx.paths().insights.exists());
  }
}
