use super::{SyncContext, SyncError};
use crate::store::ActivityStore;
use crate::weekly::WeeklyReport;

/// Read-only consistency report over the canonical store
pub fn run_weekly(ctx: &SyncContext, year: Option<i32>) -> Result<WeeklyReport, SyncError> {
  let store = ActivityStore::load(&ctx.paths().canonical)?;
  Ok(WeeklyReport::build(store.activities(), &ctx.plan, year))
}
