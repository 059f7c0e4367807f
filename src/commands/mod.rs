//! Pipeline entry points behind the CLI subcommands
//!
//! Every command receives an explicit [`SyncContext`]; nothing is cached in
//! module state between stages.

pub mod enrich;
pub mod rebuild;
pub mod sync;
pub mod weekly;

use chrono::NaiveDateTime;

use crate::config::{AppConfig, ConfigError, DataPaths};
use crate::insights::InsightsError;
use crate::plan::{PlanError, TrainingPlanConfig};
use crate::sources::SourceError;
use crate::store::StoreError;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Source(#[from] SourceError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Insights(#[from] InsightsError),

  #[error("Runtime error: {0}")]
  Runtime(String),
}

/// ---------------------------------------------------------------------------
/// Pipeline Context
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SyncContext {
  pub config: AppConfig,
  pub plan: TrainingPlanConfig,
  /// Single clock reading for the whole invocation
  pub now: NaiveDateTime,
}

impl SyncContext {
  /// Resolve the plan (file or built-in) and pin the clock
  pub fn new(config: AppConfig, now: NaiveDateTime) -> Result<Self, SyncError> {
    let plan = match &config.plan_file {
      Some(path) => {
        log::info!("[PLAN] Loading training plan from {}", path.display());
        TrainingPlanConfig::load(path)?
      }
      None => TrainingPlanConfig::default(),
    };
    Ok(Self { config, plan, now })
  }

  pub fn paths(&self) -> &DataPaths {
    &self.config.paths
  }
}


#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_utils::datetime;

  #[test]
  fn test_context_uses_builtin_plan_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = fixtures::context(dir.path(), "2026-02-10 08:00:00");
    assert_eq!(ctx.plan, TrainingPlanConfig::default());
    assert_eq!(ctx.paths().data_dir, dir.path());
  }

  #[test]
  fn test_context_reports_bad_plan_file() {
    let dir = tempfile::tempdir().unwrap();
    let plan_path = dir.path().join("plan.json");
    std::fs::write(&plan_path, "{not json").unwrap();

    let mut config = fixtures::context(dir.path(), "2026-02-10 08:00:00").config;
    config.plan_file = Some(plan_path);
    let err = SyncContext::new(config, datetime("2026-02-10 08:00:00")).unwrap_err();
    assert!(matches!(err, SyncError::Plan(PlanError::Parse { .. })));
  }
}
