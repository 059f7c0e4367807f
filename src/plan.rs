//! Static training plan configuration
//!
//! Read-only input to the metrics engine: plan weeks, the risk-month
//! calendar, volume thresholds and HR drift targets. A JSON file can
//! replace the built-in spring campaign.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::models::insights::{PlanContext, RunType};

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PlanError {
  #[error("Failed to read plan file {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Invalid plan file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Plan has no weeks")]
  Empty,
}

/// ---------------------------------------------------------------------------
/// Plan Structures
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanWeek {
  pub phase: String,
  pub target_volume_km: f64,
  pub key_workout: String,
}

/// Per-run-type HR drift thresholds, in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftTargets {
  pub ideal: f64,
  pub acceptable: f64,
  pub concern: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrDriftTargets {
  pub easy: DriftTargets,
  pub tempo: DriftTargets,
  pub interval: DriftTargets,
  pub long: DriftTargets,
}

impl HrDriftTargets {
  pub fn for_run_type(&self, run_type: RunType) -> DriftTargets {
    match run_type {
      RunType::Easy => self.easy,
      RunType::Tempo => self.tempo,
      RunType::Interval => self.interval,
      RunType::Long => self.long,
    }
  }
}

impl Default for HrDriftTargets {
  fn default() -> Self {
    Self {
      easy: DriftTargets { ideal: 5.0, acceptable: 7.0, concern: 12.0 },
      tempo: DriftTargets { ideal: 8.0, acceptable: 10.0, concern: 15.0 },
      interval: DriftTargets { ideal: 8.0, acceptable: 10.0, concern: 15.0 },
      long: DriftTargets { ideal: 10.0, acceptable: 12.0, concern: 15.0 },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlanConfig {
  pub campaign_start: NaiveDate,
  /// plan week (1-based) -> week definition
  pub weeks: BTreeMap<u32, PlanWeek>,
  pub high_risk_months: Vec<u32>,
  pub moderate_risk_months: Vec<u32>,
  pub floor_km: f64,
  pub yellow_km: f64,
  #[serde(default)]
  pub hr_drift_targets: HrDriftTargets,
}

impl TrainingPlanConfig {
  pub fn load(path: &Path) -> Result<Self, PlanError> {
    let display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| PlanError::Io {
      path: display.clone(),
      source,
    })?;
    let plan: Self =
      serde_json::from_str(&raw).map_err(|source| PlanError::Parse { path: display, source })?;
    if plan.weeks.is_empty() {
      return Err(PlanError::Empty);
    }
    Ok(plan)
  }

  pub fn last_week(&self) -> u32 {
    self.weeks.keys().next_back().copied().unwrap_or(0)
  }

  /// Plan week a date falls in; 0 before the campaign, capped at the last week
  pub fn campaign_week(&self, date: NaiveDate) -> u32 {
    let days = (date - self.campaign_start).num_days();
    if days < 0 {
      return 0;
    }
    let week = (days / 7) as u32 + 1;
    week.min(self.last_week())
  }

  pub fn week(&self, week_num: u32) -> Option<&PlanWeek> {
    self.weeks.get(&week_num)
  }

  pub fn target_volume(&self, week_num: u32) -> f64 {
    self.week(week_num).map_or(0.0, |w| w.target_volume_km)
  }

  /// Plan context for the week containing `date`
  pub fn context_for(&self, date: NaiveDate) -> PlanContext {
    let campaign_week = self.campaign_week(date);
    match self.week(campaign_week) {
      Some(week) => PlanContext {
        campaign_week,
        plan_phase: week.phase.clone(),
        plan_target_km: week.target_volume_km,
        key_workout: week.key_workout.clone(),
      },
      None => PlanContext {
        campaign_week,
        plan_phase: "Unknown".to_string(),
        plan_target_km: 0.0,
        key_workout: String::new(),
      },
    }
  }

  pub fn is_high_risk_month(&self, month: u32) -> bool {
    self.high_risk_months.contains(&month)
  }

  pub fn is_moderate_risk_month(&self, month: u32) -> bool {
    self.moderate_risk_months.contains(&month)
  }
}

fn week(phase: &str, target_volume_km: f64, key_workout: &str) -> PlanWeek {
  PlanWeek {
    phase: phase.to_string(),
    target_volume_km,
    key_workout: key_workout.to_string(),
  }
}

impl Default for TrainingPlanConfig {
  /// 20-week spring half-marathon campaign
  fn default() -> Self {
    let weeks = [
      week("Recovery", 19.0, "Easy runs only"),
      week("Recovery", 28.0, "Fartlek reintroduction"),
      week("Base", 35.0, "First tempo (4km@5:55)"),
      week("Base (Deload)", 30.0, "Strides only"),
      week("Base", 37.0, "Tempo 5km@5:50"),
      week("Base", 39.0, "First intervals (5x1km@5:40)"),
      week("Base", 42.0, "Tempo 6km@5:45"),
      week("Base (Deload)", 31.0, "Strides only"),
      week("Build", 41.0, "Intervals 6x1km@5:35"),
      week("Build", 43.0, "Tempo 6km@5:40"),
      week("Build", 42.0, "VO2max 5x800m@5:15-5:25"),
      week("Build", 40.0, "Progressive threshold"),
      week("10K Taper", 27.0, "Sharpener 4x600m@5:15"),
      week("10K RACE", 24.0, "Race: Target 52:00-54:00"),
      week("Specific", 25.0, "Recovery week"),
      week("Specific", 40.0, "Long run 8km@5:50 (HM pace)"),
      week("Specific", 44.0, "Long run 10km@5:45-5:50 (KEY)"),
      week("Specific", 38.0, "HM rehearsal 5km@5:40"),
      week("Taper", 28.0, "Sharpener 3x1km@5:35"),
      week("HM RACE", 35.0, "Race: Target 2:00-2:03"),
    ];

    Self {
      campaign_start: NaiveDate::from_ymd_opt(2026, 1, 5).unwrap_or(NaiveDate::MIN),
      weeks: weeks
        .into_iter()
        .enumerate()
        .map(|(i, w)| (i as u32 + 1, w))
        .collect(),
      high_risk_months: vec![2, 4, 5],
      moderate_risk_months: vec![1, 3, 6],
      floor_km: 15.0,
      yellow_km: 20.0,
      hr_drift_targets: HrDriftTargets::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
  }

  #[test]
  fn test_campaign_week_boundaries() {
    let plan = TrainingPlanConfig::default();
    assert_eq!(plan.campaign_week(date(2026, 1, 4)), 0);
    assert_eq!(plan.campaign_week(date(2026, 1, 5)), 1);
    assert_eq!(plan.campaign_week(date(2026, 1, 11)), 1);
    assert_eq!(plan.campaign_week(date(2026, 1, 12)), 2);
    // Capped at the final plan week
    assert_eq!(plan.campaign_week(date(2026, 12, 1)), 20);
  }

  #[test]
  fn test_context_outside_campaign_is_unknown() {
    let plan = TrainingPlanConfig::default();
    let ctx = plan.context_for(date(2025, 12, 1));
    assert_eq!(ctx.campaign_week, 0);
    assert_eq!(ctx.plan_phase, "Unknown");
    assert_eq!(ctx.plan_target_km, 0.0);

    let ctx = plan.context_for(date(2026, 1, 20));
    assert_eq!(ctx.campaign_week, 3);
    assert_eq!(ctx.plan_phase, "Base");
    assert_eq!(ctx.plan_target_km, 35.0);
  }

  #[test]
  fn test_drift_targets_by_run_type() {
    let targets = HrDriftTargets::default();
    assert_eq!(targets.for_run_type(RunType::Easy).concern, 12.0);
    assert_eq!(targets.for_run_type(RunType::Long).ideal, 10.0);
  }

  #[test]
  fn test_load_plan_from_file() {
    let plan = TrainingPlanConfig::default();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file
      .write_all(serde_json::to_string(&plan).unwrap().as_bytes())
      .unwrap();

    let loaded = TrainingPlanConfig::load(file.path()).unwrap();
    assert_eq!(loaded, plan);
  }

  #[test]
  fn test_load_rejects_empty_plan() {
    let mut plan = TrainingPlanConfig::default();
    plan.weeks.clear();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file
      .write_all(serde_json::to_string(&plan).unwrap().as_bytes())
      .unwrap();

    assert!(matches!(
      TrainingPlanConfig::load(file.path()),
      Err(PlanError::Empty)
    ));
  }
}
