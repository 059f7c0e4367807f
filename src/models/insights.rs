use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ---------------------------------------------------------------------------
/// Run Classification
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
  Easy,
  Tempo,
  Interval,
  Long,
}

impl RunType {
  pub fn as_str(&self) -> &'static str {
    match self {
      RunType::Easy => "easy",
      RunType::Tempo => "tempo",
      RunType::Interval => "interval",
      RunType::Long => "long",
    }
  }
}

impl fmt::Display for RunType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// ---------------------------------------------------------------------------
/// HR Drift Grading
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftGrade {
  Excellent,
  Ok,
  High,
  Concern,
  /// High drift explained by a negative split
  OkWithContext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HrDriftAssessment {
  pub grade: DriftGrade,
  pub raw_grade: DriftGrade,
  pub target_pct: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note: Option<String>,
}

/// ---------------------------------------------------------------------------
/// Form Statistics
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CadenceStats {
  pub avg: f64,
  pub cv_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrideStats {
  pub avg_cm: f64,
  /// cadence (spm) x stride (m); None without cadence data
  pub speed_index: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terrain {
  Flat,
  Uphill,
  Downhill,
  Rolling,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationSplit {
  pub lap: u32,
  pub gain_m: f64,
  pub loss_m: f64,
  pub net_m: f64,
  pub terrain: Terrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TerrainProfile {
  pub flat: u32,
  pub uphill: u32,
  pub downhill: u32,
  pub rolling: u32,
}

impl TerrainProfile {
  pub fn record(&mut self, terrain: Terrain) {
    match terrain {
      Terrain::Flat => self.flat += 1,
      Terrain::Uphill => self.uphill += 1,
      Terrain::Downhill => self.downhill += 1,
      Terrain::Rolling => self.rolling += 1,
    }
  }
}

/// ---------------------------------------------------------------------------
/// Risk Flags
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
  HighRiskMonth,
  ModerateRiskMonth,
  Below90Compliance,
  Below70Compliance,
  BelowFloor,
  StrongStreak,
}

/// ---------------------------------------------------------------------------
/// Plan Context Embedded In Insights
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanContext {
  pub campaign_week: u32,
  pub plan_phase: String,
  pub plan_target_km: f64,
  pub key_workout: String,
}

/// ---------------------------------------------------------------------------
/// Per-Run Metrics
/// ---------------------------------------------------------------------------

/// Derived metrics for one activity. `None` means "not computed".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
  pub activity_id: String,
  pub date: String,
  pub name: String,
  #[serde(with = "crate::models::date_format")]
  pub computed_at: NaiveDateTime,
  pub distance_km: f64,
  pub avg_pace: Option<String>,
  pub avg_hr: Option<f64>,
  pub max_hr: Option<f64>,
  pub run_type: RunType,
  pub pace_drift_pct: Option<f64>,
  pub hr_drift_pct: Option<f64>,
  pub hr_drift_grade: Option<HrDriftAssessment>,
  pub cadence: Option<CadenceStats>,
  pub stride: Option<StrideStats>,
  pub elevation_gain_m: Option<f64>,
  pub elevation_loss_m: Option<f64>,
  pub elevation_per_km: Vec<ElevationSplit>,
  pub terrain_profile: TerrainProfile,
  pub plan: PlanContext,
  pub week_volume_so_far: f64,
  pub week_compliance_pct: Option<f64>,
  pub weekly_streak: u32,
  pub risk_flags: Vec<RiskFlag>,
}

/// ---------------------------------------------------------------------------
/// Per-Week Metrics
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekMetrics {
  pub week: String,
  #[serde(with = "crate::models::date_format")]
  pub computed_at: NaiveDateTime,
  pub volume_km: f64,
  pub runs: u32,
  pub compliance_pct: Option<f64>,
  pub avg_pace: Option<String>,
  pub avg_hr: Option<f64>,
  pub cadence_avg: Option<f64>,
  pub stride_avg_cm: Option<f64>,
  pub speed_index: Option<f64>,
  pub longest_run_km: f64,
  pub streak_weeks: u32,
  pub volume_trend_4wk: Vec<f64>,
  pub plan: PlanContext,
  pub risk_flags: Vec<RiskFlag>,
}
