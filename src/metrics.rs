//! Deterministic metrics layer for running activities
//!
//! Pure functions over canonical activities and the training plan. Every
//! value that lacks input data comes back as `None`; nothing here reads
//! the clock or the filesystem.

use chrono::{Datelike, NaiveDateTime};

use crate::models::insights::{
  CadenceStats, DriftGrade, ElevationSplit, HrDriftAssessment, PlanContext, RiskFlag, RunType,
  StrideStats, Terrain, TerrainProfile,
};
use crate::models::{Activity, Lap, RunMetrics, WeekMetrics};
use crate::plan::{HrDriftTargets, TrainingPlanConfig};

/// ---------------------------------------------------------------------------
/// Thresholds
/// ---------------------------------------------------------------------------

/// Laps at least this long count as full splits
pub const FULL_SPLIT_M: f64 = 500.0;

/// 8:00/km; short laps at or below this speed are walk breaks
pub const RUNNING_SPEED_MPS: f64 = 2.08;

/// Minimum qualifying laps for a drift calculation
pub const MIN_DRIFT_LAPS: usize = 4;

/// Pace drift below this marks a negative split
pub const NEGATIVE_SPLIT_PCT: f64 = -2.0;

pub const STRONG_STREAK_WEEKS: u32 = 8;

/// Terrain: total vertical below this is flat, net beyond it is a climb/descent
const TERRAIN_THRESHOLD_M: f64 = 5.0;

const LONG_RUN_KM: f64 = 14.0;

const NEGATIVE_SPLIT_NOTE: &str = "negative_split_inflated";

fn round_to(value: f64, places: i32) -> f64 {
  let factor = 10f64.powi(places);
  (value * factor).round() / factor
}

fn round1(value: f64) -> f64 {
  round_to(value, 1)
}

fn mean(values: &[f64]) -> Option<f64> {
  if values.is_empty() {
    None
  } else {
    Some(values.iter().sum::<f64>() / values.len() as f64)
  }
}

/// ---------------------------------------------------------------------------
/// Split Filtering
/// ---------------------------------------------------------------------------

/// A lap is a walk break only when it is both short and slow
pub fn is_running_lap(lap: &Lap) -> bool {
  lap.distance_m >= FULL_SPLIT_M || lap.average_speed > RUNNING_SPEED_MPS
}

pub fn running_laps(laps: &[Lap]) -> Vec<&Lap> {
  laps.iter().filter(|lap| is_running_lap(lap)).collect()
}

/// Running laps that are also full splits
fn full_running_laps(laps: &[Lap]) -> Vec<&Lap> {
  running_laps(laps)
    .into_iter()
    .filter(|lap| lap.distance_m >= FULL_SPLIT_M)
    .collect()
}

/// Averages of the first and last quarter of `values`
fn quarter_averages(values: &[f64]) -> Option<(f64, f64)> {
  if values.len() < MIN_DRIFT_LAPS {
    return None;
  }
  let quarter = (values.len() / 4).max(1);
  let first = mean(&values[..quarter])?;
  let last = mean(&values[values.len() - quarter..])?;
  Some((first, last))
}

/// ---------------------------------------------------------------------------
/// Drift
/// ---------------------------------------------------------------------------

/// Percent slowdown from first to last quarter. Negative means a negative split.
pub fn pace_drift(laps: &[Lap]) -> Option<f64> {
  let speeds: Vec<f64> = full_running_laps(laps)
    .iter()
    .map(|lap| lap.average_speed)
    .collect();
  let (first, last) = quarter_averages(&speeds)?;
  if first == 0.0 {
    return None;
  }
  Some(round1((first - last) / first * 100.0))
}

/// Percent HR rise from first to last quarter
pub fn hr_drift(laps: &[Lap]) -> Option<f64> {
  let hrs: Vec<f64> = full_running_laps(laps)
    .iter()
    .filter_map(|lap| lap.average_hr.filter(|hr| *hr > 0.0))
    .collect();
  let (first, last) = quarter_averages(&hrs)?;
  if first == 0.0 {
    return None;
  }
  Some(round1((last - first) / first * 100.0))
}

/// Grade HR drift against the run type's targets.
///
/// A negative split pushes HR up on its own, so high or concern drift on a
/// negative-split run becomes `ok_with_context`. Concern is downgraded along
/// with high, not only high. The raw grade is kept.
pub fn grade_hr_drift(
  hr_drift_pct: Option<f64>,
  pace_drift_pct: Option<f64>,
  run_type: RunType,
  targets: &HrDriftTargets,
) -> Option<HrDriftAssessment> {
  let drift = hr_drift_pct?;
  let t = targets.for_run_type(run_type);

  let raw_grade = if drift <= t.ideal {
    DriftGrade::Excellent
  } else if drift <= t.acceptable {
    DriftGrade::Ok
  } else if drift <= t.concern {
    DriftGrade::High
  } else {
    DriftGrade::Concern
  };

  let negative_split = pace_drift_pct.map_or(false, |p| p < NEGATIVE_SPLIT_PCT);
  let inflated = negative_split && matches!(raw_grade, DriftGrade::High | DriftGrade::Concern);

  Some(HrDriftAssessment {
    grade: if inflated { DriftGrade::OkWithContext } else { raw_grade },
    raw_grade,
    target_pct: t.acceptable,
    note: inflated.then(|| NEGATIVE_SPLIT_NOTE.to_string()),
  })
}

/// ---------------------------------------------------------------------------
/// Form
/// ---------------------------------------------------------------------------

/// Mean cadence and its coefficient of variation over full running splits
pub fn cadence_stats(laps: &[Lap]) -> Option<CadenceStats> {
  let cadences: Vec<f64> = full_running_laps(laps)
    .iter()
    .filter_map(|lap| lap.average_cadence.filter(|c| *c > 0.0))
    .collect();
  let avg = mean(&cadences)?;

  let variance = cadences.iter().map(|c| (c - avg).powi(2)).sum::<f64>() / cadences.len() as f64;
  let cv_pct = variance.sqrt() / avg * 100.0;

  Some(CadenceStats {
    avg: round1(avg),
    cv_pct: round1(cv_pct),
  })
}

/// Mean stride and speed index (cadence x stride in m) over full running splits
pub fn stride_stats(laps: &[Lap]) -> Option<StrideStats> {
  let stride_laps: Vec<&Lap> = full_running_laps(laps)
    .into_iter()
    .filter(|lap| lap.stride_length_cm.map_or(false, |s| s > 0.0))
    .collect();

  let strides: Vec<f64> = stride_laps.iter().filter_map(|lap| lap.stride_length_cm).collect();
  let avg_stride = mean(&strides)?;

  let cadences: Vec<f64> = stride_laps
    .iter()
    .filter_map(|lap| lap.average_cadence.filter(|c| *c > 0.0))
    .collect();
  let speed_index = mean(&cadences).map(|cad| (cad * avg_stride / 100.0).round());

  Some(StrideStats {
    avg_cm: round1(avg_stride),
    speed_index,
  })
}

/// ---------------------------------------------------------------------------
/// Elevation
/// ---------------------------------------------------------------------------

pub fn classify_terrain(gain_m: f64, loss_m: f64) -> Terrain {
  let net = gain_m - loss_m;
  if gain_m + loss_m < TERRAIN_THRESHOLD_M {
    Terrain::Flat
  } else if net > TERRAIN_THRESHOLD_M {
    Terrain::Uphill
  } else if net < -TERRAIN_THRESHOLD_M {
    Terrain::Downhill
  } else {
    Terrain::Rolling
  }
}

/// Gain, loss and terrain of every full split
pub fn elevation_per_split(laps: &[Lap]) -> Vec<ElevationSplit> {
  full_running_laps(laps)
    .into_iter()
    .map(|lap| {
      let gain = round1(lap.elevation_gain_m.unwrap_or(0.0));
      let loss = round1(lap.elevation_loss_m.unwrap_or(0.0));
      ElevationSplit {
        lap: lap.index,
        gain_m: gain,
        loss_m: loss,
        net_m: round1(gain - loss),
        terrain: classify_terrain(gain, loss),
      }
    })
    .collect()
}

pub fn terrain_profile(splits: &[ElevationSplit]) -> TerrainProfile {
  let mut profile = TerrainProfile::default();
  for split in splits {
    profile.record(split.terrain);
  }
  profile
}

/// ---------------------------------------------------------------------------
/// Run Classification
/// ---------------------------------------------------------------------------

const INTERVAL_KEYWORDS: [&str; 4] = ["interval", "x1km", "x800", "x600"];
const TEMPO_KEYWORDS: [&str; 2] = ["tempo", "threshold"];

/// Keyword heuristic on the activity name (English naming conventions)
pub fn classify_run_type(name: &str, distance_km: f64) -> RunType {
  let lower = name.to_lowercase();

  if INTERVAL_KEYWORDS.iter().any(|k| lower.contains(k)) {
    return RunType::Interval;
  }
  // "6x1km@5:35" style rep notation
  if let Some((reps, _)) = lower.split_once('@') {
    if reps.contains('x') {
      return RunType::Interval;
    }
  }
  if TEMPO_KEYWORDS.iter().any(|k| lower.contains(k)) {
    return RunType::Tempo;
  }
  if distance_km >= LONG_RUN_KM || lower.contains("long") {
    return RunType::Long;
  }
  RunType::Easy
}

/// ---------------------------------------------------------------------------
/// Streaks and Risk
/// ---------------------------------------------------------------------------

/// Consecutive most-recent weeks at or above `floor`.
///
/// With `exclude_current_week` the last entry is treated as in progress and
/// skipped, unless it is the only entry.
pub fn compute_streak(weekly_volumes: &[f64], floor: f64, exclude_current_week: bool) -> u32 {
  let volumes = match weekly_volumes.split_last() {
    Some((_, completed)) if exclude_current_week && !completed.is_empty() => completed,
    _ => weekly_volumes,
  };

  volumes
    .iter()
    .rev()
    .take_while(|v| **v >= floor)
    .count() as u32
}

/// Independent flags; several may apply at once
pub fn compute_risk_flags(
  plan: &TrainingPlanConfig,
  month: u32,
  week_volume: f64,
  target_volume: f64,
  streak_weeks: u32,
) -> Vec<RiskFlag> {
  let mut flags = Vec::new();

  if plan.is_high_risk_month(month) {
    flags.push(RiskFlag::HighRiskMonth);
  } else if plan.is_moderate_risk_month(month) {
    flags.push(RiskFlag::ModerateRiskMonth);
  }

  if target_volume > 0.0 && week_volume < target_volume * 0.9 {
    flags.push(RiskFlag::Below90Compliance);
  }
  if target_volume > 0.0 && week_volume < target_volume * 0.7 {
    flags.push(RiskFlag::Below70Compliance);
  }
  if week_volume < plan.floor_km {
    flags.push(RiskFlag::BelowFloor);
  }
  if streak_weeks >= STRONG_STREAK_WEEKS {
    flags.push(RiskFlag::StrongStreak);
  }

  flags
}

fn compliance_pct(volume: f64, target: f64) -> Option<f64> {
  (target > 0.0).then(|| round1(volume / target * 100.0))
}

/// ---------------------------------------------------------------------------
/// Pace Strings
/// ---------------------------------------------------------------------------

/// `"M:SS"` to seconds per km
pub fn parse_pace(pace: &str) -> Option<u32> {
  let (minutes, seconds) = pace.trim().split_once(':')?;
  let minutes: u32 = minutes.parse().ok()?;
  let seconds: u32 = seconds.parse().ok()?;
  (seconds < 60).then_some(minutes * 60 + seconds)
}

/// Seconds per km to `"M:SS"`, truncating fractional seconds
pub fn format_pace(seconds_per_km: f64) -> String {
  let total = seconds_per_km.max(0.0).trunc() as u32;
  format!("{}:{:02}", total / 60, total % 60)
}

/// ---------------------------------------------------------------------------
/// Per-Run Metrics
/// ---------------------------------------------------------------------------

/// Everything derived for one run.
///
/// `week_activities` holds every run in the same ISO week (including this
/// one); `streak` is the campaign streak as of the enrichment pass.
pub fn run_metrics(
  activity: &Activity,
  week_activities: &[&Activity],
  plan: &TrainingPlanConfig,
  streak: u32,
  computed_at: NaiveDateTime,
) -> RunMetrics {
  let laps = &activity.laps;

  let pace_drift_pct = pace_drift(laps);
  let hr_drift_pct = hr_drift(laps);
  let run_type = classify_run_type(&activity.name, activity.distance_km);
  let hr_drift_grade = grade_hr_drift(hr_drift_pct, pace_drift_pct, run_type, &plan.hr_drift_targets);

  let elevation_per_km = elevation_per_split(laps);
  let split_gain: f64 = elevation_per_km.iter().map(|s| s.gain_m).sum();
  let split_loss: f64 = elevation_per_km.iter().map(|s| s.loss_m).sum();

  // Zero is a real reading; only fall back to splits when the summary has none
  let elevation_gain_m = match activity.elevation_gain_m {
    Some(gain) if gain > 0.0 => Some(round1(gain)),
    summary if elevation_per_km.is_empty() => summary.map(round1),
    _ => Some(round1(split_gain)),
  };
  let elevation_loss_m = if elevation_per_km.is_empty() {
    activity.elevation_loss_m.map(round1)
  } else {
    Some(round1(split_loss))
  };

  let plan_context = plan.context_for(activity.start.date());
  let week_volume: f64 = week_activities.iter().map(|a| a.distance_km).sum();
  let risk_flags = compute_risk_flags(
    plan,
    activity.start.month(),
    week_volume,
    plan_context.plan_target_km,
    streak,
  );

  RunMetrics {
    activity_id: activity.id.to_string(),
    date: activity.start.date().format("%Y-%m-%d").to_string(),
    name: activity.name.clone(),
    computed_at,
    distance_km: round_to(activity.distance_km, 2),
    avg_pace: activity.avg_pace_min_km.clone(),
    avg_hr: activity.avg_hr,
    max_hr: activity.max_hr,
    run_type,
    pace_drift_pct,
    hr_drift_pct,
    hr_drift_grade,
    cadence: cadence_stats(laps),
    stride: stride_stats(laps),
    elevation_gain_m,
    elevation_loss_m,
    terrain_profile: terrain_profile(&elevation_per_km),
    elevation_per_km,
    week_volume_so_far: round1(week_volume),
    week_compliance_pct: compliance_pct(week_volume, plan_context.plan_target_km),
    plan: plan_context,
    weekly_streak: streak,
    risk_flags,
  }
}

/// ---------------------------------------------------------------------------
/// Weekly Rollup
/// ---------------------------------------------------------------------------

/// Per-run average of a lap field over running laps
fn lap_field_average(activity: &Activity, field: impl Fn(&Lap) -> Option<f64>) -> Option<f64> {
  let values: Vec<f64> = running_laps(&activity.laps)
    .into_iter()
    .filter_map(|lap| field(lap).filter(|v| *v > 0.0))
    .collect();
  mean(&values)
}

/// Aggregate one ISO week.
///
/// `activities` must be the week's runs; the earliest one fixes the plan
/// context and the month used for risk flags. `trailing_volumes` is embedded
/// as-is (rounded) as the 4-week trend.
pub fn weekly_rollup(
  week_key: &str,
  activities: &[&Activity],
  plan: &TrainingPlanConfig,
  streak: u32,
  trailing_volumes: &[f64],
  computed_at: NaiveDateTime,
) -> WeekMetrics {
  let volume: f64 = activities.iter().map(|a| a.distance_km).sum();
  let first = activities.iter().min_by_key(|a| a.start);

  let plan_context = match first {
    Some(a) => plan.context_for(a.start.date()),
    None => PlanContext {
      campaign_week: 0,
      plan_phase: "Unknown".to_string(),
      plan_target_km: 0.0,
      key_workout: String::new(),
    },
  };

  let hrs: Vec<f64> = activities.iter().filter_map(|a| a.avg_hr.filter(|hr| *hr > 0.0)).collect();
  let paces: Vec<f64> = activities
    .iter()
    .filter_map(|a| a.avg_pace_min_km.as_deref().and_then(parse_pace))
    .map(f64::from)
    .collect();

  let cadences: Vec<f64> = activities
    .iter()
    .filter_map(|a| lap_field_average(a, |lap| lap.average_cadence))
    .collect();
  let strides: Vec<f64> = activities
    .iter()
    .filter_map(|a| lap_field_average(a, |lap| lap.stride_length_cm))
    .collect();

  let cadence_avg = mean(&cadences).map(f64::round);
  let stride_avg_cm = mean(&strides).map(round1);
  let speed_index = match (cadence_avg, stride_avg_cm) {
    (Some(cad), Some(stride)) => Some((cad * stride / 100.0).round()),
    _ => None,
  };

  let longest = activities.iter().map(|a| a.distance_km).fold(0.0, f64::max);
  let month = first.map_or(0, |a| a.start.month());
  let risk_flags = compute_risk_flags(plan, month, volume, plan_context.plan_target_km, streak);

  WeekMetrics {
    week: week_key.to_string(),
    computed_at,
    volume_km: round1(volume),
    runs: activities.len() as u32,
    compliance_pct: compliance_pct(volume, plan_context.plan_target_km),
    avg_pace: mean(&paces).map(format_pace),
    avg_hr: mean(&hrs).map(f64::round),
    cadence_avg,
    stride_avg_cm,
    speed_index,
    longest_run_km: round1(longest),
    streak_weeks: streak,
    volume_trend_4wk: trailing_volumes.iter().map(|v| round1(*v)).collect(),
    plan: plan_context,
    risk_flags,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::Platform;
  use crate::test_utils::*;

  fn lap(distance_m: f64, speed: f64) -> Lap {
    Lap {
      index: 1,
      distance_m,
      average_speed: speed,
      ..Default::default()
    }
  }

  fn hr_laps(hrs: &[f64]) -> Vec<Lap> {
    hrs
      .iter()
      .enumerate()
      .map(|(i, hr)| Lap {
        index: i as u32 + 1,
        distance_m: 1000.0,
        average_speed: 3.0,
        average_hr: Some(*hr),
        ..Default::default()
      })
      .collect()
  }

  #[test]
  fn test_running_split_filter() {
    assert!(!is_running_lap(&lap(300.0, 1.5)));
    assert!(is_running_lap(&lap(300.0, 2.5)));
    // Exactly 8:00/km is still a walk break when short
    assert!(!is_running_lap(&lap(300.0, 2.08)));
    // Full splits are kept regardless of pace
    assert!(is_running_lap(&lap(800.0, 1.0)));
  }

  #[test]
  fn test_pace_drift_needs_four_laps() {
    let three = vec![lap(1000.0, 3.0), lap(1000.0, 3.0), lap(1000.0, 2.7)];
    assert_eq!(pace_drift(&three), None);

    let four = vec![lap(1000.0, 3.0), lap(1000.0, 3.0), lap(1000.0, 3.0), lap(1000.0, 2.7)];
    let drift = pace_drift(&four).unwrap();
    crate::assert_approx_eq!(drift, 10.0, 1e-9);
  }

  #[test]
  fn test_pace_drift_ignores_partial_splits() {
    // The 300m finishing kick is fast but not a full split
    let laps = vec![
      lap(1000.0, 2.9),
      lap(1000.0, 2.9),
      lap(1000.0, 3.0),
      lap(300.0, 4.0),
    ];
    assert_eq!(pace_drift(&laps), None);
  }

  #[test]
  fn test_negative_split_pace_drift() {
    let laps = vec![
      lap(1000.0, 2.8),
      lap(1000.0, 2.8),
      lap(1000.0, 2.9),
      lap(1000.0, 2.9),
      lap(1000.0, 3.0),
      lap(1000.0, 3.0),
      lap(1000.0, 3.1),
      lap(1000.0, 3.1),
    ];
    // quarter = 2: (2.8 - 3.1) / 2.8
    crate::assert_approx_eq!(pace_drift(&laps).unwrap(), -10.7, 1e-9);
  }

  #[test]
  fn test_hr_drift() {
    assert_eq!(hr_drift(&hr_laps(&[140.0, 145.0, 150.0])), None);
    let drift = hr_drift(&hr_laps(&[140.0, 142.0, 146.0, 154.0])).unwrap();
    crate::assert_approx_eq!(drift, 10.0, 1e-9);

    // Laps without HR do not count toward the minimum
    let mut laps = hr_laps(&[140.0, 142.0, 146.0]);
    laps.push(lap(1000.0, 3.0));
    assert_eq!(hr_drift(&laps), None);
  }

  #[test]
  fn test_hr_drift_grade_negative_split_downgrade() {
    let targets = HrDriftTargets::default();

    let graded = grade_hr_drift(Some(11.0), Some(-5.0), RunType::Easy, &targets).unwrap();
    assert_eq!(graded.raw_grade, DriftGrade::High);
    assert_eq!(graded.grade, DriftGrade::OkWithContext);
    assert_eq!(graded.note.as_deref(), Some("negative_split_inflated"));
    assert_eq!(graded.target_pct, 7.0);

    let even = grade_hr_drift(Some(11.0), Some(0.0), RunType::Easy, &targets).unwrap();
    assert_eq!(even.grade, DriftGrade::High);
    assert!(even.note.is_none());

    let concern = grade_hr_drift(Some(13.0), Some(-5.0), RunType::Easy, &targets).unwrap();
    assert_eq!(concern.raw_grade, DriftGrade::Concern);
    assert_eq!(concern.grade, DriftGrade::OkWithContext);

    // -2 exactly is not a negative split
    let boundary = grade_hr_drift(Some(11.0), Some(-2.0), RunType::Easy, &targets).unwrap();
    assert_eq!(boundary.grade, DriftGrade::High);
  }

  #[test]
  fn test_hr_drift_grade_thresholds_by_run_type() {
    let targets = HrDriftTargets::default();
    let grade = |drift: f64, run_type| {
      grade_hr_drift(Some(drift), None, run_type, &targets).unwrap().grade
    };

    assert_eq!(grade(5.0, RunType::Easy), DriftGrade::Excellent);
    assert_eq!(grade(6.5, RunType::Easy), DriftGrade::Ok);
    assert_eq!(grade(12.5, RunType::Easy), DriftGrade::Concern);
    assert_eq!(grade(9.0, RunType::Tempo), DriftGrade::Ok);
    assert_eq!(grade(14.0, RunType::Interval), DriftGrade::High);
    assert_eq!(grade(11.0, RunType::Long), DriftGrade::Ok);
    assert!(grade_hr_drift(None, Some(-5.0), RunType::Easy, &targets).is_none());
  }

  #[test]
  fn test_cadence_and_stride_stats() {
    let laps: Vec<Lap> = [(170.0, 110.0), (174.0, 112.0), (178.0, 0.0)]
      .iter()
      .enumerate()
      .map(|(i, (cad, stride))| Lap {
        index: i as u32 + 1,
        distance_m: 1000.0,
        average_speed: 3.0,
        average_cadence: Some(*cad),
        stride_length_cm: Some(*stride),
        ..Default::default()
      })
      .collect();

    let cadence = cadence_stats(&laps).unwrap();
    assert_eq!(cadence.avg, 174.0);
    assert_eq!(cadence.cv_pct, 1.9);

    // Stride only counts laps with a stride reading: cadence 172, stride 111cm
    let stride = stride_stats(&laps).unwrap();
    assert_eq!(stride.avg_cm, 111.0);
    assert_eq!(stride.speed_index, Some(191.0));
  }

  #[test]
  fn test_form_stats_absent_without_data() {
    let laps = vec![lap(1000.0, 3.0), lap(1000.0, 3.0)];
    assert!(cadence_stats(&laps).is_none());
    assert!(stride_stats(&laps).is_none());
    assert!(cadence_stats(&[]).is_none());
  }

  #[test]
  fn test_walk_breaks_excluded_from_cadence() {
    let laps = vec![
      Lap {
        average_cadence: Some(170.0),
        ..lap(1000.0, 3.0)
      },
      Lap {
        average_cadence: Some(110.0),
        ..lap(200.0, 1.2)
      },
    ];
    assert_eq!(cadence_stats(&laps).unwrap().avg, 170.0);
  }

  #[test]
  fn test_terrain_classification() {
    assert_eq!(classify_terrain(2.0, 1.0), Terrain::Flat);
    assert_eq!(classify_terrain(12.0, 2.0), Terrain::Uphill);
    assert_eq!(classify_terrain(1.0, 12.0), Terrain::Downhill);
    assert_eq!(classify_terrain(6.0, 4.0), Terrain::Rolling);
  }

  #[test]
  fn test_elevation_per_split() {
    let laps = vec![
      Lap {
        index: 1,
        elevation_gain_m: Some(12.04),
        elevation_loss_m: Some(2.0),
        ..lap(1000.0, 3.0)
      },
      Lap {
        index: 2,
        ..lap(1000.0, 3.0)
      },
      Lap {
        index: 3,
        elevation_gain_m: Some(20.0),
        ..lap(250.0, 3.0)
      },
    ];
    let splits = elevation_per_split(&laps);
    assert_eq!(splits.len(), 2);
    assert_eq!(splits[0].gain_m, 12.0);
    assert_eq!(splits[0].net_m, 10.0);
    assert_eq!(splits[0].terrain, Terrain::Uphill);
    assert_eq!(splits[1].terrain, Terrain::Flat);

    let profile = terrain_profile(&splits);
    assert_eq!(profile.uphill, 1);
    assert_eq!(profile.flat, 1);
  }

  #[test]
  fn test_classify_run_type() {
    assert_eq!(classify_run_type("Intervals 6x1km@5:35", 9.0), RunType::Interval);
    assert_eq!(classify_run_type("5x800 on track", 8.0), RunType::Interval);
    assert_eq!(classify_run_type("4x2km@5:40", 12.0), RunType::Interval);
    assert_eq!(classify_run_type("Tempo 5km@5:50", 9.0), RunType::Tempo);
    assert_eq!(classify_run_type("Progressive Threshold", 10.0), RunType::Tempo);
    assert_eq!(classify_run_type("Sunday Long Run", 12.0), RunType::Long);
    assert_eq!(classify_run_type("Morning Run", 16.0), RunType::Long);
    assert_eq!(classify_run_type("Morning Run", 8.0), RunType::Easy);
    assert_eq!(classify_run_type("", 0.0), RunType::Easy);
  }

  #[test]
  fn test_streak() {
    assert_eq!(compute_streak(&[22.0, 18.0, 10.0, 25.0, 19.0], 15.0, true), 1);
    assert_eq!(compute_streak(&[22.0, 18.0, 10.0, 25.0, 19.0], 15.0, false), 2);
    assert_eq!(compute_streak(&[16.0, 17.0, 18.0, 19.0, 3.0], 15.0, true), 4);
    assert_eq!(compute_streak(&[], 15.0, true), 0);
    // A lone week is not dropped
    assert_eq!(compute_streak(&[20.0], 15.0, true), 1);
    assert_eq!(compute_streak(&[15.0, 14.9, 30.0], 15.0, true), 0);
  }

  #[test]
  fn test_risk_flags() {
    let plan = TrainingPlanConfig::default();

    let flags = compute_risk_flags(&plan, 2, 10.0, 30.0, 9);
    assert_eq!(
      flags,
      vec![
        RiskFlag::HighRiskMonth,
        RiskFlag::Below90Compliance,
        RiskFlag::Below70Compliance,
        RiskFlag::BelowFloor,
        RiskFlag::StrongStreak,
      ]
    );

    assert_eq!(compute_risk_flags(&plan, 3, 26.0, 30.0, 2), vec![
      RiskFlag::ModerateRiskMonth,
      RiskFlag::Below90Compliance,
    ]);
    assert!(compute_risk_flags(&plan, 7, 28.0, 30.0, 7).is_empty());
    // No target means no compliance flags
    assert_eq!(compute_risk_flags(&plan, 8, 12.0, 0.0, 0), vec![RiskFlag::BelowFloor]);
  }

  #[test]
  fn test_pace_strings() {
    assert_eq!(parse_pace("5:30"), Some(330));
    assert_eq!(parse_pace(" 10:05 "), Some(605));
    assert_eq!(parse_pace("5:75"), None);
    assert_eq!(parse_pace("fast"), None);
    assert_eq!(format_pace(335.9), "5:35");
    assert_eq!(format_pace(59.0), "0:59");
  }

  #[test]
  fn test_run_metrics_in_plan_context() {
    let plan = TrainingPlanConfig::default();
    // Plan week 5 (2026-02-02): Base, 37km
    let mut run = mock_activity(Platform::Garmin, "1", "2026-02-03 06:30:00", 10.0);
    run.name = "Tempo 5km@5:50".to_string();
    run.avg_pace_min_km = Some("5:45".to_string());
    run.elevation_gain_m = Some(0.0);
    run.laps = hr_laps(&[140.0, 142.0, 146.0, 154.0]);
    let other = mock_activity(Platform::Strava, "2", "2026-02-05 06:30:00", 8.5);

    let metrics = run_metrics(&run, &[&run, &other], &plan, 3, datetime("2026-02-08 20:00:00"));

    assert_eq!(metrics.activity_id, "garmin:1");
    assert_eq!(metrics.date, "2026-02-03");
    assert_eq!(metrics.run_type, RunType::Tempo);
    assert_eq!(metrics.plan.campaign_week, 5);
    assert_eq!(metrics.plan.plan_target_km, 37.0);
    assert_eq!(metrics.week_volume_so_far, 18.5);
    assert_eq!(metrics.week_compliance_pct, Some(50.0));
    assert_eq!(metrics.hr_drift_pct, Some(10.0));
    assert_eq!(metrics.hr_drift_grade.unwrap().grade, DriftGrade::Ok);
    assert_eq!(metrics.pace_drift_pct, Some(0.0));
    assert!(metrics.cadence.is_none());
    // Splits carry no elevation, so the totals are genuine zeros
    assert_eq!(metrics.elevation_gain_m, Some(0.0));
    assert_eq!(metrics.elevation_loss_m, Some(0.0));
    assert_eq!(metrics.terrain_profile.flat, 4);
    assert_eq!(
      metrics.risk_flags,
      vec![
        RiskFlag::HighRiskMonth,
        RiskFlag::Below90Compliance,
        RiskFlag::Below70Compliance,
      ]
    );
  }

  #[test]
  fn test_run_metrics_without_laps() {
    let plan = TrainingPlanConfig::default();
    let run = mock_activity(Platform::Strava, "9", "2025-11-20 06:30:00", 5.0);
    let metrics = run_metrics(&run, &[&run], &plan, 0, datetime("2025-11-21 20:00:00"));

    assert!(metrics.pace_drift_pct.is_none());
    assert!(metrics.hr_drift_grade.is_none());
    assert!(metrics.elevation_gain_m.is_none());
    assert!(metrics.elevation_per_km.is_empty());
    assert_eq!(metrics.plan.campaign_week, 0);
    assert!(metrics.week_compliance_pct.is_none());
  }

  #[test]
  fn test_run_metrics_are_deterministic() {
    let plan = TrainingPlanConfig::default();
    let mut run = mock_activity(Platform::Garmin, "1", "2026-03-10 06:30:00", 12.0);
    run.laps = hr_laps(&[150.0, 151.0, 153.0, 155.0, 158.0]);
    let now = datetime("2026-03-12 20:00:00");

    assert_eq!(
      run_metrics(&run, &[&run], &plan, 4, now),
      run_metrics(&run, &[&run], &plan, 4, now)
    );
  }

  #[test]
  fn test_weekly_rollup() {
    let plan = TrainingPlanConfig::default();
    let mut a = mock_activity(Platform::Garmin, "1", "2026-02-03 06:30:00", 10.0);
    a.avg_pace_min_km = Some("5:00".to_string());
    a.avg_hr = Some(150.0);
    a.laps = vec![
      Lap {
        average_cadence: Some(170.0),
        stride_length_cm: Some(110.0),
        ..lap(1000.0, 3.0)
      },
      // Walk break does not drag the averages down
      Lap {
        average_cadence: Some(100.0),
        stride_length_cm: Some(60.0),
        ..lap(200.0, 1.0)
      },
    ];
    let mut b = mock_activity(Platform::Garmin, "2", "2026-02-05 06:30:00", 14.5);
    b.avg_pace_min_km = Some("6:00".to_string());
    b.avg_hr = Some(141.0);

    let week = weekly_rollup(
      "2026-W06",
      &[&a, &b],
      &plan,
      2,
      &[30.04, 35.0, 28.0, 24.5],
      datetime("2026-02-08 20:00:00"),
    );

    assert_eq!(week.volume_km, 24.5);
    assert_eq!(week.runs, 2);
    assert_eq!(week.avg_pace.as_deref(), Some("5:30"));
    assert_eq!(week.avg_hr, Some(146.0));
    assert_eq!(week.cadence_avg, Some(170.0));
    assert_eq!(week.stride_avg_cm, Some(110.0));
    assert_eq!(week.speed_index, Some(187.0));
    assert_eq!(week.longest_run_km, 14.5);
    assert_eq!(week.compliance_pct, Some(66.2));
    assert_eq!(week.plan.campaign_week, 5);
    assert_eq!(week.volume_trend_4wk, vec![30.0, 35.0, 28.0, 24.5]);
    assert!(week.risk_flags.contains(&RiskFlag::Below70Compliance));
    assert!(!week.risk_flags.contains(&RiskFlag::BelowFloor));
  }

  #[test]
  fn test_weekly_rollup_without_optional_data() {
    let plan = TrainingPlanConfig::default();
    let a = mock_activity(Platform::Strava, "1", "2026-02-03 06:30:00", 4.0);
    let week = weekly_rollup("2026-W06", &[&a], &plan, 0, &[4.0], datetime("2026-02-08 20:00:00"));

    assert!(week.avg_pace.is_none());
    assert!(week.avg_hr.is_none());
    assert!(week.cadence_avg.is_none());
    assert!(week.speed_index.is_none());
    assert!(week.risk_flags.contains(&RiskFlag::BelowFloor));
  }
}
