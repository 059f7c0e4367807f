//! Insights store and enrichment pass
//!
//! Derived run and week metrics are cached by activity id and ISO week key.
//! A run is recomputed when forced, when it falls inside the lookback
//! window, or when it has never been enriched. Nothing here writes to the
//! canonical activity store.

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::metrics::{compute_streak, run_metrics, weekly_rollup};
use crate::models::{week_key, Activity, RunMetrics, WeekMetrics};
use crate::plan::TrainingPlanConfig;
use crate::store::write_atomic;

const TREND_WEEKS: usize = 4;

/// ---------------------------------------------------------------------------
/// Error Handling
/// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum InsightsError {
  #[error("I/O error on {path}: {source}")]
  Io {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Failed to parse insights file {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("Failed to serialize insights: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// ---------------------------------------------------------------------------
/// Insights Store
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Insights {
  #[serde(default)]
  pub runs: BTreeMap<String, RunMetrics>,
  #[serde(default)]
  pub weeks: BTreeMap<String, WeekMetrics>,
  #[serde(default)]
  pub last_computed: Option<String>,
}

impl Insights {
  /// Load cached insights; a missing file is an empty cache
  pub fn load(path: &Path) -> Result<Self, InsightsError> {
    if !path.exists() {
      log::info!("[INSIGHTS] No insights at {}; starting fresh", path.display());
      return Ok(Self::default());
    }

    let raw = fs::read_to_string(path).map_err(|source| InsightsError::Io {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&raw).map_err(|source| InsightsError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  pub fn save(&self, path: &Path) -> Result<(), InsightsError> {
    let json = serde_json::to_string_pretty(self).map_err(InsightsError::Serialize)?;
    write_atomic(path, json.as_bytes()).map_err(|source| InsightsError::Io {
      path: path.display().to_string(),
      source,
    })?;
    log::info!(
      "[INSIGHTS] Saved {} runs, {} weeks to {}",
      self.runs.len(),
      self.weeks.len(),
      path.display()
    );
    Ok(())
  }

  pub fn is_enriched(&self, activity: &Activity) -> bool {
    self.runs.contains_key(&activity.id.to_string())
  }
}

/// ---------------------------------------------------------------------------
/// Enrichment
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichOptions {
  /// Recompute runs that started within this many days
  pub days: Option<u32>,
  /// Recompute every run
  pub force: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
  pub runs: usize,
  pub weeks: usize,
  pub streak_weeks: u32,
}

/// Running activities grouped by ISO week, oldest run first within a week
pub fn group_by_week(activities: &[Activity]) -> BTreeMap<String, Vec<&Activity>> {
  let mut running: Vec<&Activity> = activities.iter().filter(|a| a.is_running()).collect();
  running.sort_by_key(|a| a.start);

  let mut weeks: BTreeMap<String, Vec<&Activity>> = BTreeMap::new();
  for activity in running {
    weeks.entry(activity.week_key()).or_default().push(activity);
  }
  weeks
}

pub fn weekly_volumes(weeks: &BTreeMap<String, Vec<&Activity>>) -> BTreeMap<String, f64> {
  weeks
    .iter()
    .map(|(key, runs)| (key.clone(), runs.iter().map(|a| a.distance_km).sum()))
    .collect()
}

/// Volume of every campaign week from the plan start up to the week of
/// `now`, zero-filled so gaps break the streak
pub fn campaign_volume_series(
  plan: &TrainingPlanConfig,
  volumes: &BTreeMap<String, f64>,
  now: NaiveDateTime,
) -> Vec<f64> {
  let current = week_key(now.date());
  let mut series = Vec::new();
  let mut date = plan.campaign_start;

  loop {
    let key = week_key(date);
    if key > current {
      break;
    }
    series.push(volumes.get(&key).copied().unwrap_or(0.0));
    date += Duration::days(7);
  }
  series
}

/// Up to four weeks of volume ending at `key`, over weeks that have runs
pub fn trailing_volumes(volumes: &BTreeMap<String, f64>, key: &str) -> Vec<f64> {
  let mut trailing: Vec<f64> = volumes
    .range(..=key.to_string())
    .rev()
    .take(TREND_WEEKS)
    .map(|(_, v)| *v)
    .collect();
  trailing.reverse();
  trailing
}

fn select_for_enrichment<'a>(
  weeks: &BTreeMap<String, Vec<&'a Activity>>,
  insights: &Insights,
  options: EnrichOptions,
  now: NaiveDateTime,
) -> Vec<&'a Activity> {
  let all = weeks.values().flatten().copied();

  if options.force {
    return all.collect();
  }
  let cutoff = options
    .days
    .filter(|d| *d > 0)
    .map(|days| (now - Duration::days(i64::from(days))).date());
  all
    .filter(|a| cutoff.map_or(false, |c| a.start.date() >= c) || !insights.is_enriched(a))
    .collect()
}

/// Recompute selected run metrics and re-roll the weeks they touch
pub fn enrich(
  insights: &mut Insights,
  activities: &[Activity],
  plan: &TrainingPlanConfig,
  options: EnrichOptions,
  now: NaiveDateTime,
) -> EnrichReport {
  let weeks = group_by_week(activities);
  let volumes = weekly_volumes(&weeks);
  let streak = compute_streak(
    &campaign_volume_series(plan, &volumes, now),
    plan.floor_km,
    true,
  );

  let selected = select_for_enrichment(&weeks, insights, options, now);
  let mut report = EnrichReport {
    streak_weeks: streak,
    ..Default::default()
  };
  if selected.is_empty() {
    log::info!("[ENRICH] All runs already enriched; use --force to recompute");
    return report;
  }
  log::info!("[ENRICH] Enriching {} runs...", selected.len());

  let mut affected = BTreeSet::new();
  for activity in selected {
    let key = activity.week_key();
    let week_runs = weeks.get(&key).map(Vec::as_slice).unwrap_or_default();
    let metrics = run_metrics(activity, week_runs, plan, streak, now);
    insights.runs.insert(activity.id.to_string(), metrics);
    affected.insert(key);
    report.runs += 1;
  }

  for key in affected {
    let Some(week_runs) = weeks.get(&key) else {
      continue;
    };
    let trailing = trailing_volumes(&volumes, &key);
    let rollup = weekly_rollup(&key, week_runs, plan, streak, &trailing, now);
    insights.weeks.insert(key, rollup);
    report.weeks += 1;
  }

  insights.last_computed = Some(now.format("%Y-%m-%dT%H:%M:%S").to_string());
  log::info!("[ENRICH] Enriched {} runs, {} weeks", report.runs, report.weeks);
  report
}
