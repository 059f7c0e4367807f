//! Weekly consistency report
//!
//! On-demand ISO-week aggregates of the canonical store with a floor-based
//! status. Nothing here is persisted.

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::metrics::compute_streak;
use crate::models::{week_key, Activity};
use crate::plan::TrainingPlanConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WeekStatus {
  Red,
  Yellow,
  Green,
}

impl WeekStatus {
  pub fn from_volume(distance_km: f64, plan: &TrainingPlanConfig) -> Self {
    if distance_km < plan.floor_km {
      WeekStatus::Red
    } else if distance_km < plan.yellow_km {
      WeekStatus::Yellow
    } else {
      WeekStatus::Green
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      WeekStatus::Red => "RED",
      WeekStatus::Yellow => "YELLOW",
      WeekStatus::Green => "GREEN",
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyAggregate {
  pub week: String,
  pub iso_year: i32,
  pub distance_km: f64,
  pub runs: u32,
  pub dates: Vec<NaiveDate>,
  pub status: WeekStatus,
}

fn week_monday(date: NaiveDate) -> NaiveDate {
  date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Aggregate running activities per ISO week, oldest first. Weeks without a
/// run between the first and last active week are included with zero volume.
pub fn weekly_aggregates(activities: &[Activity], plan: &TrainingPlanConfig) -> Vec<WeeklyAggregate> {
  let mut by_week: BTreeMap<NaiveDate, (f64, Vec<NaiveDate>)> = BTreeMap::new();
  for activity in activities.iter().filter(|a| a.is_running()) {
    let date = activity.start.date();
    let entry = by_week.entry(week_monday(date)).or_default();
    entry.0 += activity.distance_km;
    entry.1.push(date);
  }

  let (Some(first), Some(last)) = (
    by_week.keys().next().copied(),
    by_week.keys().next_back().copied(),
  ) else {
    return vec![];
  };

  let mut aggregates = Vec::new();
  let mut monday = first;
  while monday <= last {
    let (distance_km, mut dates) = by_week.remove(&monday).unwrap_or_default();
    dates.sort();
    aggregates.push(WeeklyAggregate {
      week: week_key(monday),
      iso_year: monday.iso_week().year(),
      distance_km,
      runs: dates.len() as u32,
      dates,
      status: WeekStatus::from_volume(distance_km, plan),
    });
    monday += Duration::days(7);
  }
  aggregates
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyReport {
  pub year: Option<i32>,
  pub weeks: Vec<WeeklyAggregate>,
  pub green: usize,
  pub yellow: usize,
  pub red: usize,
  /// Consecutive most-recent weeks at or above the floor
  pub streak_weeks: u32,
  pub floor_km: f64,
  pub yellow_km: f64,
}

impl WeeklyReport {
  pub fn build(activities: &[Activity], plan: &TrainingPlanConfig, year: Option<i32>) -> Self {
    let weeks: Vec<WeeklyAggregate> = weekly_aggregates(activities, plan)
      .into_iter()
      .filter(|w| year.map_or(true, |y| w.iso_year == y))
      .collect();

    let count = |status| weeks.iter().filter(|w| w.status == status).count();
    let volumes: Vec<f64> = weeks.iter().map(|w| w.distance_km).collect();

    Self {
      year,
      green: count(WeekStatus::Green),
      yellow: count(WeekStatus::Yellow),
      red: count(WeekStatus::Red),
      streak_weeks: compute_streak(&volumes, plan.floor_km, false),
      floor_km: plan.floor_km,
      yellow_km: plan.yellow_km,
      weeks,
    }
  }
}

impl fmt::Display for WeeklyReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rule = "=".repeat(70);
    let title = match self.year {
      Some(year) => format!("WEEKLY CONSISTENCY REPORT - {}", year),
      None => "WEEKLY CONSISTENCY REPORT".to_string(),
    };
    writeln!(f, "{}\n{}\n{}", rule, title, rule)?;

    if self.weeks.is_empty() {
      return write!(f, "No running weeks found");
    }

    writeln!(f, "{:<10} | {:>4} | {:>8} | {:<6} | Dates", "Week", "Runs", "Distance", "Status")?;
    writeln!(f, "{}", "-".repeat(70))?;
    for week in &self.weeks {
      let dates: Vec<String> = week.dates.iter().map(|d| d.format("%m-%d").to_string()).collect();
      writeln!(
        f,
        "{:<10} | {:>4} | {:>6.1}km | {:<6} | {}",
        week.week,
        week.runs,
        week.distance_km,
        week.status.as_str(),
        dates.join(", ")
      )?;
    }

    let total = self.weeks.len() as f64;
    let pct = |n: usize| n as f64 / total * 100.0;
    writeln!(f, "{}", rule)?;
    writeln!(f, "Weeks tracked: {}", self.weeks.len())?;
    writeln!(f, "  GREEN  (>= {}km):  {} ({:.0}%)", self.yellow_km, self.green, pct(self.green))?;
    writeln!(
      f,
      "  YELLOW ({}-{}km): {} ({:.0}%)",
      self.floor_km,
      self.yellow_km,
      self.yellow,
      pct(self.yellow)
    )?;
    writeln!(f, "  RED    (< {}km):   {} ({:.0}%)", self.floor_km, self.red, pct(self.red))?;
    write!(f, "Current streak (weeks >= {}km): {}", self.floor_km, self.streak_weeks)
  }
}
