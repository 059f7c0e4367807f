//! Reconciliation engine
//!
//! Merges raw records from Garmin and Strava into the canonical store.
//! Matching is a pure time/distance heuristic; a wrong match is an accepted
//! risk and never aborts a run. Only the store invariants can do that.

use serde::Serialize;

use crate::models::{Activity, Lap, Platform, SourceTag};
use crate::sources::SourceBatch;
use crate::store::ActivityStore;

/// ---------------------------------------------------------------------------
/// Matching
/// ---------------------------------------------------------------------------

pub const DEFAULT_MAX_TIME_GAP_SECS: i64 = 2 * 60 * 60;
pub const DEFAULT_MAX_DISTANCE_DIFF_KM: f64 = 0.1;

/// Absorbs float noise in km differences (e.g. 1.1 - 1.0)
const DISTANCE_EPSILON_KM: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchThresholds {
  pub max_time_gap_secs: i64,
  pub max_distance_diff_km: f64,
}

impl Default for MatchThresholds {
  fn default() -> Self {
    Self {
      max_time_gap_secs: DEFAULT_MAX_TIME_GAP_SECS,
      max_distance_diff_km: DEFAULT_MAX_DISTANCE_DIFF_KM,
    }
  }
}

/// Two records describe the same physical run. Symmetric.
pub fn activities_match(a: &Activity, b: &Activity, thresholds: &MatchThresholds) -> bool {
  let gap_ms = (a.start - b.start).num_milliseconds().abs();
  if gap_ms > thresholds.max_time_gap_secs * 1000 {
    return false;
  }

  let distance_diff = (a.distance_km - b.distance_km).abs();
  distance_diff <= thresholds.max_distance_diff_km + DISTANCE_EPSILON_KM
}

/// ---------------------------------------------------------------------------
/// Field Merge Policy
/// ---------------------------------------------------------------------------

/// (laps carrying HR, total laps); compared lexicographically
fn lap_richness(laps: &[Lap]) -> (usize, usize) {
  (laps.iter().filter(|l| l.has_hr()).count(), laps.len())
}

/// Keep a populated value; fill it only when it is empty
fn keep_populated(existing: Option<f64>, incoming: Option<f64>) -> Option<f64> {
  existing.filter(|v| *v > 0.0).or(incoming.filter(|v| *v > 0.0))
}

/// Merge `incoming` into `existing`.
///
/// HR, cadence and laps are never replaced by emptier data. Descriptive
/// fields follow the freshest fetch whenever it carries a value.
pub fn merge_fields(existing: &Activity, incoming: &Activity) -> Activity {
  let mut merged = existing.clone();
  let platform = incoming.id.platform;

  merged.avg_hr = keep_populated(existing.avg_hr, incoming.avg_hr);
  merged.max_hr = keep_populated(existing.max_hr, incoming.max_hr);
  merged.avg_cadence = keep_populated(existing.avg_cadence, incoming.avg_cadence);

  if lap_richness(&incoming.laps) > lap_richness(&existing.laps) {
    merged.laps = incoming.laps.clone();
    merged.splits_source = incoming.splits_source.or(Some(platform));
  }

  if !incoming.name.is_empty() {
    merged.name = incoming.name.clone();
  }
  if incoming.distance_km > 0.0 {
    merged.distance_km = incoming.distance_km;
  }
  if incoming.duration_seconds > 0.0 {
    merged.duration_seconds = incoming.duration_seconds;
  }
  if incoming.avg_pace_min_km.is_some() {
    merged.avg_pace_min_km = incoming.avg_pace_min_km.clone();
  }
  if incoming.elevation_gain_m.is_some() {
    merged.elevation_gain_m = incoming.elevation_gain_m;
  }
  if incoming.elevation_loss_m.is_some() {
    merged.elevation_loss_m = incoming.elevation_loss_m;
  }
  if incoming.calories.is_some() {
    merged.calories = incoming.calories;
  }

  // Cross-source: record the other platform's id and escalate the tag
  if existing.id_for(platform).is_none() {
    merged.cross_ref_id = Some(incoming.id.clone());
  }
  if merged.cross_ref_id.is_none() {
    merged.cross_ref_id = incoming.cross_ref_id.clone();
  }
  merged.source = if merged.cross_ref_id.is_some() {
    SourceTag::Both
  } else {
    existing.source.escalate(platform)
  };

  merged
}

/// ---------------------------------------------------------------------------
/// Upsert
/// ---------------------------------------------------------------------------

/// Merge into the record at `idx`, refusing a cross reference that another
/// record already owns. No two records share an id.
fn merge_at(store: &ActivityStore, idx: usize, incoming: &Activity) -> Activity {
  let existing = &store.activities()[idx];
  let mut merged = merge_fields(existing, incoming);

  let claimed_elsewhere = merged
    .cross_ref_id
    .as_ref()
    .filter(|id| existing.cross_ref_id.as_ref() != Some(*id))
    .and_then(|id| store.position_of(id).filter(|owner| *owner != idx).map(|owner| (id, owner)));
  if let Some((id, owner)) = claimed_elsewhere {
    log::warn!(
      "[LINK] {} already belongs to {}; keeping records separate",
      id,
      store.activities()[owner].id
    );
    merged.cross_ref_id = existing.cross_ref_id.clone();
    merged.source = existing.source;
  }

  merged
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
  /// New record appended
  Added,
  /// Same source-qualified id already present
  Updated,
  /// Coalesced with a record from the other platform
  Matched,
}

/// Insert or merge one record.
///
/// Lookup by id is O(1). The fallback scan is O(n) over records that do not
/// yet carry an id for the incoming platform, which is fine at the
/// hundreds-to-low-thousands scale of a personal history.
pub fn upsert_activity(
  store: &mut ActivityStore,
  incoming: Activity,
  thresholds: &MatchThresholds,
) -> UpsertOutcome {
  let by_id = incoming
    .ids()
    .find_map(|id| store.position_of(id));
  if let Some(idx) = by_id {
    let merged = merge_at(store, idx, &incoming);
    store.replace(idx, merged);
    log::debug!("[UPDATE] {} ({})", incoming.id, incoming.start.date());
    return UpsertOutcome::Updated;
  }

  let platform = incoming.id.platform;
  let candidate = store.activities().iter().position(|existing| {
    existing.id_for(platform).is_none() && activities_match(existing, &incoming, thresholds)
  });

  match candidate {
    Some(idx) => {
      let existing = &store.activities()[idx];
      log::info!(
        "[MATCH] {} <-> {} ({}, {:.2}km)",
        existing.id,
        incoming.id,
        incoming.start.date(),
        incoming.distance_km
      );
      let merged = merge_at(store, idx, &incoming);
      store.replace(idx, merged);
      UpsertOutcome::Matched
    }
    None => {
      log::info!(
        "[ADD] {} ({}, {:.2}km)",
        incoming.id,
        incoming.start.date(),
        incoming.distance_km
      );
      store.push(incoming);
      UpsertOutcome::Added
    }
  }
}

/// ---------------------------------------------------------------------------
/// Batch Merge
/// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
  pub fetched: usize,
  pub added: usize,
  pub updated: usize,
  pub matched: usize,
}

impl MergeStats {
  pub fn record(&mut self, outcome: UpsertOutcome) {
    match outcome {
      UpsertOutcome::Added => self.added += 1,
      UpsertOutcome::Updated => self.updated += 1,
      UpsertOutcome::Matched => self.matched += 1,
    }
  }

  pub fn absorb(&mut self, other: &MergeStats) {
    self.fetched += other.fetched;
    self.added += other.added;
    self.updated += other.updated;
    self.matched += other.matched;
  }
}

/// Upsert a batch, then restore newest-first ordering
pub fn merge_batch(
  store: &mut ActivityStore,
  batch: SourceBatch,
  thresholds: &MatchThresholds,
) -> MergeStats {
  let mut stats = MergeStats {
    fetched: batch.activities.len(),
    ..Default::default()
  };

  log::info!(
    "[MERGE] Merging {} {} activities...",
    batch.activities.len(),
    batch.platform
  );
  for activity in batch.activities {
    stats.record(upsert_activity(store, activity, thresholds));
  }
  store.sort_newest_first();

  stats
}

/// Source tag counts, e.g. for the load summary
pub fn source_breakdown(activities: &[Activity]) -> Vec<(SourceTag, usize)> {
  [SourceTag::Garmin, SourceTag::Strava, SourceTag::Both]
    .into_iter()
    .map(|tag| (tag, activities.iter().filter(|a| a.source == tag).count()))
    .filter(|(_, n)| *n > 0)
    .collect()
}

/// Platform whose laps a record currently carries
pub fn splits_platform(activity: &Activity) -> Option<Platform> {
  if activity.laps.is_empty() {
    None
  } else {
    activity.splits_source.or(Some(activity.id.platform))
  }
}
