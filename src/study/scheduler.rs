//! Date-driven study schedule.
//!
//! A set's bucket comes from its age in whole days, unless the process-wide
//! override blob says otherwise. The blob is last-write-wins as a whole: two
//! devices editing overrides at once lose one of the edits.
//!
//! Manual study/review selections last for the UTC day they were made on. A
//! reviewed mark lasts until the set's age reaches its next review checkpoint.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::operations::schedule::ScheduleState;
use crate::store::operations::sets::StudySet;
use crate::store::Store;
use crate::study::clock::Clock;
use crate::study::error::StudyError;

pub const STUDY_WINDOW_DAYS: i64 = 3;
pub const REVIEW_CHECKPOINTS: [i64; 4] = [3, 7, 14, 28];

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Study,
    Review,
    Reviewed,
    None,
}

/// Whole days from `created_at` to `today`, rounded down.
pub fn day_gap(created_at: DateTime<Utc>, today: DateTime<Utc>) -> i64 {
    (today - created_at).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Latest review checkpoint at or before `gap`, `None` while still inside the
/// study window.
pub fn checkpoint_reached(gap: i64) -> Option<i64> {
    REVIEW_CHECKPOINTS
        .iter()
        .rev()
        .copied()
        .find(|checkpoint| *checkpoint <= gap)
}

pub fn date_bucket(gap: i64) -> Bucket {
    if (0..STUDY_WINDOW_DAYS).contains(&gap) {
        Bucket::Study
    } else if REVIEW_CHECKPOINTS.contains(&gap) {
        Bucket::Review
    } else {
        Bucket::None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleItem {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub auto_schedule: bool,
    pub closed: bool,
}

impl From<&StudySet> for ScheduleItem {
    fn from(set: &StudySet) -> Self {
        Self {
            id: set.id.clone(),
            created_at: set.created_at,
            auto_schedule: set.auto_schedule,
            closed: set.closed,
        }
    }
}

/// Bucket of `item` on `today` under `state`.
///
/// Precedence: reviewed, manual study, manual review, then the date rule.
/// Closed items are always dormant; manually scheduled items never follow the
/// date rule.
pub fn bucket_for(item: &ScheduleItem, state: &ScheduleState, today: DateTime<Utc>) -> Bucket {
    if item.closed {
        return Bucket::None;
    }
    if reviewed_mark_holds(item, state, today) {
        return Bucket::Reviewed;
    }
    if state.study_ids.contains(&item.id) {
        return Bucket::Study;
    }
    if state.review_ids.contains(&item.id) {
        return Bucket::Review;
    }
    if !item.auto_schedule {
        return Bucket::None;
    }
    date_bucket(day_gap(item.created_at, today))
}

/// A mark made before `reviewed_at` existed counts as made at `last_updated`.
fn marked_at(state: &ScheduleState, id: &str) -> DateTime<Utc> {
    state
        .reviewed_at
        .get(id)
        .copied()
        .unwrap_or(state.last_updated)
}

/// Pin legacy marks to their implied time before `last_updated` moves.
fn backfill_mark_times(state: &mut ScheduleState) {
    let stamped = state.last_updated;
    for id in &state.reviewed_ids {
        state.reviewed_at.entry(id.clone()).or_insert(stamped);
    }
}

/// Whether `item` carries a reviewed mark that still applies on `today`.
pub fn reviewed_mark_holds(item: &ScheduleItem, state: &ScheduleState, today: DateTime<Utc>) -> bool {
    if !state.reviewed_ids.contains(&item.id) {
        return false;
    }
    let marked = day_gap(item.created_at, marked_at(state, &item.id));
    checkpoint_reached(marked) == checkpoint_reached(day_gap(item.created_at, today))
}

/// Overrides as seen on `now`'s UTC day. Manual selections written on an
/// earlier day no longer apply; reviewed marks are kept and expire per item.
pub fn rolled_over(mut state: ScheduleState, now: DateTime<Utc>) -> ScheduleState {
    if state.last_updated.date_naive() < now.date_naive() {
        state.study_ids.clear();
        state.review_ids.clear();
    }
    state
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TodayBuckets {
    pub study: Vec<String>,
    pub review: Vec<String>,
    pub reviewed: Vec<String>,
}

fn push_unique(ids: &mut Vec<String>, id: &str) {
    if !ids.iter().any(|existing| existing == id) {
        ids.push(id.to_string());
    }
}

pub struct Scheduler {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Current override state, rolled over to today.
    pub fn state(&self) -> Result<ScheduleState, StudyError> {
        let now = self.clock.now();
        let stored = self
            .store
            .get_schedule_state()?
            .unwrap_or_else(|| ScheduleState::empty(now));
        Ok(rolled_over(stored, now))
    }

    pub fn bucket_for(&self, item: &ScheduleItem) -> Result<Bucket, StudyError> {
        Ok(bucket_for(item, &self.state()?, self.clock.now()))
    }

    pub fn today(&self, items: &[ScheduleItem]) -> Result<TodayBuckets, StudyError> {
        let state = self.state()?;
        let now = self.clock.now();
        let mut buckets = TodayBuckets::default();
        for item in items {
            match bucket_for(item, &state, now) {
                Bucket::Study => buckets.study.push(item.id.clone()),
                Bucket::Review => buckets.review.push(item.id.clone()),
                Bucket::Reviewed => buckets.reviewed.push(item.id.clone()),
                Bucket::None => {}
            }
        }
        Ok(buckets)
    }

    /// Merge manual selections into the blob. An id moves between lists
    /// rather than sitting in both; an id in both inputs ends up in review.
    pub fn apply_overrides(
        &self,
        study_ids: &[String],
        review_ids: &[String],
    ) -> Result<ScheduleState, StudyError> {
        self.mutate(|state| {
            for id in study_ids {
                state.review_ids.retain(|existing| existing != id);
                push_unique(&mut state.study_ids, id);
            }
            for id in review_ids {
                state.study_ids.retain(|existing| existing != id);
                push_unique(&mut state.review_ids, id);
            }
            true
        })
    }

    /// Idempotent while the mark holds: re-marking leaves the blob untouched.
    /// A mark that expired at a later checkpoint is renewed.
    pub fn mark_reviewed(&self, item: &ScheduleItem) -> Result<ScheduleState, StudyError> {
        let now = self.clock.now();
        self.mutate(|state| {
            if reviewed_mark_holds(item, state, now) {
                return false;
            }
            push_unique(&mut state.reviewed_ids, &item.id);
            state.reviewed_at.insert(item.id.clone(), now);
            true
        })
    }

    pub fn clear(&self) -> Result<ScheduleState, StudyError> {
        self.mutate(|state| {
            state.study_ids.clear();
            state.review_ids.clear();
            state.reviewed_ids.clear();
            state.reviewed_at.clear();
            true
        })
    }

    /// Adopt `remote` if it was written after the local blob.
    pub fn merge_remote(&self, remote: ScheduleState) -> Result<ScheduleState, StudyError> {
        let _guard = self.store.write_guard();
        let local = self.store.get_schedule_state()?;
        match local {
            Some(local) if local.last_updated >= remote.last_updated => {
                tracing::debug!("Remote schedule state is older, keeping local");
                Ok(rolled_over(local, self.clock.now()))
            }
            _ => {
                self.store.set_schedule_state(&remote)?;
                tracing::info!(last_updated = %remote.last_updated, "Remote schedule state adopted");
                Ok(rolled_over(remote, self.clock.now()))
            }
        }
    }

    /// Persist the rollover: drop stale manual selections and every reviewed
    /// mark whose set moved to another checkpoint or no longer exists.
    /// Returns `true` if the blob changed.
    pub fn rollover(&self) -> Result<bool, StudyError> {
        let _guard = self.store.write_guard();
        let now = self.clock.now();
        let Some(stored) = self.store.get_schedule_state()? else {
            return Ok(false);
        };
        let items: Vec<ScheduleItem> = self
            .store
            .list_sets(true)?
            .iter()
            .map(ScheduleItem::from)
            .collect();

        let mut next = rolled_over(stored.clone(), now);
        backfill_mark_times(&mut next);
        let expired: Vec<String> = next
            .reviewed_ids
            .iter()
            .filter(|id| {
                items
                    .iter()
                    .find(|item| &item.id == *id)
                    .map_or(true, |item| !reviewed_mark_holds(item, &next, now))
            })
            .cloned()
            .collect();
        next.reviewed_ids.retain(|id| !expired.contains(id));
        next.reviewed_at.retain(|id, _| next.reviewed_ids.contains(id));
        if next == stored {
            return Ok(false);
        }
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "Expired reviewed marks dropped");
        }
        next.last_updated = now;
        self.store.set_schedule_state(&next)?;
        Ok(true)
    }

    fn mutate(
        &self,
        apply: impl FnOnce(&mut ScheduleState) -> bool,
    ) -> Result<ScheduleState, StudyError> {
        let _guard = self.store.write_guard();
        let mut state = self.state()?;
        backfill_mark_times(&mut state);
        if apply(&mut state) {
            state.last_updated = self.clock.now();
            self.store.set_schedule_state(&state)?;
        }
        Ok(state)
    }
}
