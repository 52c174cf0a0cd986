use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::keys;
use crate::store::{Store, StoreError};

/// Process-wide schedule overrides, persisted as one blob.
///
/// Writes replace the whole blob; concurrent writers from different devices
/// resolve last-write-wins on `last_updated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleState {
    #[serde(rename = "studyIDs")]
    pub study_ids: Vec<String>,
    #[serde(rename = "reviewIDs")]
    pub review_ids: Vec<String>,
    #[serde(rename = "reviewedIDs")]
    pub reviewed_ids: Vec<String>,
    /// When each reviewed id was marked. Blobs from older clients omit it.
    #[serde(default)]
    pub reviewed_at: BTreeMap<String, DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl ScheduleState {
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            study_ids: Vec::new(),
            review_ids: Vec::new(),
            reviewed_ids: Vec::new(),
            reviewed_at: BTreeMap::new(),
            last_updated: now,
        }
    }
}

impl Store {
    pub fn get_schedule_state(&self) -> Result<Option<ScheduleState>, StoreError> {
        match self.schedule.get(keys::schedule_state_key().as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_schedule_state(&self, state: &ScheduleState) -> Result<(), StoreError> {
        self.schedule
            .insert(keys::schedule_state_key().as_bytes(), Self::serialize(state)?)?;
        Ok(())
    }
}
