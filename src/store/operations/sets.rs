use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::links::{tx_link, tx_unlink};
use crate::store::{abort, map_tx_error, tx_deserialize, tx_serialize, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudySet {
    pub id: String,
    pub title: String,
    pub kind: SetKind,
    pub created_at: DateTime<Utc>,
    pub closed: bool,
    pub auto_schedule: bool,
    pub preferred_front_type: FrontType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SetKind {
    #[default]
    Vocabulary,
    Kanji,
}

/// Which side of a card is shown first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FrontType {
    #[default]
    Kanji,
    Meaning,
    Reading,
}

impl Store {
    pub fn create_set(&self, set: &StudySet) -> Result<(), StoreError> {
        let key = keys::set_key(&set.id)?;
        let cas_result = self
            .sets
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(Self::serialize(set)?))?;

        if cas_result.is_err() {
            return Err(StoreError::Conflict {
                entity: "set".to_string(),
                key: set.id.clone(),
            });
        }
        Ok(())
    }

    pub fn get_set(&self, set_id: &str) -> Result<Option<StudySet>, StoreError> {
        let key = keys::set_key(set_id)?;
        match self.sets.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn update_set(&self, set: &StudySet) -> Result<(), StoreError> {
        let key = keys::set_key(&set.id)?;
        (&self.sets)
            .transaction(|tx_sets| {
                let Some(raw) = tx_sets.get(key.as_bytes())? else {
                    return Err(abort(StoreError::not_found("set", &set.id)));
                };
                let existing: StudySet = tx_deserialize(&raw)?;
                let stored = StudySet {
                    created_at: existing.created_at,
                    kind: existing.kind,
                    ..set.clone()
                };
                tx_sets.insert(key.as_bytes(), tx_serialize(&stored)?)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    /// Sets newest first. Closed sets are skipped unless `include_closed`.
    pub fn list_sets(&self, include_closed: bool) -> Result<Vec<StudySet>, StoreError> {
        let mut sets = Vec::new();
        for item in self.sets.iter() {
            let (_, v) = item?;
            let set: StudySet = Self::deserialize(&v)?;
            if include_closed || !set.closed {
                sets.push(set);
            }
        }
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sets)
    }

    /// Delete a set and its links. Member units and kanji survive.
    pub fn delete_set(&self, set_id: &str) -> Result<bool, StoreError> {
        let key = keys::set_key(set_id)?;
        if !self.sets.contains_key(key.as_bytes())? {
            return Ok(false);
        }
        let unit_ids = self.linked_ids(&self.set_units, set_id)?;
        let kanji_ids = self.linked_ids(&self.set_kanji, set_id)?;

        (
            &self.sets,
            &self.set_units,
            &self.unit_sets,
            &self.set_kanji,
            &self.kanji_sets,
        )
            .transaction(|(tx_sets, tx_su, tx_us, tx_sk, tx_ks)| {
                tx_sets.remove(key.as_bytes())?;
                for unit_id in &unit_ids {
                    tx_unlink(tx_su, tx_us, set_id, unit_id)?;
                }
                for kanji_id in &kanji_ids {
                    tx_unlink(tx_sk, tx_ks, set_id, kanji_id)?;
                }
                Ok(())
            })
            .map_err(map_tx_error)?;

        Ok(true)
    }

    /// Link a unit to a set. Both must exist. Returns `true` if newly linked.
    pub fn link_unit_to_set(&self, set_id: &str, unit_id: &str) -> Result<bool, StoreError> {
        let set_key = keys::set_key(set_id)?;
        let unit_key = keys::unit_key(unit_id)?;

        (&self.sets, &self.units, &self.set_units, &self.unit_sets)
            .transaction(|(tx_sets, tx_units, tx_su, tx_us)| {
                if tx_sets.get(set_key.as_bytes())?.is_none() {
                    return Err(abort(StoreError::not_found("set", set_id)));
                }
                if tx_units.get(unit_key.as_bytes())?.is_none() {
                    return Err(abort(StoreError::not_found("unit", unit_id)));
                }
                tx_link(tx_su, tx_us, set_id, unit_id)
            })
            .map_err(map_tx_error)
    }

    pub fn unlink_unit_from_set(&self, set_id: &str, unit_id: &str) -> Result<bool, StoreError> {
        (&self.set_units, &self.unit_sets)
            .transaction(|(tx_su, tx_us)| tx_unlink(tx_su, tx_us, set_id, unit_id))
            .map_err(map_tx_error)
    }

    /// Move units between sets in one transaction: every unit loses its
    /// `from_set_id` link (if any) and gains a `to_set_id` link (if missing).
    pub fn move_units(
        &self,
        unit_ids: &[String],
        from_set_id: &str,
        to_set_id: &str,
    ) -> Result<usize, StoreError> {
        let from_key = keys::set_key(from_set_id)?;
        let to_key = keys::set_key(to_set_id)?;
        let unit_keys = unit_ids
            .iter()
            .map(|id| keys::unit_key(id))
            .collect::<Result<Vec<_>, _>>()?;

        (&self.sets, &self.units, &self.set_units, &self.unit_sets)
            .transaction(|(tx_sets, tx_units, tx_su, tx_us)| {
                if tx_sets.get(from_key.as_bytes())?.is_none() {
                    return Err(abort(StoreError::not_found("set", from_set_id)));
                }
                if tx_sets.get(to_key.as_bytes())?.is_none() {
                    return Err(abort(StoreError::not_found("set", to_set_id)));
                }
                let mut moved = 0usize;
                for (unit_id, unit_key) in unit_ids.iter().zip(&unit_keys) {
                    if tx_units.get(unit_key.as_bytes())?.is_none() {
                        return Err(abort(StoreError::not_found("unit", unit_id)));
                    }
                    tx_unlink(tx_su, tx_us, from_set_id, unit_id)?;
                    tx_link(tx_su, tx_us, to_set_id, unit_id)?;
                    moved += 1;
                }
                Ok(moved)
            })
            .map_err(map_tx_error)
    }

    /// Link a kanji directly to a kanji-kind set.
    pub fn link_kanji_to_set(&self, set_id: &str, kanji_id: &str) -> Result<bool, StoreError> {
        let set_key = keys::set_key(set_id)?;
        let kanji_key = keys::kanji_key(kanji_id)?;

        (&self.sets, &self.kanji, &self.set_kanji, &self.kanji_sets)
            .transaction(|(tx_sets, tx_kanji, tx_sk, tx_ks)| {
                let Some(raw) = tx_sets.get(set_key.as_bytes())? else {
                    return Err(abort(StoreError::not_found("set", set_id)));
                };
                let set: StudySet = tx_deserialize(&raw)?;
                if set.kind != SetKind::Kanji {
                    return Err(abort(StoreError::Validation(
                        "kanji can only be linked to kanji sets".to_string(),
                    )));
                }
                if tx_kanji.get(kanji_key.as_bytes())?.is_none() {
                    return Err(abort(StoreError::not_found("kanji", kanji_id)));
                }
                tx_link(tx_sk, tx_ks, set_id, kanji_id)
            })
            .map_err(map_tx_error)
    }

    pub fn unlink_kanji_from_set(&self, set_id: &str, kanji_id: &str) -> Result<bool, StoreError> {
        (&self.set_kanji, &self.kanji_sets)
            .transaction(|(tx_sk, tx_ks)| tx_unlink(tx_sk, tx_ks, set_id, kanji_id))
            .map_err(map_tx_error)
    }
}
