use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::kanji::{tx_resolve_or_create_kanji, Kanji};
use crate::store::operations::links::{tx_link, tx_unlink};
use crate::store::{abort, map_tx_error, tx_deserialize, tx_serialize, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StudyUnit {
    pub id: String,
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    /// Annotated form; see `study::annotation`.
    pub kanji_text: String,
    pub meaning_text: String,
    pub study_state: StudyState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Word,
    Kanji,
    Sentence,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StudyState {
    #[default]
    Undefined,
    Success,
    Fail,
}

/// Link changes applied by [`Store::apply_unit_text_change`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedLinkChange {
    pub linked_kanji_ids: Vec<String>,
    pub unlinked_kanji_ids: Vec<String>,
    pub created_kanji_ids: Vec<String>,
}

impl Store {
    pub fn get_unit(&self, unit_id: &str) -> Result<Option<StudyUnit>, StoreError> {
        let key = keys::unit_key(unit_id)?;
        match self.units.get(key.as_bytes())? {
            Some(raw) => Ok(Some(Self::deserialize(&raw)?)),
            None => Ok(None),
        }
    }

    /// Batch lookup preserving input order; unknown ids are skipped.
    pub fn get_units_by_ids(&self, unit_ids: &[String]) -> Result<Vec<StudyUnit>, StoreError> {
        let mut units = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            if let Some(unit) = self.get_unit(unit_id)? {
                units.push(unit);
            }
        }
        Ok(units)
    }

    pub fn count_units(&self) -> u64 {
        self.units.len() as u64
    }

    /// Insert a new unit, link it to every kanji in `kanji` (creating the ones
    /// not yet registered) and optionally to `set_id`, in one transaction.
    pub fn insert_unit_with_links(
        &self,
        unit: &StudyUnit,
        set_id: Option<&str>,
        kanji: &[Kanji],
    ) -> Result<AppliedLinkChange, StoreError> {
        let unit_key = keys::unit_key(&unit.id)?;
        let set_key = set_id.map(keys::set_key).transpose()?;
        let unit_bytes = Self::serialize(unit)?;

        (
            &self.units,
            &self.sets,
            &self.set_units,
            &self.unit_sets,
            &self.kanji,
            &self.kanji_by_character,
            &self.kanji_by_created_at,
            &self.unit_kanji,
            &self.kanji_units,
        )
            .transaction(
                |(
                    tx_units,
                    tx_sets,
                    tx_su,
                    tx_us,
                    tx_kanji,
                    tx_by_char,
                    tx_by_created,
                    tx_uk,
                    tx_ku,
                )| {
                    if tx_units.get(unit_key.as_bytes())?.is_some() {
                        return Err(abort(StoreError::Conflict {
                            entity: "unit".to_string(),
                            key: unit.id.clone(),
                        }));
                    }

                    if let (Some(set_id), Some(set_key)) = (set_id, set_key.as_ref()) {
                        if tx_sets.get(set_key.as_bytes())?.is_none() {
                            return Err(abort(StoreError::not_found("set", set_id)));
                        }
                        tx_link(tx_su, tx_us, set_id, &unit.id)?;
                    }

                    tx_units.insert(unit_key.as_bytes(), unit_bytes.as_slice())?;

                    let mut change = AppliedLinkChange::default();
                    for candidate in kanji {
                        let (kanji_id, created) = tx_resolve_or_create_kanji(
                            tx_kanji,
                            tx_by_char,
                            tx_by_created,
                            candidate,
                        )?;
                        if created {
                            change.created_kanji_ids.push(kanji_id.clone());
                        }
                        tx_link(tx_uk, tx_ku, &unit.id, &kanji_id)?;
                        change.linked_kanji_ids.push(kanji_id);
                    }
                    Ok(change)
                },
            )
            .map_err(map_tx_error)
    }

    /// Replace a unit's text and apply a precomputed kanji diff atomically.
    ///
    /// `expected_text` must match the stored text, otherwise the diff was
    /// computed against stale data and the transaction aborts with `Conflict`.
    pub fn apply_unit_text_change(
        &self,
        unit_id: &str,
        expected_text: &str,
        new_text: &str,
        meaning_text: Option<&str>,
        updated_at: DateTime<Utc>,
        removed_characters: &[String],
        added: &[Kanji],
    ) -> Result<(StudyUnit, AppliedLinkChange), StoreError> {
        let unit_key = keys::unit_key(unit_id)?;

        (
            &self.units,
            &self.kanji,
            &self.kanji_by_character,
            &self.kanji_by_created_at,
            &self.unit_kanji,
            &self.kanji_units,
        )
            .transaction(
                |(tx_units, tx_kanji, tx_by_char, tx_by_created, tx_uk, tx_ku)| {
                    let Some(raw) = tx_units.get(unit_key.as_bytes())? else {
                        return Err(abort(StoreError::not_found("unit", unit_id)));
                    };
                    let mut unit: StudyUnit = tx_deserialize(&raw)?;
                    if unit.kanji_text != expected_text {
                        return Err(abort(StoreError::Conflict {
                            entity: "unit_text".to_string(),
                            key: unit_id.to_string(),
                        }));
                    }

                    let mut change = AppliedLinkChange::default();
                    for character in removed_characters {
                        let char_key = keys::kanji_character_key(character);
                        let Some(raw_id) = tx_by_char.get(char_key.as_bytes())? else {
                            // Explicitly deleted kanji already lost its links.
                            continue;
                        };
                        let kanji_id = String::from_utf8_lossy(&raw_id).to_string();
                        if tx_unlink(tx_uk, tx_ku, unit_id, &kanji_id)? {
                            change.unlinked_kanji_ids.push(kanji_id);
                        }
                    }

                    for candidate in added {
                        let (kanji_id, created) = tx_resolve_or_create_kanji(
                            tx_kanji,
                            tx_by_char,
                            tx_by_created,
                            candidate,
                        )?;
                        if created {
                            change.created_kanji_ids.push(kanji_id.clone());
                        }
                        if tx_link(tx_uk, tx_ku, unit_id, &kanji_id)? {
                            change.linked_kanji_ids.push(kanji_id);
                        }
                    }

                    unit.kanji_text = new_text.to_string();
                    if let Some(meaning) = meaning_text {
                        unit.meaning_text = meaning.to_string();
                    }
                    unit.updated_at = updated_at;
                    tx_units.insert(unit_key.as_bytes(), tx_serialize(&unit)?)?;

                    Ok((unit, change))
                },
            )
            .map_err(map_tx_error)
    }

    /// Persist non-text fields of an existing unit.
    pub fn update_unit_details(&self, unit: &StudyUnit) -> Result<(), StoreError> {
        let unit_key = keys::unit_key(&unit.id)?;
        (&self.units)
            .transaction(|tx_units| {
                let Some(raw) = tx_units.get(unit_key.as_bytes())? else {
                    return Err(abort(StoreError::not_found("unit", &unit.id)));
                };
                let existing: StudyUnit = tx_deserialize(&raw)?;
                if existing.kanji_text != unit.kanji_text {
                    return Err(abort(StoreError::Validation(
                        "unit text must change through the relink path".to_string(),
                    )));
                }
                let stored = StudyUnit {
                    created_at: existing.created_at,
                    ..unit.clone()
                };
                tx_units.insert(unit_key.as_bytes(), tx_serialize(&stored)?)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    /// Delete a unit and every set/kanji link touching it. Kanji entities are kept.
    /// Returns `false` when the id is unknown.
    pub fn delete_unit(&self, unit_id: &str) -> Result<bool, StoreError> {
        let unit_key = keys::unit_key(unit_id)?;
        if !self.units.contains_key(unit_key.as_bytes())? {
            return Ok(false);
        }
        let set_ids = self.linked_ids(&self.unit_sets, unit_id)?;
        let kanji_ids = self.linked_ids(&self.unit_kanji, unit_id)?;

        (
            &self.units,
            &self.set_units,
            &self.unit_sets,
            &self.unit_kanji,
            &self.kanji_units,
        )
            .transaction(|(tx_units, tx_su, tx_us, tx_uk, tx_ku)| {
                tx_units.remove(unit_key.as_bytes())?;
                for set_id in &set_ids {
                    tx_unlink(tx_su, tx_us, set_id, unit_id)?;
                }
                for kanji_id in &kanji_ids {
                    tx_unlink(tx_uk, tx_ku, unit_id, kanji_id)?;
                }
                Ok(())
            })
            .map_err(map_tx_error)?;

        Ok(true)
    }

    /// Every stored unit; used to seed the reading dictionary.
    pub fn list_all_units(&self) -> Result<Vec<StudyUnit>, StoreError> {
        let mut units = Vec::new();
        for item in self.units.iter() {
            let (_, v) = item?;
            units.push(Self::deserialize::<StudyUnit>(&v)?);
        }
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn sample_unit(id: &str, text: &str) -> StudyUnit {
        let now = Utc::now();
        StudyUnit {
            id: id.to_string(),
            unit_type: UnitType::Word,
            kanji_text: text.to_string(),
            meaning_text: "meaning".to_string(),
            study_state: StudyState::Undefined,
            created_at: now,
            updated_at: now,
        }
    }

    fn candidate(id: &str, character: &str) -> Kanji {
        Kanji {
            id: id.to_string(),
            character: character.to_string(),
            meaning: String::new(),
            on_reading: String::new(),
            kun_reading: String::new(),
            created_at: Utc::now(),
            usage_count: 0,
        }
    }

    #[test]
    fn insert_links_kanji_and_reuses_existing() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db").to_str().unwrap()).unwrap();

        let first = store
            .insert_unit_with_links(
                &sample_unit("u1", "日本"),
                None,
                &[candidate("k1", "日"), candidate("k2", "本")],
            )
            .unwrap();
        assert_eq!(first.created_kanji_ids, vec!["k1", "k2"]);

        let second = store
            .insert_unit_with_links(&sample_unit("u2", "日"), None, &[candidate("k9", "日")])
            .unwrap();
        assert!(second.created_kanji_ids.is_empty());
        assert_eq!(second.linked_kanji_ids, vec!["k1"]);
        assert_eq!(store.get_kanji("k1").unwrap().unwrap().usage_count, 2);
    }

    #[test]
    fn insert_into_missing_set_rolls_back() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db-rb").to_str().unwrap()).unwrap();

        let result = store.insert_unit_with_links(
            &sample_unit("u1", "火"),
            Some("missing-set"),
            &[candidate("k1", "火")],
        );

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
        assert!(store.get_unit("u1").unwrap().is_none());
        assert!(store.get_kanji_by_character("火").unwrap().is_none());
    }

    #[test]
    fn stale_text_change_is_rejected() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db-stale").to_str().unwrap()).unwrap();
        store
            .insert_unit_with_links(&sample_unit("u1", "山"), None, &[candidate("k1", "山")])
            .unwrap();

        let result =
            store.apply_unit_text_change("u1", "川", "川", Some("river"), Utc::now(), &[], &[]);
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        let stored = store.get_unit("u1").unwrap().unwrap();
        assert_eq!(stored.kanji_text, "山");
        assert_ne!(stored.meaning_text, "river");
    }

    #[test]
    fn text_and_meaning_change_together() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db-both").to_str().unwrap()).unwrap();
        store
            .insert_unit_with_links(&sample_unit("u1", "山"), None, &[candidate("k1", "山")])
            .unwrap();

        let (unit, change) = store
            .apply_unit_text_change(
                "u1",
                "山",
                "川",
                Some("river"),
                Utc::now(),
                &["山".to_string()],
                &[candidate("k2", "川")],
            )
            .unwrap();
        assert_eq!(unit.meaning_text, "river");
        assert_eq!(change.unlinked_kanji_ids, vec!["k1".to_string()]);
        let stored = store.get_unit("u1").unwrap().unwrap();
        assert_eq!(stored.kanji_text, "川");
        assert_eq!(stored.meaning_text, "river");
    }

    #[test]
    fn delete_unit_keeps_kanji() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db-del").to_str().unwrap()).unwrap();
        store
            .insert_unit_with_links(&sample_unit("u1", "金"), None, &[candidate("k1", "金")])
            .unwrap();

        assert!(store.delete_unit("u1").unwrap());
        assert!(!store.delete_unit("u1").unwrap());

        let kanji = store.get_kanji("k1").unwrap().unwrap();
        assert_eq!(kanji.usage_count, 0);
    }

    #[test]
    fn details_update_cannot_change_text() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("units-db-det").to_str().unwrap()).unwrap();
        let unit = sample_unit("u1", "土");
        store.insert_unit_with_links(&unit, None, &[]).unwrap();

        let mut edited = unit.clone();
        edited.study_state = StudyState::Success;
        store.update_unit_details(&edited).unwrap();
        assert_eq!(
            store.get_unit("u1").unwrap().unwrap().study_state,
            StudyState::Success
        );

        edited.kanji_text = "土曜".to_string();
        assert!(matches!(
            store.update_unit_details(&edited),
            Err(StoreError::Validation(_))
        ));
    }
}
