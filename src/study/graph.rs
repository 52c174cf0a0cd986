use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::store::operations::kanji::Kanji;
use crate::store::operations::sets::{FrontType, SetKind, StudySet};
use crate::store::operations::units::{StudyState, StudyUnit, UnitType};
use crate::store::{Store, StoreError};
use crate::study::annotation::{parse_annotated, to_annotated_string};
use crate::study::clock::Clock;
use crate::study::error::StudyError;
use crate::study::extractor::{extract_kanji, kanji_diff, KanjiDiff};
use crate::study::registry::KanjiRegistry;

/// Re-reads of a unit whose text changed under a concurrent edit.
const TEXT_CHANGE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUnit {
    #[serde(rename = "type")]
    pub unit_type: UnitType,
    pub kanji_text: String,
    #[serde(default)]
    pub meaning_text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSet {
    pub title: String,
    #[serde(default)]
    pub kind: SetKind,
    #[serde(default = "default_auto_schedule")]
    pub auto_schedule: bool,
    #[serde(default)]
    pub preferred_front_type: FrontType,
}

fn default_auto_schedule() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPatch {
    pub title: Option<String>,
    pub closed: Option<bool>,
    pub auto_schedule: Option<bool>,
    pub preferred_front_type: Option<FrontType>,
}

/// Sets, units and kanji, and the links between them.
///
/// Mutations are serialised through the store's writer lock. Knowledge
/// lookups for new kanji run before the lock is taken.
pub struct RelationshipGraph {
    store: Arc<Store>,
    registry: Arc<KanjiRegistry>,
    clock: Arc<dyn Clock>,
}

/// Canonical annotated form of user input.
fn normalize_text(text: &str) -> Result<String, StudyError> {
    let segments = parse_annotated(text)?;
    if segments.is_empty() {
        return Err(StudyError::Validation("kanji text must not be empty".to_string()));
    }
    Ok(to_annotated_string(&segments))
}

fn validate_title(title: &str) -> Result<String, StudyError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StudyError::Validation("set title must not be empty".to_string()));
    }
    Ok(title.to_string())
}

impl RelationshipGraph {
    pub fn new(store: Arc<Store>, registry: Arc<KanjiRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            clock,
        }
    }

    // ---- sets ----

    pub fn create_set(&self, new_set: NewSet) -> Result<StudySet, StudyError> {
        let set = StudySet {
            id: Uuid::new_v4().to_string(),
            title: validate_title(&new_set.title)?,
            kind: new_set.kind,
            created_at: self.clock.now(),
            closed: false,
            auto_schedule: new_set.auto_schedule,
            preferred_front_type: new_set.preferred_front_type,
        };
        {
            let _guard = self.store.write_guard();
            self.store.create_set(&set)?;
        }
        tracing::info!(set_id = %set.id, kind = ?set.kind, "Study set created");
        Ok(set)
    }

    pub fn get_set(&self, set_id: &str) -> Result<StudySet, StudyError> {
        self.store
            .get_set(set_id)?
            .ok_or_else(|| StudyError::not_found("set", set_id))
    }

    pub fn update_set(&self, set_id: &str, patch: SetPatch) -> Result<StudySet, StudyError> {
        let _guard = self.store.write_guard();
        let mut set = self.get_set(set_id)?;
        if let Some(title) = patch.title {
            set.title = validate_title(&title)?;
        }
        if let Some(closed) = patch.closed {
            set.closed = closed;
        }
        if let Some(auto_schedule) = patch.auto_schedule {
            set.auto_schedule = auto_schedule;
        }
        if let Some(front) = patch.preferred_front_type {
            set.preferred_front_type = front;
        }
        self.store.update_set(&set)?;
        Ok(set)
    }

    pub fn list_sets(&self, include_closed: bool) -> Result<Vec<StudySet>, StudyError> {
        Ok(self.store.list_sets(include_closed)?)
    }

    /// Removes the set and its links. Members survive.
    pub fn delete_set(&self, set_id: &str) -> Result<(), StudyError> {
        let _guard = self.store.write_guard();
        if !self.store.delete_set(set_id)? {
            return Err(StudyError::not_found("set", set_id));
        }
        tracing::info!(set_id = %set_id, "Study set deleted");
        Ok(())
    }

    // ---- set <-> unit links ----

    /// Returns `true` when the link is new.
    pub fn link_unit_to_set(&self, set_id: &str, unit_id: &str) -> Result<bool, StudyError> {
        let _guard = self.store.write_guard();
        Ok(self.store.link_unit_to_set(set_id, unit_id)?)
    }

    /// Removing an absent link is a no-op returning `false`.
    pub fn unlink_unit_from_set(&self, set_id: &str, unit_id: &str) -> Result<bool, StudyError> {
        let _guard = self.store.write_guard();
        Ok(self.store.unlink_unit_from_set(set_id, unit_id)?)
    }

    /// Move units from one set to another, all or nothing.
    ///
    /// Unknown units reject the whole batch with their ids. Units that were
    /// not in `from_set_id` are only linked to `to_set_id`.
    pub fn move_units(
        &self,
        unit_ids: &[String],
        from_set_id: &str,
        to_set_id: &str,
    ) -> Result<usize, StudyError> {
        let mut seen = HashSet::new();
        let unit_ids: Vec<String> = unit_ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();

        let _guard = self.store.write_guard();
        self.get_set(from_set_id)?;
        self.get_set(to_set_id)?;

        let mut failed = Vec::new();
        for unit_id in &unit_ids {
            match self.store.get_unit(unit_id) {
                Ok(Some(_)) => {}
                Ok(None) | Err(StoreError::Validation(_)) => failed.push(unit_id.clone()),
                Err(err) => return Err(err.into()),
            }
        }
        if !failed.is_empty() {
            tracing::warn!(
                from_set_id,
                to_set_id,
                failed = failed.len(),
                "Unit move rejected"
            );
            return Err(StudyError::BatchRejected { failed });
        }

        let moved = self.store.move_units(&unit_ids, from_set_id, to_set_id)?;
        tracing::info!(from_set_id, to_set_id, moved, "Units moved");
        Ok(moved)
    }

    pub fn units_in_set(&self, set_id: &str) -> Result<Vec<StudyUnit>, StudyError> {
        self.get_set(set_id)?;
        let unit_ids = self.store.linked_ids(&self.store.set_units, set_id)?;
        let mut units = self.store.get_units_by_ids(&unit_ids)?;
        units.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(units)
    }

    pub fn sets_of_unit(&self, unit_id: &str) -> Result<Vec<StudySet>, StudyError> {
        self.get_unit(unit_id)?;
        let mut sets = Vec::new();
        for set_id in self.store.linked_ids(&self.store.unit_sets, unit_id)? {
            if let Some(set) = self.store.get_set(&set_id)? {
                sets.push(set);
            }
        }
        Ok(sets)
    }

    // ---- units ----

    pub fn get_unit(&self, unit_id: &str) -> Result<StudyUnit, StudyError> {
        self.store
            .get_unit(unit_id)?
            .ok_or_else(|| StudyError::not_found("unit", unit_id))
    }

    /// Create a unit, link its kanji (registering new ones) and optionally
    /// link it to `set_id`, in one transaction.
    pub async fn insert_unit(
        &self,
        new_unit: NewUnit,
        set_id: Option<&str>,
    ) -> Result<StudyUnit, StudyError> {
        let kanji_text = normalize_text(&new_unit.kanji_text)?;
        let characters = extract_kanji(&kanji_text)?;
        let candidates = self.registry.prepare_candidates(&characters).await?;

        let now = self.clock.now();
        let unit = StudyUnit {
            id: Uuid::new_v4().to_string(),
            unit_type: new_unit.unit_type,
            kanji_text,
            meaning_text: new_unit.meaning_text.trim().to_string(),
            study_state: StudyState::Undefined,
            created_at: now,
            updated_at: now,
        };

        let change = {
            let _guard = self.store.write_guard();
            self.store.insert_unit_with_links(&unit, set_id, &candidates)?
        };

        tracing::info!(
            unit_id = %unit.id,
            set_id = set_id.unwrap_or("-"),
            linked = change.linked_kanji_ids.len(),
            created = change.created_kanji_ids.len(),
            "Study unit created"
        );
        Ok(unit)
    }

    /// Replace a unit's text and relink by kanji diff.
    ///
    /// Kanji present before and after keep their link untouched; only removed
    /// ones are unlinked and only added ones are upserted and linked.
    pub async fn on_unit_text_changed(
        &self,
        unit_id: &str,
        new_text: &str,
    ) -> Result<KanjiDiff, StudyError> {
        let (_, diff) = self.edit_unit(unit_id, Some(new_text), None).await?;
        Ok(diff)
    }

    /// Apply a text and/or meaning edit as one store write.
    ///
    /// A text edit relinks as in [`Self::on_unit_text_changed`]; the meaning
    /// is written in the same transaction.
    pub async fn edit_unit(
        &self,
        unit_id: &str,
        new_text: Option<&str>,
        meaning: Option<&str>,
    ) -> Result<(StudyUnit, KanjiDiff), StudyError> {
        let meaning = meaning.map(str::trim);
        let Some(new_text) = new_text else {
            let unit = match meaning {
                Some(meaning) => self.update_meaning(unit_id, meaning)?,
                None => self.get_unit(unit_id)?,
            };
            return Ok((unit, KanjiDiff::default()));
        };
        let new_text = normalize_text(new_text)?;
        let now_kanji = extract_kanji(&new_text)?;

        for attempt in 1..=TEXT_CHANGE_ATTEMPTS {
            let unit = self.get_unit(unit_id)?;
            if unit.kanji_text == new_text {
                let unit = match meaning {
                    Some(meaning) => self.update_meaning(unit_id, meaning)?,
                    None => unit,
                };
                return Ok((unit, KanjiDiff::default()));
            }

            let previous_kanji = extract_kanji(&unit.kanji_text)?;
            let diff = kanji_diff(&previous_kanji, &now_kanji);
            let candidates = self.registry.prepare_candidates(&diff.added).await?;
            let removed: Vec<String> = diff.removed.iter().map(char::to_string).collect();

            let result = {
                let _guard = self.store.write_guard();
                self.store.apply_unit_text_change(
                    unit_id,
                    &unit.kanji_text,
                    &new_text,
                    meaning,
                    self.clock.now(),
                    &removed,
                    &candidates,
                )
            };

            match result {
                Ok((unit, change)) => {
                    tracing::info!(
                        unit_id,
                        added = diff.added.len(),
                        removed = diff.removed.len(),
                        kept = diff.kept.len(),
                        created = change.created_kanji_ids.len(),
                        "Unit text relinked"
                    );
                    return Ok((unit, diff));
                }
                Err(StoreError::Conflict { entity, .. }) if entity == "unit_text" => {
                    tracing::debug!(unit_id, attempt, "Unit text changed concurrently, retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(StudyError::StorageFailure(StoreError::Conflict {
            entity: "unit_text".to_string(),
            key: unit_id.to_string(),
        }))
    }

    pub fn update_meaning(&self, unit_id: &str, meaning: &str) -> Result<StudyUnit, StudyError> {
        self.update_unit_with(unit_id, |unit| unit.meaning_text = meaning.trim().to_string())
    }

    pub fn set_study_state(&self, unit_id: &str, state: StudyState) -> Result<StudyUnit, StudyError> {
        self.update_unit_with(unit_id, |unit| unit.study_state = state)
    }

    fn update_unit_with(
        &self,
        unit_id: &str,
        apply: impl FnOnce(&mut StudyUnit),
    ) -> Result<StudyUnit, StudyError> {
        let _guard = self.store.write_guard();
        let mut unit = self.get_unit(unit_id)?;
        apply(&mut unit);
        unit.updated_at = self.clock.now();
        self.store.update_unit_details(&unit)?;
        Ok(unit)
    }

    /// Hard delete. Every link goes, linked kanji stay.
    pub fn delete_unit(&self, unit_id: &str) -> Result<(), StudyError> {
        let _guard = self.store.write_guard();
        if !self.store.delete_unit(unit_id)? {
            return Err(StudyError::not_found("unit", unit_id));
        }
        tracing::info!(unit_id, "Study unit deleted");
        Ok(())
    }

    /// Linked kanji in the order they appear in the unit's text.
    pub fn kanji_of_unit(&self, unit_id: &str) -> Result<Vec<Kanji>, StudyError> {
        let unit = self.get_unit(unit_id)?;
        let order = extract_kanji(&unit.kanji_text)?;
        let kanji_ids = self.store.linked_ids(&self.store.unit_kanji, unit_id)?;
        let mut kanji = self.store.get_kanji_by_ids(&kanji_ids)?;
        kanji.sort_by_key(|k| {
            k.character
                .chars()
                .next()
                .and_then(|ch| order.iter().position(|o| *o == ch))
                .unwrap_or(usize::MAX)
        });
        Ok(kanji)
    }

    pub fn units_of_kanji(&self, kanji_id: &str) -> Result<Vec<StudyUnit>, StudyError> {
        self.registry.get(kanji_id)?;
        let unit_ids = self.store.linked_ids(&self.store.kanji_units, kanji_id)?;
        Ok(self.store.get_units_by_ids(&unit_ids)?)
    }

    // ---- set <-> kanji links ----

    pub fn link_kanji_to_set(&self, set_id: &str, kanji_id: &str) -> Result<bool, StudyError> {
        let _guard = self.store.write_guard();
        Ok(self.store.link_kanji_to_set(set_id, kanji_id)?)
    }

    pub fn unlink_kanji_from_set(&self, set_id: &str, kanji_id: &str) -> Result<bool, StudyError> {
        let _guard = self.store.write_guard();
        Ok(self.store.unlink_kanji_from_set(set_id, kanji_id)?)
    }

    pub fn kanji_in_set(&self, set_id: &str) -> Result<Vec<Kanji>, StudyError> {
        self.get_set(set_id)?;
        let kanji_ids = self.store.linked_ids(&self.store.set_kanji, set_id)?;
        Ok(self.store.get_kanji_by_ids(&kanji_ids)?)
    }
}
