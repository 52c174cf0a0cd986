use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionalTree};
use sled::Transactional;

use crate::store::keys;
use crate::store::operations::links::tx_unlink;
use crate::store::{abort, map_tx_error, tx_deserialize, tx_serialize, Store, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Kanji {
    pub id: String,
    pub character: String,
    pub meaning: String,
    pub on_reading: String,
    pub kun_reading: String,
    pub created_at: DateTime<Utc>,
    /// Number of linked units. Recomputed from the link table on every read.
    #[serde(default)]
    pub usage_count: u64,
}

/// Resolve a kanji by character inside a transaction, inserting `candidate`
/// when the character is not yet registered.
///
/// Returns the id of the entity the character maps to and whether it was created.
pub(crate) fn tx_resolve_or_create_kanji(
    tx_kanji: &TransactionalTree,
    tx_by_character: &TransactionalTree,
    tx_by_created_at: &TransactionalTree,
    candidate: &Kanji,
) -> Result<(String, bool), ConflictableTransactionError<StoreError>> {
    let char_key = keys::kanji_character_key(&candidate.character);

    if let Some(raw_id) = tx_by_character.get(char_key.as_bytes())? {
        let id = String::from_utf8(raw_id.to_vec()).map_err(|_| {
            abort(StoreError::Validation(
                "invalid UTF-8 in kanji character index".to_string(),
            ))
        })?;
        let entity_key = keys::kanji_key(&id).map_err(abort)?;
        if tx_kanji.get(entity_key.as_bytes())?.is_none() {
            // Index points at nothing: the catalog and its index disagree.
            return Err(abort(StoreError::Conflict {
                entity: "kanji".to_string(),
                key: candidate.character.clone(),
            }));
        }
        return Ok((id, false));
    }

    let entity_key = keys::kanji_key(&candidate.id).map_err(abort)?;
    let created_key = keys::kanji_created_at_key(
        candidate.created_at.timestamp_millis(),
        &candidate.id,
    )
    .map_err(abort)?;
    let stored = Kanji {
        usage_count: 0,
        ..candidate.clone()
    };

    tx_kanji.insert(entity_key.as_bytes(), tx_serialize(&stored)?)?;
    tx_by_character.insert(char_key.as_bytes(), candidate.id.as_bytes())?;
    tx_by_created_at.insert(created_key.as_bytes(), candidate.id.as_bytes())?;

    Ok((candidate.id.clone(), true))
}

impl Store {
    fn with_usage(&self, mut kanji: Kanji) -> Result<Kanji, StoreError> {
        kanji.usage_count = self.count_links(&self.kanji_units, &kanji.id)?;
        Ok(kanji)
    }

    pub fn get_kanji(&self, kanji_id: &str) -> Result<Option<Kanji>, StoreError> {
        let key = keys::kanji_key(kanji_id)?;
        match self.kanji.get(key.as_bytes())? {
            Some(raw) => Ok(Some(self.with_usage(Self::deserialize(&raw)?)?)),
            None => Ok(None),
        }
    }

    pub fn get_kanji_by_character(&self, character: &str) -> Result<Option<Kanji>, StoreError> {
        let char_key = keys::kanji_character_key(character);
        let Some(raw_id) = self.kanji_by_character.get(char_key.as_bytes())? else {
            return Ok(None);
        };
        let kanji_id = match String::from_utf8(raw_id.to_vec()) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid UTF-8 in kanji character index");
                return Ok(None);
            }
        };
        match self.get_kanji(&kanji_id)? {
            Some(kanji) if kanji.character == character => Ok(Some(kanji)),
            _ => Err(StoreError::Conflict {
                entity: "kanji".to_string(),
                key: character.to_string(),
            }),
        }
    }

    /// Insert `candidate` unless its character is already registered, in which
    /// case the existing entity is returned untouched.
    pub fn create_kanji_if_absent(&self, candidate: &Kanji) -> Result<Kanji, StoreError> {
        let (kanji_id, created) = (&self.kanji, &self.kanji_by_character, &self.kanji_by_created_at)
            .transaction(|(tx_kanji, tx_by_character, tx_by_created_at)| {
                tx_resolve_or_create_kanji(tx_kanji, tx_by_character, tx_by_created_at, candidate)
            })
            .map_err(map_tx_error)?;

        if created {
            tracing::debug!(kanji_id = %kanji_id, character = %candidate.character, "Kanji created");
        }

        self.get_kanji(&kanji_id)?
            .ok_or_else(|| StoreError::not_found("kanji", &kanji_id))
    }

    /// Overwrite metadata of an existing kanji. The character is immutable.
    pub fn update_kanji(&self, kanji: &Kanji) -> Result<(), StoreError> {
        let key = keys::kanji_key(&kanji.id)?;
        (&self.kanji)
            .transaction(|tx_kanji| {
                let Some(raw) = tx_kanji.get(key.as_bytes())? else {
                    return Err(abort(StoreError::not_found("kanji", &kanji.id)));
                };
                let existing: Kanji = tx_deserialize(&raw)?;
                if existing.character != kanji.character {
                    return Err(abort(StoreError::Validation(
                        "kanji character cannot be changed".to_string(),
                    )));
                }
                let stored = Kanji {
                    usage_count: 0,
                    created_at: existing.created_at,
                    ..kanji.clone()
                };
                tx_kanji.insert(key.as_bytes(), tx_serialize(&stored)?)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    /// Delete a kanji together with its indexes and every link touching it.
    /// Returns `false` when the id is unknown.
    pub fn delete_kanji(&self, kanji_id: &str) -> Result<bool, StoreError> {
        let Some(kanji) = self.get_kanji(kanji_id)? else {
            return Ok(false);
        };
        let unit_ids = self.linked_ids(&self.kanji_units, kanji_id)?;
        let set_ids = self.linked_ids(&self.kanji_sets, kanji_id)?;
        let entity_key = keys::kanji_key(kanji_id)?;
        let char_key = keys::kanji_character_key(&kanji.character);
        let created_key =
            keys::kanji_created_at_key(kanji.created_at.timestamp_millis(), kanji_id)?;

        (
            &self.kanji,
            &self.kanji_by_character,
            &self.kanji_by_created_at,
            &self.unit_kanji,
            &self.kanji_units,
            &self.set_kanji,
            &self.kanji_sets,
        )
            .transaction(
                |(tx_kanji, tx_by_char, tx_by_created, tx_uk, tx_ku, tx_sk, tx_ks)| {
                    tx_kanji.remove(entity_key.as_bytes())?;
                    tx_by_char.remove(char_key.as_bytes())?;
                    tx_by_created.remove(created_key.as_bytes())?;
                    for unit_id in &unit_ids {
                        tx_unlink(tx_uk, tx_ku, unit_id, kanji_id)?;
                    }
                    for set_id in &set_ids {
                        tx_unlink(tx_sk, tx_ks, set_id, kanji_id)?;
                    }
                    Ok(())
                },
            )
            .map_err(map_tx_error)?;

        Ok(true)
    }

    pub fn get_kanji_by_ids(&self, kanji_ids: &[String]) -> Result<Vec<Kanji>, StoreError> {
        let mut out = Vec::with_capacity(kanji_ids.len());
        for kanji_id in kanji_ids {
            if let Some(kanji) = self.get_kanji(kanji_id)? {
                out.push(kanji);
            }
        }
        Ok(out)
    }

    /// Up to `limit` kanji strictly older than `before`, newest first.
    ///
    /// Walks the reverse-timestamp index, so there is no stable cursor: an
    /// insert between two calls can shift the page boundary.
    pub fn list_kanji_before(
        &self,
        before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Kanji>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let start = match before {
            Some(ts) => keys::kanji_created_at_start(ts.timestamp_millis()),
            None => String::new(),
        };

        let mut out = Vec::with_capacity(limit);
        for item in self.kanji_by_created_at.range(start.as_bytes()..) {
            let (key, _) = item?;
            let Some((_, kanji_id)) = keys::parse_created_at_item_key(&key) else {
                continue;
            };
            let Some(kanji) = self.get_kanji(&kanji_id)? else {
                continue;
            };
            if let Some(cutoff) = before {
                // Index keys have millisecond resolution; compare exact timestamps.
                if kanji.created_at >= cutoff {
                    continue;
                }
            }
            out.push(kanji);
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Case-insensitive substring match against character or meaning.
    pub fn search_kanji(&self, query: &str) -> Result<Vec<Kanji>, StoreError> {
        let query_lower = query.to_lowercase();
        let mut matching = Vec::new();
        for item in self.kanji.iter() {
            let (_, v) = item?;
            let kanji: Kanji = Self::deserialize(&v)?;
            if kanji.character.to_lowercase().contains(&query_lower)
                || kanji.meaning.to_lowercase().contains(&query_lower)
            {
                matching.push(self.with_usage(kanji)?);
            }
        }
        Ok(matching)
    }

    pub fn count_kanji(&self) -> u64 {
        self.kanji.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tempfile::tempdir;

    use super::*;

    fn sample_kanji(id: &str, character: &str, created_at: DateTime<Utc>) -> Kanji {
        Kanji {
            id: id.to_string(),
            character: character.to_string(),
            meaning: format!("meaning of {character}"),
            on_reading: String::new(),
            kun_reading: String::new(),
            created_at,
            usage_count: 0,
        }
    }

    #[test]
    fn create_if_absent_returns_first_entity() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("kanji-db").to_str().unwrap()).unwrap();
        let now = Utc::now();

        let first = store.create_kanji_if_absent(&sample_kanji("k1", "火", now)).unwrap();
        let mut second_candidate = sample_kanji("k2", "火", now);
        second_candidate.meaning = "overwritten".to_string();
        let second = store.create_kanji_if_absent(&second_candidate).unwrap();

        assert_eq!(first.id, "k1");
        assert_eq!(second.id, "k1");
        assert_eq!(second.meaning, "meaning of 火");
        assert_eq!(store.count_kanji(), 1);
    }

    #[test]
    fn list_before_is_strict_and_newest_first() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("kanji-db-page").to_str().unwrap()).unwrap();
        let base = Utc::now();

        for (idx, ch) in ["一", "二", "三", "四"].iter().enumerate() {
            let created = base + Duration::seconds(idx as i64);
            store
                .create_kanji_if_absent(&sample_kanji(&format!("k{idx}"), ch, created))
                .unwrap();
        }

        let first_page = store.list_kanji_before(None, 2).unwrap();
        let chars: Vec<&str> = first_page.iter().map(|k| k.character.as_str()).collect();
        assert_eq!(chars, vec!["四", "三"]);

        let second_page = store
            .list_kanji_before(Some(first_page[1].created_at), 2)
            .unwrap();
        let chars: Vec<&str> = second_page.iter().map(|k| k.character.as_str()).collect();
        assert_eq!(chars, vec!["二", "一"]);

        let empty = store
            .list_kanji_before(Some(second_page[1].created_at), 2)
            .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn delete_removes_indexes() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("kanji-db-del").to_str().unwrap()).unwrap();

        store
            .create_kanji_if_absent(&sample_kanji("k1", "水", Utc::now()))
            .unwrap();
        assert!(store.delete_kanji("k1").unwrap());
        assert!(!store.delete_kanji("k1").unwrap());
        assert!(store.get_kanji_by_character("水").unwrap().is_none());
        assert!(store.list_kanji_before(None, 10).unwrap().is_empty());
    }

    #[test]
    fn update_keeps_character_and_creation_time() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("kanji-db-upd").to_str().unwrap()).unwrap();
        let created = store
            .create_kanji_if_absent(&sample_kanji("k1", "木", Utc::now()))
            .unwrap();

        let mut edited = created.clone();
        edited.meaning = "tree".to_string();
        edited.created_at = Utc::now() + Duration::days(3);
        store.update_kanji(&edited).unwrap();

        let reloaded = store.get_kanji("k1").unwrap().unwrap();
        assert_eq!(reloaded.meaning, "tree");
        assert_eq!(reloaded.created_at, created.created_at);

        edited.character = "林".to_string();
        assert!(matches!(
            store.update_kanji(&edited),
            Err(StoreError::Validation(_))
        ));
    }
}
