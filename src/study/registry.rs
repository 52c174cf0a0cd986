use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use crate::services::kanji_lookup::{KanjiInfo, KnowledgeLookup, Locale, LookupError};
use crate::store::operations::kanji::Kanji;
use crate::store::Store;
use crate::study::clock::Clock;
use crate::study::error::StudyError;
use crate::study::extractor::is_kanji;

/// De-duplicated kanji catalog: one entity per character, first write wins.
pub struct KanjiRegistry {
    store: Arc<Store>,
    lookup: Arc<dyn KnowledgeLookup>,
    clock: Arc<dyn Clock>,
    locale: Locale,
    lookup_timeout: Duration,
}

impl KanjiRegistry {
    pub fn new(
        store: Arc<Store>,
        lookup: Arc<dyn KnowledgeLookup>,
        clock: Arc<dyn Clock>,
        locale: Locale,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lookup,
            clock,
            locale,
            lookup_timeout,
        }
    }

    /// Exactly one kanji glyph, surrounding whitespace ignored.
    pub fn parse_character(raw: &str) -> Result<char, StudyError> {
        let mut chars = raw.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if is_kanji(ch) => Ok(ch),
            _ => Err(StudyError::Validation(format!(
                "'{raw}' is not a single kanji character"
            ))),
        }
    }

    /// Return the entity for `character`, creating it on first sight.
    ///
    /// Existing metadata is never overwritten; corrections go through
    /// [`KanjiRegistry::update_metadata`].
    pub async fn upsert(&self, character: char) -> Result<Kanji, StudyError> {
        if !is_kanji(character) {
            return Err(StudyError::Validation(format!(
                "'{character}' is not a kanji character"
            )));
        }
        if let Some(existing) = self.store.get_kanji_by_character(&character.to_string())? {
            return Ok(existing);
        }

        let candidate = self.new_candidate(character).await;
        let kanji = {
            let _guard = self.store.write_guard();
            self.store.create_kanji_if_absent(&candidate)?
        };

        if kanji.id == candidate.id {
            tracing::info!(kanji_id = %kanji.id, character = %kanji.character, "Kanji registered");
        }
        Ok(kanji)
    }

    /// One candidate per character, ready for a resolve-or-create transaction.
    ///
    /// Characters already in the catalog get their stored entity; the rest are
    /// looked up concurrently.
    pub async fn prepare_candidates(&self, characters: &[char]) -> Result<Vec<Kanji>, StudyError> {
        let mut existing = Vec::with_capacity(characters.len());
        for ch in characters {
            existing.push(self.store.get_kanji_by_character(&ch.to_string())?);
        }

        let fresh = join_all(
            characters
                .iter()
                .zip(&existing)
                .filter(|(_, found)| found.is_none())
                .map(|(ch, _)| self.new_candidate(*ch)),
        )
        .await;

        let mut fresh = fresh.into_iter();
        Ok(existing
            .into_iter()
            .filter_map(|found| found.or_else(|| fresh.next()))
            .collect())
    }

    async fn new_candidate(&self, character: char) -> Kanji {
        let info = self.fetch_info(character).await;
        Kanji {
            id: Uuid::new_v4().to_string(),
            character: character.to_string(),
            meaning: info.meaning,
            on_reading: info.on_reading,
            kun_reading: info.kun_reading,
            created_at: self.clock.now(),
            usage_count: 0,
        }
    }

    /// Lookup failures degrade to blank metadata.
    async fn fetch_info(&self, character: char) -> KanjiInfo {
        let result = tokio::time::timeout(
            self.lookup_timeout,
            self.lookup.lookup(character, self.locale),
        )
        .await;

        match result {
            Ok(Ok(Some(info))) => info,
            Ok(Ok(None)) => {
                tracing::debug!(%character, "Kanji unknown to lookup, using blank metadata");
                KanjiInfo::default()
            }
            Ok(Err(LookupError::Disabled)) => KanjiInfo::default(),
            Ok(Err(err)) => {
                tracing::warn!(%character, error = %err, "Kanji lookup failed, using blank metadata");
                KanjiInfo::default()
            }
            Err(_) => {
                tracing::warn!(
                    %character,
                    timeout_ms = self.lookup_timeout.as_millis() as u64,
                    "Kanji lookup timed out, using blank metadata"
                );
                KanjiInfo::default()
            }
        }
    }

    /// Substring match on character or meaning. Exact character hits come
    /// first, then newest first. An empty query matches nothing.
    pub fn search(&self, query: &str) -> Result<Vec<Kanji>, StudyError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.store.search_kanji(query)?;
        hits.sort_by(|a, b| {
            let a_exact = a.character == query;
            let b_exact = b.character == query;
            b_exact
                .cmp(&a_exact)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(hits)
    }

    /// Up to `page_size` entities created strictly before `after`, newest first.
    ///
    /// There is no cursor: an insert between two pages can repeat or skip a
    /// row at the boundary.
    pub fn paginate(&self, after: Option<&Kanji>, page_size: usize) -> Result<Vec<Kanji>, StudyError> {
        Ok(self
            .store
            .list_kanji_before(after.map(|kanji| kanji.created_at), page_size)?)
    }

    pub fn get(&self, kanji_id: &str) -> Result<Kanji, StudyError> {
        self.store
            .get_kanji(kanji_id)?
            .ok_or_else(|| StudyError::not_found("kanji", kanji_id))
    }

    pub fn update_metadata(
        &self,
        kanji_id: &str,
        meaning: &str,
        on_reading: &str,
        kun_reading: &str,
    ) -> Result<Kanji, StudyError> {
        let _guard = self.store.write_guard();
        let mut kanji = self.get(kanji_id)?;
        kanji.meaning = meaning.trim().to_string();
        kanji.on_reading = on_reading.trim().to_string();
        kanji.kun_reading = kun_reading.trim().to_string();
        self.store.update_kanji(&kanji)?;

        tracing::info!(kanji_id = %kanji_id, "Kanji metadata updated");
        self.get(kanji_id)
    }

    /// Explicit destruction. Removes every link to the kanji.
    pub fn delete(&self, kanji_id: &str) -> Result<(), StudyError> {
        let _guard = self.store.write_guard();
        if !self.store.delete_kanji(kanji_id)? {
            return Err(StudyError::not_found("kanji", kanji_id));
        }
        tracing::info!(kanji_id = %kanji_id, "Kanji deleted");
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.store.count_kanji()
    }
}
