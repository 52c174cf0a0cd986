use crate::store::keys;
use crate::store::operations::kanji::Kanji;
use crate::store::{Store, StoreError};

const VERSION_KEY: &str = "_meta:version";

type MigrationFn = fn(&Store) -> Result<(), StoreError>;

fn migrations() -> Vec<(&'static str, MigrationFn)> {
    vec![
        ("001_initial", m001_initial),
        ("002_kanji_created_at_index", m002_kanji_created_at_index),
    ]
}

/// Apply every migration newer than the stored version.
///
/// Each migration must be idempotent: the version is persisted only after the
/// migration returns, so a crash in between reruns it on the next start.
/// Versions only move forward.
pub fn run(store: &Store) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    let all = migrations();

    for (index, (name, func)) in all.iter().enumerate() {
        let version = (index + 1) as u32;
        if version > current {
            tracing::info!(version, name, "Running migration");
            func(store)?;
            set_version(store, version)?;
            tracing::info!(version, name, "Migration complete");
        } else {
            tracing::debug!(version, name, "Migration already applied, skipping");
        }
    }

    Ok(())
}

pub fn get_current_version(store: &Store) -> Result<u32, StoreError> {
    match store.meta.get(VERSION_KEY.as_bytes())? {
        Some(raw) => {
            let bytes: [u8; 4] = raw.as_ref().try_into().map_err(|_| StoreError::Migration {
                version: 0,
                message: format!("stored version has {} bytes, expected 4", raw.len()),
            })?;
            Ok(u32::from_be_bytes(bytes))
        }
        None => Ok(0),
    }
}

pub fn set_version(store: &Store, version: u32) -> Result<(), StoreError> {
    let current = get_current_version(store)?;
    if version < current {
        return Err(StoreError::Migration {
            version,
            message: format!("Refuse to downgrade from {} to {}", current, version),
        });
    }

    store.meta.insert(VERSION_KEY.as_bytes(), &version.to_be_bytes())?;
    Ok(())
}

fn m001_initial(_store: &Store) -> Result<(), StoreError> {
    Ok(())
}

/// Rebuild the creation-time index and the character index from the catalog.
fn m002_kanji_created_at_index(store: &Store) -> Result<(), StoreError> {
    let mut rebuilt = 0usize;
    for item in store.kanji.iter() {
        let (_, value) = item?;
        let kanji: Kanji = Store::deserialize(&value)?;

        let created_key =
            keys::kanji_created_at_key(kanji.created_at.timestamp_millis(), &kanji.id)?;
        store
            .kanji_by_created_at
            .insert(created_key.as_bytes(), kanji.id.as_bytes())?;

        let char_key = keys::kanji_character_key(&kanji.character);
        if !store.kanji_by_character.contains_key(char_key.as_bytes())? {
            store
                .kanji_by_character
                .insert(char_key.as_bytes(), kanji.id.as_bytes())?;
        }
        rebuilt += 1;
    }

    tracing::debug!(rebuilt, "Kanji indexes rebuilt");
    Ok(())
}
