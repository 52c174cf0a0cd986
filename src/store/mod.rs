pub mod keys;
pub mod migrate;
pub mod operations;
pub mod trees;

use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use thiserror::Error;

#[derive(Debug)]
pub struct Store {
    db: Db,
    writer: Mutex<()>,
    pub units: sled::Tree,
    pub sets: sled::Tree,
    pub kanji: sled::Tree,
    pub schedule: sled::Tree,
    pub meta: sled::Tree,
    // Link trees, always written in forward/reverse pairs
    pub set_units: sled::Tree,
    pub unit_sets: sled::Tree,
    pub unit_kanji: sled::Tree,
    pub kanji_units: sled::Tree,
    pub set_kanji: sled::Tree,
    pub kanji_sets: sled::Tree,
    // Secondary index trees
    pub kanji_by_character: sled::Tree,
    pub kanji_by_created_at: sled::Tree,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    #[error("conflict: entity={entity}, key={key}")]
    Conflict { entity: String, key: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("migration error at version {version}: {message}")]
    Migration { version: u32, message: String },
}

impl StoreError {
    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl Store {
    pub fn open(sled_path: &str) -> Result<Self, StoreError> {
        let db = sled::open(sled_path)?;
        let units = db.open_tree(trees::UNITS)?;
        let sets = db.open_tree(trees::SETS)?;
        let kanji = db.open_tree(trees::KANJI)?;
        let schedule = db.open_tree(trees::SCHEDULE)?;
        let meta = db.open_tree(trees::META)?;
        let set_units = db.open_tree(trees::SET_UNITS)?;
        let unit_sets = db.open_tree(trees::UNIT_SETS)?;
        let unit_kanji = db.open_tree(trees::UNIT_KANJI)?;
        let kanji_units = db.open_tree(trees::KANJI_UNITS)?;
        let set_kanji = db.open_tree(trees::SET_KANJI)?;
        let kanji_sets = db.open_tree(trees::KANJI_SETS)?;
        let kanji_by_character = db.open_tree(trees::KANJI_BY_CHARACTER)?;
        let kanji_by_created_at = db.open_tree(trees::KANJI_BY_CREATED_AT)?;

        Ok(Self {
            db,
            writer: Mutex::new(()),
            units,
            sets,
            kanji,
            schedule,
            meta,
            set_units,
            unit_sets,
            unit_kanji,
            kanji_units,
            set_kanji,
            kanji_sets,
            kanji_by_character,
            kanji_by_created_at,
        })
    }

    pub fn run_migrations(&self) -> Result<(), StoreError> {
        migrate::run(self)
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    pub fn raw_db(&self) -> &Db {
        &self.db
    }

    /// Single-writer guard for graph and registry mutations.
    ///
    /// Held only around synchronous transactions, never across an `.await`.
    pub fn write_guard(&self) -> MutexGuard<'_, ()> {
        // The guarded value is `()`, so a poisoned lock carries no broken state.
        self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
        Ok(serde_json::to_vec(value)?)
    }

    pub(crate) fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Abort the enclosing sled transaction with a store error.
pub(crate) fn abort(error: StoreError) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(error)
}

/// Deserialize inside a transaction closure, aborting on malformed bytes.
pub(crate) fn tx_deserialize<T: DeserializeOwned>(
    bytes: &[u8],
) -> Result<T, ConflictableTransactionError<StoreError>> {
    serde_json::from_slice(bytes).map_err(|error| abort(StoreError::Serialization(error)))
}

pub(crate) fn tx_serialize<T: Serialize>(
    value: &T,
) -> Result<Vec<u8>, ConflictableTransactionError<StoreError>> {
    serde_json::to_vec(value).map_err(|error| abort(StoreError::Serialization(error)))
}

pub(crate) fn map_tx_error(error: TransactionError<StoreError>) -> StoreError {
    match error {
        TransactionError::Abort(store_error) => store_error,
        TransactionError::Storage(storage_error) => StoreError::Sled(storage_error),
    }
}
