use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum StudyError {
    #[error("malformed annotation at char {position}: {reason}")]
    MalformedAnnotation { position: usize, reason: String },
    #[error("not found: entity={entity}, key={key}")]
    NotFound { entity: String, key: String },
    /// A second entity for one kanji character. Signals a registry bug.
    #[error("duplicate kanji entity for character {character}")]
    DuplicateConstraintViolation { character: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("batch rejected, failed ids: {failed:?}")]
    BatchRejected { failed: Vec<String> },
    #[error("storage failure: {0}")]
    StorageFailure(StoreError),
}

impl StudyError {
    pub fn malformed(position: usize, reason: impl Into<String>) -> Self {
        Self::MalformedAnnotation {
            position,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str, key: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }
}

impl From<StoreError> for StudyError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, key } => Self::NotFound { entity, key },
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::Conflict { entity, key } if entity == "kanji" => {
                Self::DuplicateConstraintViolation { character: key }
            }
            other => Self::StorageFailure(other),
        }
    }
}
