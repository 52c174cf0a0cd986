//! Annotation parsing, kanji extraction, the kanji registry, the
//! set/unit/kanji relationship graph and the study scheduler.

pub mod annotation;
pub mod clock;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod registry;
pub mod scheduler;

pub use error::StudyError;
