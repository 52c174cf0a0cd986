use std::collections::HashSet;

use serde::Serialize;

use crate::study::annotation::strip_to_plain_text;
use crate::study::error::StudyError;

/// CJK unified ideographs, extension A, compatibility ideographs and
/// extension B. The iteration mark `々` is not a kanji.
pub fn is_kanji(ch: char) -> bool {
    matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0xF900..=0xFAFF | 0x20000..=0x2A6DF
    )
}

/// Distinct kanji of `text` in first-occurrence order.
///
/// Annotated input is stripped first, so readings never contribute.
pub fn extract_kanji(text: &str) -> Result<Vec<char>, StudyError> {
    let plain = strip_to_plain_text(text)?;
    let mut seen = HashSet::new();
    Ok(plain
        .chars()
        .filter(|ch| is_kanji(*ch) && seen.insert(*ch))
        .collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiDiff {
    pub added: Vec<char>,
    pub removed: Vec<char>,
    pub kept: Vec<char>,
}

impl KanjiDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Set difference by character; each list keeps the order of its source.
pub fn kanji_diff(previous: &[char], now: &[char]) -> KanjiDiff {
    let previous_set: HashSet<char> = previous.iter().copied().collect();
    let now_set: HashSet<char> = now.iter().copied().collect();

    KanjiDiff {
        added: now.iter().copied().filter(|ch| !previous_set.contains(ch)).collect(),
        removed: previous.iter().copied().filter(|ch| !now_set.contains(ch)).collect(),
        kept: now.iter().copied().filter(|ch| previous_set.contains(ch)).collect(),
    }
}
