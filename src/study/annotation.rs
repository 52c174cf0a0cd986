//! Furigana-annotated text.
//!
//! Annotated text is a sequence of segments joined by [`SEGMENT_DELIMITER`].
//! A segment is either a plain base, or a base followed by its reading wrapped
//! in [`READING_OPEN`] / [`READING_CLOSE`]:
//!
//! ```text
//! お␟茶⟨ちゃ⟩␟を␟飲⟨の⟩␟む
//! ```
//!
//! [`to_annotated_string`] and [`parse_annotated`] are exact inverses for any
//! sequence produced by the parser.

use serde::{Deserialize, Serialize};
use wana_kana::{ConvertJapanese, IsJapaneseChar};

use crate::services::reading::ReadingAnalyzer;
use crate::study::error::StudyError;
use crate::study::extractor::is_kanji;

pub const SEGMENT_DELIMITER: char = '\u{241F}';
pub const READING_OPEN: char = '\u{27E8}';
pub const READING_CLOSE: char = '\u{27E9}';

fn is_reserved(ch: char) -> bool {
    matches!(ch, SEGMENT_DELIMITER | READING_OPEN | READING_CLOSE)
}

fn contains_kanji(text: &str) -> bool {
    text.chars().any(is_kanji)
}

/// Who produced a segment's reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HuriSource {
    #[default]
    Manual,
    Automatic,
}

/// One annotation segment. `id` is the segment's position in its sequence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Huri {
    pub id: usize,
    pub base: String,
    pub reading: String,
    #[serde(default)]
    pub source: HuriSource,
}

impl Huri {
    /// Segment without a reading.
    pub fn plain(id: usize, base: impl Into<String>) -> Result<Self, StudyError> {
        Self::annotated(id, base, String::new())
    }

    /// Segment with a reading. A base without kanji cannot carry one.
    pub fn annotated(
        id: usize,
        base: impl Into<String>,
        reading: impl Into<String>,
    ) -> Result<Self, StudyError> {
        let base = base.into();
        let reading = reading.into();

        if base.is_empty() {
            return Err(StudyError::malformed(0, "segment base must not be empty"));
        }
        if let Some(position) = base.chars().chain(reading.chars()).position(is_reserved) {
            return Err(StudyError::malformed(position, "reserved marker inside segment"));
        }
        if !reading.is_empty() && !contains_kanji(&base) {
            return Err(StudyError::malformed(
                0,
                format!("reading on kana-only base '{base}'"),
            ));
        }

        Ok(Self {
            id,
            base,
            reading,
            source: HuriSource::Manual,
        })
    }

    pub fn has_reading(&self) -> bool {
        !self.reading.is_empty()
    }

    fn with_source(mut self, source: HuriSource) -> Self {
        self.source = source;
        self
    }
}

/// Parse annotated (or plain) text into segments.
///
/// Text after a closing marker starts a new segment even without a delimiter,
/// and empty segments between consecutive delimiters are dropped.
pub fn parse_annotated(text: &str) -> Result<Vec<Huri>, StudyError> {
    let mut segments = Vec::new();
    let mut base = String::new();
    let mut reading = String::new();
    let mut open_at: Option<usize> = None;

    for (position, ch) in text.chars().enumerate() {
        match (ch, open_at) {
            (SEGMENT_DELIMITER, Some(_)) => {
                return Err(StudyError::malformed(position, "segment delimiter inside reading"));
            }
            (SEGMENT_DELIMITER, None) => {
                if !base.is_empty() {
                    let id = segments.len();
                    segments.push(Huri::plain(id, std::mem::take(&mut base))?);
                }
            }
            (READING_OPEN, Some(_)) => {
                return Err(StudyError::malformed(position, "nested reading marker"));
            }
            (READING_OPEN, None) => {
                if base.is_empty() {
                    return Err(StudyError::malformed(position, "reading marker without base"));
                }
                open_at = Some(position);
            }
            (READING_CLOSE, None) => {
                return Err(StudyError::malformed(position, "closing marker without opening"));
            }
            (READING_CLOSE, Some(opened)) => {
                if reading.is_empty() {
                    return Err(StudyError::malformed(opened, "empty reading"));
                }
                let id = segments.len();
                let huri = Huri::annotated(id, std::mem::take(&mut base), std::mem::take(&mut reading))
                    .map_err(|err| match err {
                        StudyError::MalformedAnnotation { reason, .. } => {
                            StudyError::malformed(opened, reason)
                        }
                        other => other,
                    })?;
                segments.push(huri);
                open_at = None;
            }
            (_, Some(_)) => reading.push(ch),
            (_, None) => base.push(ch),
        }
    }

    if let Some(opened) = open_at {
        return Err(StudyError::malformed(opened, "unterminated reading"));
    }
    if !base.is_empty() {
        let id = segments.len();
        segments.push(Huri::plain(id, base)?);
    }

    Ok(segments)
}

pub fn to_annotated_string(segments: &[Huri]) -> String {
    let mut out = String::new();
    for (index, huri) in segments.iter().enumerate() {
        if index > 0 {
            out.push(SEGMENT_DELIMITER);
        }
        out.push_str(&huri.base);
        if huri.has_reading() {
            out.push(READING_OPEN);
            out.push_str(&huri.reading);
            out.push(READING_CLOSE);
        }
    }
    out
}

/// Bases only, readings and markers dropped. Plain text passes through.
pub fn strip_to_plain_text(text: &str) -> Result<String, StudyError> {
    Ok(parse_annotated(text)?
        .into_iter()
        .map(|huri| huri.base)
        .collect())
}

/// Replace the reading of segment `target_id`.
///
/// An empty `new_reading` cancels the edit and returns the input unchanged.
pub fn replace_reading(
    segments: &[Huri],
    target_id: usize,
    new_reading: &str,
) -> Result<Vec<Huri>, StudyError> {
    let new_reading = new_reading.trim();
    if new_reading.is_empty() {
        return Ok(segments.to_vec());
    }

    let Some(target) = segments.iter().find(|huri| huri.id == target_id) else {
        return Err(StudyError::not_found("huri", &target_id.to_string()));
    };
    let replaced = Huri::annotated(target.id, target.base.clone(), new_reading)?;

    Ok(segments
        .iter()
        .map(|huri| {
            if huri.id == target_id {
                replaced.clone()
            } else {
                huri.clone()
            }
        })
        .collect())
}

/// Best-effort automatic annotation of plain text.
///
/// Tokens the analyzer cannot read are kept as plain segments. Every produced
/// segment is tagged [`HuriSource::Automatic`].
pub async fn auto_annotate(
    plain: &str,
    analyzer: &dyn ReadingAnalyzer,
) -> Result<Vec<Huri>, StudyError> {
    if let Some(position) = plain.chars().position(is_reserved) {
        return Err(StudyError::malformed(position, "reserved marker in plain text"));
    }
    if plain.is_empty() {
        return Ok(Vec::new());
    }

    let tokens = analyzer.analyze(plain).await;
    let covered: String = tokens.iter().map(|token| token.surface.as_str()).collect();
    if covered != plain {
        tracing::warn!(
            text_len = plain.chars().count(),
            "Reading analyzer tokens do not cover input, leaving text unannotated"
        );
        return Ok(vec![Huri::plain(0, plain)?.with_source(HuriSource::Automatic)]);
    }

    let mut pieces: Vec<(String, String)> = Vec::new();
    for token in tokens {
        let split = token
            .reading
            .as_deref()
            .filter(|_| contains_kanji(&token.surface))
            .and_then(|reading| split_okurigana(&token.surface, &reading.to_hiragana()));

        match split {
            Some(split) => {
                push_plain(&mut pieces, split.prefix);
                pieces.push((split.core, split.core_reading));
                push_plain(&mut pieces, split.suffix);
            }
            None => push_plain(&mut pieces, token.surface),
        }
    }

    pieces
        .into_iter()
        .enumerate()
        .map(|(id, (base, reading))| {
            Huri::annotated(id, base, reading).map(|huri| huri.with_source(HuriSource::Automatic))
        })
        .collect()
}

/// [`auto_annotate`] rendered as annotated text.
pub async fn convert_plain_to_annotated(
    plain: &str,
    analyzer: &dyn ReadingAnalyzer,
) -> Result<String, StudyError> {
    Ok(to_annotated_string(&auto_annotate(plain, analyzer).await?))
}

/// Adjacent plain pieces are merged into one segment.
fn push_plain(pieces: &mut Vec<(String, String)>, text: String) {
    if text.is_empty() {
        return;
    }
    match pieces.last_mut() {
        Some((base, reading)) if reading.is_empty() => base.push_str(&text),
        _ => pieces.push((text, String::new())),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct OkuriganaSplit {
    prefix: String,
    core: String,
    core_reading: String,
    suffix: String,
}

/// Peel kana shared by the surface and the reading off both ends, so
/// `食べる` / `たべる` annotates only `食` with `た`.
fn split_okurigana(surface: &str, reading: &str) -> Option<OkuriganaSplit> {
    let surface: Vec<char> = surface.chars().collect();
    let reading: Vec<char> = reading.chars().collect();

    let same_kana = |s: char, r: char| s.is_kana() && s.to_string().as_str().to_hiragana() == r.to_string();

    let mut lead = 0;
    while lead < surface.len() && lead < reading.len() && same_kana(surface[lead], reading[lead]) {
        lead += 1;
    }

    let mut trail = 0;
    while trail < surface.len() - lead
        && trail < reading.len() - lead
        && same_kana(surface[surface.len() - 1 - trail], reading[reading.len() - 1 - trail])
    {
        trail += 1;
    }

    let core: String = surface[lead..surface.len() - trail].iter().collect();
    let core_reading: String = reading[lead..reading.len() - trail].iter().collect();
    if core_reading.is_empty() || !contains_kanji(&core) {
        return None;
    }

    Some(OkuriganaSplit {
        prefix: surface[..lead].iter().collect(),
        core,
        core_reading,
        suffix: surface[surface.len() - trail..].iter().collect(),
    })
}
