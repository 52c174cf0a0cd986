use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use vibrato::{Dictionary, Tokenizer};

use crate::store::{Store, StoreError};
use crate::study::annotation::parse_annotated;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadingToken {
    pub surface: String,
    /// `None` when the analyzer has no confident reading.
    pub reading: Option<String>,
}

/// Splits plain text into tokens, each with an optional reading.
///
/// Token surfaces must concatenate back to the input.
#[async_trait]
pub trait ReadingAnalyzer: Send + Sync {
    async fn analyze(&self, text: &str) -> Vec<ReadingToken>;
}

/// Longest-match analyzer over readings learned from annotated text.
#[derive(Debug, Default)]
pub struct DictionaryReadingAnalyzer {
    entries: RwLock<HashMap<String, String>>,
}

impl DictionaryReadingAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the dictionary from every stored unit's annotated text.
    pub fn from_store(store: &Store) -> Result<Self, StoreError> {
        let analyzer = Self::new();
        let mut learned = 0usize;
        for unit in store.list_all_units()? {
            match parse_annotated(&unit.kanji_text) {
                Ok(_) => learned += analyzer.learn_annotated(&unit.kanji_text),
                Err(err) => {
                    tracing::warn!(unit_id = %unit.id, error = %err, "Skipping unparsable unit text");
                }
            }
        }
        tracing::info!(learned, "Reading dictionary seeded");
        Ok(analyzer)
    }

    pub fn learn(&self, surface: &str, reading: &str) {
        if surface.is_empty() || reading.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.insert(surface.to_string(), reading.to_string());
    }

    /// Learn every annotated segment of `text`. Returns the number learned.
    pub fn learn_annotated(&self, text: &str) -> usize {
        let Ok(segments) = parse_annotated(text) else {
            return 0;
        };
        let mut learned = 0;
        for huri in segments.iter().filter(|huri| huri.has_reading()) {
            self.learn(&huri.base, &huri.reading);
            learned += 1;
        }
        learned
    }

    pub fn reading_of(&self, surface: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(surface)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ReadingAnalyzer for DictionaryReadingAnalyzer {
    async fn analyze(&self, text: &str) -> Vec<ReadingToken> {
        let entries = self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let max_len = entries.keys().map(|key| key.chars().count()).max().unwrap_or(0);
        let chars: Vec<char> = text.chars().collect();

        let mut tokens: Vec<ReadingToken> = Vec::new();
        let mut index = 0;
        while index < chars.len() {
            let longest = max_len.min(chars.len() - index);
            let matched = (1..=longest).rev().find_map(|len| {
                let surface: String = chars[index..index + len].iter().collect();
                entries.get(&surface).map(|reading| (surface, reading.clone(), len))
            });

            match matched {
                Some((surface, reading, len)) => {
                    tokens.push(ReadingToken {
                        surface,
                        reading: Some(reading),
                    });
                    index += len;
                }
                None => {
                    match tokens.last_mut() {
                        Some(last) if last.reading.is_none() => last.surface.push(chars[index]),
                        _ => tokens.push(ReadingToken {
                            surface: chars[index].to_string(),
                            reading: None,
                        }),
                    }
                    index += 1;
                }
            }
        }
        tokens
    }
}

/// Feature layout of a compiled MeCab-format dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DictionaryFormat {
    #[default]
    Ipadic,
    Unidic,
}

impl DictionaryFormat {
    /// Index of the surface reading in a token's comma-separated features.
    fn reading_field(self) -> usize {
        match self {
            Self::Ipadic => 7,
            Self::Unidic => 20,
        }
    }

    /// Reading carried by `feature`, if the dictionary knows one.
    pub fn reading_of(self, feature: &str) -> Option<String> {
        feature
            .split(',')
            .nth(self.reading_field())
            .map(str::trim)
            .filter(|reading| !reading.is_empty() && *reading != "*")
            .map(str::to_string)
    }
}

impl FromStr for DictionaryFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ipadic" => Ok(Self::Ipadic),
            "unidic" => Ok(Self::Unidic),
            other => Err(format!("unknown dictionary format: {other}")),
        }
    }
}

impl fmt::Display for DictionaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ipadic => "ipadic",
            Self::Unidic => "unidic",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReadingDictionaryError {
    #[error("cannot open reading dictionary: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid reading dictionary: {0}")]
    Invalid(String),
}

/// Morphological analyzer backed by a vibrato system dictionary.
///
/// Readings learned from stored units override the dictionary's reading for
/// the same surface.
pub struct MorphologicalReadingAnalyzer {
    tokenizer: Tokenizer,
    format: DictionaryFormat,
    learned: Arc<DictionaryReadingAnalyzer>,
}

impl MorphologicalReadingAnalyzer {
    /// Load a compiled dictionary; `.zst` files are decompressed on the fly.
    pub fn open(
        path: &str,
        format: DictionaryFormat,
        learned: Arc<DictionaryReadingAnalyzer>,
    ) -> Result<Self, ReadingDictionaryError> {
        let file = File::open(path)?;
        let dict = if path.ends_with(".zst") {
            Dictionary::read(zstd::Decoder::new(file)?)
        } else {
            Dictionary::read(BufReader::new(file))
        }
        .map_err(|e| ReadingDictionaryError::Invalid(e.to_string()))?;
        tracing::info!(path, %format, "Reading dictionary loaded");
        Ok(Self::from_dictionary(dict, format, learned))
    }

    pub fn from_dictionary(
        dict: Dictionary,
        format: DictionaryFormat,
        learned: Arc<DictionaryReadingAnalyzer>,
    ) -> Self {
        Self {
            tokenizer: Tokenizer::new(dict),
            format,
            learned,
        }
    }

    fn tokenize(&self, text: &str) -> Vec<ReadingToken> {
        let mut worker = self.tokenizer.new_worker();
        worker.reset_sentence(text);
        worker.tokenize();
        worker
            .token_iter()
            .map(|token| {
                let surface = token.surface().to_string();
                let reading = self
                    .learned
                    .reading_of(&surface)
                    .or_else(|| self.format.reading_of(token.feature()));
                ReadingToken { surface, reading }
            })
            .collect()
    }
}

#[async_trait]
impl ReadingAnalyzer for MorphologicalReadingAnalyzer {
    async fn analyze(&self, text: &str) -> Vec<ReadingToken> {
        self.tokenize(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn longest_match_wins() {
        let analyzer = DictionaryReadingAnalyzer::new();
        analyzer.learn("日", "ひ");
        analyzer.learn("日本", "にほん");

        let tokens = analyzer.analyze("日本へ").await;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].surface, "日本");
        assert_eq!(tokens[0].reading.as_deref(), Some("にほん"));
        assert_eq!(tokens[1].surface, "へ");
        assert!(tokens[1].reading.is_none());
    }

    #[tokio::test]
    async fn unknown_runs_are_merged() {
        let analyzer = DictionaryReadingAnalyzer::new();
        let tokens = analyzer.analyze("こんにちは").await;
        assert_eq!(
            tokens,
            vec![ReadingToken {
                surface: "こんにちは".to_string(),
                reading: None
            }]
        );
    }

    #[test]
    fn learns_only_annotated_segments() {
        let analyzer = DictionaryReadingAnalyzer::new();
        assert_eq!(analyzer.learn_annotated("お␟茶⟨ちゃ⟩␟を␟飲⟨の⟩␟む"), 2);
        assert_eq!(analyzer.len(), 2);
        assert_eq!(analyzer.learn_annotated("漢⟨かん"), 0);
    }

    const LEXICON: &str = "\
日本,0,0,100,名詞,固有名詞,地域,国,*,*,日本,ニホン,ニホン
で,0,0,100,助詞,格助詞,一般,*,*,*,で,デ,デ
食べる,0,0,100,動詞,自立,*,*,一段,基本形,食べる,タベル,タベル
";
    const MATRIX: &str = "1 1\n0 0 0\n";
    const CHAR_DEF: &str = "DEFAULT 0 1 0\n";
    const UNK_DEF: &str = "DEFAULT,0,0,10000,*,*,*,*,*,*,*,*,*\n";

    fn tiny_dictionary() -> Dictionary {
        vibrato::SystemDictionaryBuilder::from_readers(
            LEXICON.as_bytes(),
            MATRIX.as_bytes(),
            CHAR_DEF.as_bytes(),
            UNK_DEF.as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn dictionary_readings_cover_fresh_text() {
        let analyzer = MorphologicalReadingAnalyzer::from_dictionary(
            tiny_dictionary(),
            DictionaryFormat::Ipadic,
            Arc::new(DictionaryReadingAnalyzer::new()),
        );
        let tokens = analyzer.analyze("日本で食べる").await;
        let surfaces: Vec<&str> = tokens.iter().map(|t| t.surface.as_str()).collect();
        assert_eq!(surfaces, vec!["日本", "で", "食べる"]);
        assert_eq!(tokens[0].reading.as_deref(), Some("ニホン"));
        assert_eq!(tokens[2].reading.as_deref(), Some("タベル"));
    }

    #[tokio::test]
    async fn learned_reading_overrides_dictionary() {
        let learned = Arc::new(DictionaryReadingAnalyzer::new());
        learned.learn("日本", "にっぽん");
        let analyzer =
            MorphologicalReadingAnalyzer::from_dictionary(tiny_dictionary(), DictionaryFormat::Ipadic, learned);
        let tokens = analyzer.analyze("日本で").await;
        assert_eq!(tokens[0].reading.as_deref(), Some("にっぽん"));
    }

    #[test]
    fn missing_dictionary_file_is_an_error() {
        let result = MorphologicalReadingAnalyzer::open(
            "/nonexistent/system.dic.zst",
            DictionaryFormat::Ipadic,
            Arc::new(DictionaryReadingAnalyzer::new()),
        );
        assert!(matches!(result, Err(ReadingDictionaryError::Io(_))));
    }

    #[test]
    fn feature_reading_skips_placeholders() {
        assert_eq!(
            DictionaryFormat::Ipadic.reading_of("名詞,一般,*,*,*,*,猫,ネコ,ネコ").as_deref(),
            Some("ネコ")
        );
        assert_eq!(DictionaryFormat::Ipadic.reading_of("名詞,一般,*,*,*,*,*,*,*"), None);
        assert_eq!(DictionaryFormat::Unidic.reading_of("名詞,一般"), None);
        assert_eq!("UniDic".parse::<DictionaryFormat>(), Ok(DictionaryFormat::Unidic));
    }
}
