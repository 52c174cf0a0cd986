use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::KanjiLookupConfig;

/// Language of the meanings returned by a lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    English,
    Korean,
}

impl Locale {
    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Korean => "ko",
        }
    }
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::English),
            "ko" | "korean" => Ok(Self::Korean),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KanjiInfo {
    pub meaning: String,
    pub on_reading: String,
    pub kun_reading: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("kanji lookup is disabled")]
    Disabled,
    #[error("kanji lookup timed out")]
    Timeout,
    #[error("kanji lookup network error: {0}")]
    Network(String),
    #[error("kanji lookup api error: status={status}, message={message}")]
    ApiError { status: u16, message: String },
    #[error("invalid kanji lookup configuration: {0}")]
    Config(String),
}

/// Meaning and readings for a single kanji.
///
/// `Ok(None)` means the source does not know the character.
#[async_trait]
pub trait KnowledgeLookup: Send + Sync {
    async fn lookup(&self, character: char, locale: Locale) -> Result<Option<KanjiInfo>, LookupError>;
}

#[derive(Debug, Deserialize)]
struct KanjiApiResponse {
    #[serde(default)]
    meanings: Vec<String>,
    #[serde(default)]
    on_readings: Vec<String>,
    #[serde(default)]
    kun_readings: Vec<String>,
}

impl From<KanjiApiResponse> for KanjiInfo {
    fn from(raw: KanjiApiResponse) -> Self {
        Self {
            meaning: raw.meanings.join(", "),
            on_reading: raw.on_readings.join("、"),
            kun_reading: raw.kun_readings.join("、"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpKanjiLookup {
    config: KanjiLookupConfig,
    client: reqwest::Client,
}

impl HttpKanjiLookup {
    pub fn new(config: &KanjiLookupConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config: config.clone(),
            client,
        }
    }

    /// Reject a live configuration without an endpoint.
    pub fn validate_config(config: &KanjiLookupConfig) -> Result<(), LookupError> {
        if config.enabled && !config.mock && config.api_url.trim().is_empty() {
            return Err(LookupError::Config(
                "KANJI_LOOKUP_URL is required when KANJI_LOOKUP_ENABLED=true and KANJI_LOOKUP_MOCK=false"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl KnowledgeLookup for HttpKanjiLookup {
    async fn lookup(&self, character: char, locale: Locale) -> Result<Option<KanjiInfo>, LookupError> {
        if !self.config.enabled {
            return Err(LookupError::Disabled);
        }
        if self.config.mock {
            return Ok(Some(KanjiInfo {
                meaning: format!("mock meaning of {character}"),
                on_reading: String::new(),
                kun_reading: String::new(),
            }));
        }

        let url = format!("{}/{}", self.config.api_url.trim_end_matches('/'), character);
        let mut request = self.client.get(&url).query(&[("lang", locale.code())]);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                LookupError::Timeout
            } else {
                LookupError::Network(err.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LookupError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: KanjiApiResponse = response
            .json()
            .await
            .map_err(|err| LookupError::Network(err.to_string()))?;
        Ok(Some(body.into()))
    }
}

/// In-memory lookup table, keyed by character and locale.
#[derive(Debug, Clone, Default)]
pub struct StaticKanjiLookup {
    entries: HashMap<(char, Locale), KanjiInfo>,
}

impl StaticKanjiLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(mut self, character: char, locale: Locale, info: KanjiInfo) -> Self {
        self.entries.insert((character, locale), info);
        self
    }
}

#[async_trait]
impl KnowledgeLookup for StaticKanjiLookup {
    async fn lookup(&self, character: char, locale: Locale) -> Result<Option<KanjiInfo>, LookupError> {
        Ok(self.entries.get(&(character, locale)).cloned())
    }
}
