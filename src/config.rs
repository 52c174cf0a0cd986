use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use std::fmt;

use crate::services::kanji_lookup::Locale;
use crate::services::reading::DictionaryFormat;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub enable_file_logs: bool,
    pub log_dir: String,
    pub sled_path: String,
    pub cors_origin: String,
    pub preferred_locale: Locale,
    pub worker: WorkerConfig,
    pub kanji_lookup: KanjiLookupConfig,
    pub reading: ReadingConfig,
}

/// Morphological reading analysis. Without a dictionary path only readings
/// learned from stored units are available.
#[derive(Debug, Clone, Default)]
pub struct ReadingConfig {
    pub dictionary_path: Option<String>,
    pub dictionary_format: DictionaryFormat,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub is_leader: bool,
    pub enable_schedule_rollover: bool,
}

#[derive(Clone)]
pub struct KanjiLookupConfig {
    pub enabled: bool,
    pub mock: bool,
    pub api_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for KanjiLookupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KanjiLookupConfig")
            .field("enabled", &self.enabled)
            .field("mock", &self.mock)
            .field("api_url", &self.api_url)
            .field("api_key", &"***REDACTED***")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or_parse("HOST", IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))),
            port: env_or_parse("PORT", 3000_u16),
            log_level: env_or("RUST_LOG", "info"),
            enable_file_logs: env_or_bool("ENABLE_FILE_LOGS", false),
            log_dir: env_or("LOG_DIR", "./logs"),
            sled_path: env_or("SLED_PATH", "./data/study.sled"),
            cors_origin: env_or("CORS_ORIGIN", "http://localhost:5173"),
            preferred_locale: env_or_parse("PREFERRED_LOCALE", Locale::English),
            worker: WorkerConfig {
                is_leader: env_or_bool("WORKER_LEADER", true),
                enable_schedule_rollover: env_or_bool("ENABLE_SCHEDULE_ROLLOVER", true),
            },
            kanji_lookup: KanjiLookupConfig {
                enabled: env_or_bool("KANJI_LOOKUP_ENABLED", false),
                mock: env_or_bool("KANJI_LOOKUP_MOCK", true),
                api_url: env_or("KANJI_LOOKUP_URL", "https://kanjiapi.dev/v1/kanji"),
                api_key: env_or("KANJI_LOOKUP_API_KEY", ""),
                timeout_secs: env_or_parse("KANJI_LOOKUP_TIMEOUT_SECS", 5_u64),
            },
            reading: ReadingConfig {
                dictionary_path: env::var("READING_DICT_PATH")
                    .ok()
                    .filter(|path| !path.trim().is_empty()),
                dictionary_format: env_or_parse("READING_DICT_FORMAT", DictionaryFormat::Ipadic),
            },
        }
    }
}

pub fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_or_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy,
{
    match env::var(key) {
        Ok(raw) => match raw.parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(
                    key,
                    value = %raw,
                    "Failed to parse env var, using default"
                );
                default
            }
        },
        Err(_) => default,
    }
}

pub fn env_or_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
