use std::sync::{Arc, Mutex};

use axum::Router;
use chrono::{DateTime, Utc};
use tempfile::TempDir;
use tokio::sync::broadcast;

use kanji_study_backend::config::{Config, KanjiLookupConfig, ReadingConfig, WorkerConfig};
use kanji_study_backend::routes::build_router;
use kanji_study_backend::services::kanji_lookup::{KanjiInfo, Locale, StaticKanjiLookup};
use kanji_study_backend::services::reading::DictionaryReadingAnalyzer;
use kanji_study_backend::state::{AppState, ReadingCollaborators};
use kanji_study_backend::store::Store;
use kanji_study_backend::study::clock::{Clock, FixedClock, SystemClock};

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<Store>,
    pub config: Config,
    _temp_dir: TempDir,
}

fn test_config(sled_path: String) -> Config {
    // Built directly: set_var would race across parallel tests.
    Config {
        host: std::net::IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
        port: 3000,
        log_level: "info".to_string(),
        enable_file_logs: false,
        log_dir: "./logs".to_string(),
        sled_path,
        cors_origin: "http://localhost:5173".to_string(),
        preferred_locale: Locale::English,
        worker: WorkerConfig {
            is_leader: false,
            enable_schedule_rollover: false,
        },
        reading: ReadingConfig::default(),
        kanji_lookup: KanjiLookupConfig {
            enabled: false,
            mock: true,
            api_url: String::new(),
            api_key: String::new(),
            timeout_secs: 1,
        },
    }
}

fn info(meaning: &str, on: &str, kun: &str) -> KanjiInfo {
    KanjiInfo {
        meaning: meaning.to_string(),
        on_reading: on.to_string(),
        kun_reading: kun.to_string(),
    }
}

/// Knowledge lookup that knows a handful of common kanji.
pub fn test_lookup() -> StaticKanjiLookup {
    StaticKanjiLookup::new()
        .with_entry('日', Locale::English, info("day, sun", "ニチ", "ひ"))
        .with_entry('本', Locale::English, info("book, origin", "ホン", "もと"))
        .with_entry('大', Locale::English, info("large", "ダイ", "おお"))
        .with_entry('丈', Locale::English, info("length", "ジョウ", "たけ"))
        .with_entry('夫', Locale::English, info("husband", "フ", "おっと"))
        .with_entry('火', Locale::English, info("fire", "カ", "ひ"))
}

pub async fn spawn_test_app_with_clock(clock: Arc<dyn Clock>) -> TestApp {
    let temp_dir = tempfile::tempdir().expect("tempdir");
    let sled_path = temp_dir.path().join("kanji-study-test.sled");
    let config = test_config(sled_path.to_string_lossy().to_string());

    let store = Arc::new(Store::open(&config.sled_path).expect("open store"));
    store.run_migrations().expect("run migrations");

    let (shutdown_tx, _) = broadcast::channel::<()>(8);
    let state = AppState::with_collaborators(
        store.clone(),
        Arc::new(test_lookup()),
        clock,
        ReadingCollaborators::learned_only(Arc::new(DictionaryReadingAnalyzer::new())),
        &config,
        shutdown_tx,
    );

    let app = build_router(state.clone());

    TestApp {
        app,
        state,
        store,
        config,
        _temp_dir: temp_dir,
    }
}

pub async fn spawn_test_app() -> TestApp {
    spawn_test_app_with_clock(Arc::new(SystemClock)).await
}

pub async fn spawn_test_app_at(now: DateTime<Utc>) -> TestApp {
    spawn_test_app_with_clock(Arc::new(FixedClock(now))).await
}

/// Clock that moves one second forward on every read.
pub struct SteppingClock {
    next: Mutex<DateTime<Utc>>,
}

impl SteppingClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            next: Mutex::new(start),
        }
    }
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        let mut next = self.next.lock().unwrap();
        let now = *next;
        *next = now + chrono::Duration::seconds(1);
        now
    }
}

/// Clock that stays put until a test moves it.
pub struct SettableClock {
    now: Mutex<DateTime<Utc>>,
}

impl SettableClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for SettableClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
