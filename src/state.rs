use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

use crate::config::Config;
use crate::services::kanji_lookup::{HttpKanjiLookup, KnowledgeLookup};
use crate::services::reading::{DictionaryReadingAnalyzer, ReadingAnalyzer};
use crate::store::Store;
use crate::study::clock::{Clock, SystemClock};
use crate::study::graph::RelationshipGraph;
use crate::study::registry::KanjiRegistry;
use crate::study::scheduler::Scheduler;

/// The learned reading dictionary and the analyzer that consults it.
#[derive(Clone)]
pub struct ReadingCollaborators {
    pub learned: Arc<DictionaryReadingAnalyzer>,
    pub analyzer: Arc<dyn ReadingAnalyzer>,
}

impl ReadingCollaborators {
    /// Learned readings only, no system dictionary.
    pub fn learned_only(learned: Arc<DictionaryReadingAnalyzer>) -> Self {
        Self {
            analyzer: learned.clone(),
            learned,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    store: Arc<Store>,
    registry: Arc<KanjiRegistry>,
    graph: Arc<RelationshipGraph>,
    scheduler: Arc<Scheduler>,
    learned_readings: Arc<DictionaryReadingAnalyzer>,
    analyzer: Arc<dyn ReadingAnalyzer>,
    config: Arc<Config>,
    shutdown_tx: broadcast::Sender<()>,
    started_at: Instant,
}

impl AppState {
    /// Production wiring: HTTP kanji lookup and the system clock.
    pub fn new(
        store: Arc<Store>,
        readings: ReadingCollaborators,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let lookup: Arc<dyn KnowledgeLookup> = Arc::new(HttpKanjiLookup::new(&config.kanji_lookup));
        Self::with_collaborators(store, lookup, Arc::new(SystemClock), readings, config, shutdown_tx)
    }

    pub fn with_collaborators(
        store: Arc<Store>,
        lookup: Arc<dyn KnowledgeLookup>,
        clock: Arc<dyn Clock>,
        readings: ReadingCollaborators,
        config: &Config,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        let registry = Arc::new(KanjiRegistry::new(
            store.clone(),
            lookup,
            clock.clone(),
            config.preferred_locale,
            Duration::from_secs(config.kanji_lookup.timeout_secs),
        ));
        let graph = Arc::new(RelationshipGraph::new(store.clone(), registry.clone(), clock.clone()));
        let scheduler = Arc::new(Scheduler::new(store.clone(), clock));

        Self {
            store,
            registry,
            graph,
            scheduler,
            learned_readings: readings.learned,
            analyzer: readings.analyzer,
            config: Arc::new(config.clone()),
            shutdown_tx,
            started_at: Instant::now(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &KanjiRegistry {
        &self.registry
    }

    pub fn graph(&self) -> &RelationshipGraph {
        &self.graph
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn analyzer(&self) -> &dyn ReadingAnalyzer {
        self.analyzer.as_ref()
    }

    /// Readings learned from saved units; shared with the analyzer.
    pub fn learned_readings(&self) -> &DictionaryReadingAnalyzer {
        &self.learned_readings
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn shutdown_rx(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown_tx(&self) -> &broadcast::Sender<()> {
        &self.shutdown_tx
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::config::Config;
    use crate::store::Store;

    use super::*;

    fn state_in(dir: &tempfile::TempDir, tx: broadcast::Sender<()>) -> AppState {
        let cfg = Config::from_env();
        let store = Arc::new(Store::open(dir.path().join("state.sled").to_str().unwrap()).unwrap());
        let readings = ReadingCollaborators::learned_only(Arc::new(DictionaryReadingAnalyzer::new()));
        AppState::new(store, readings, &cfg, tx)
    }

    #[tokio::test]
    async fn components_share_one_store() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = state_in(&tmp, tx);

        let set = state
            .graph()
            .create_set(crate::study::graph::NewSet {
                title: "N5".to_string(),
                kind: Default::default(),
                auto_schedule: true,
                preferred_front_type: Default::default(),
            })
            .unwrap();
        let stored = state.store().get_set(&set.id).unwrap();
        assert_eq!(stored.map(|s| s.title), Some("N5".to_string()));
    }

    #[tokio::test]
    async fn shutdown_receiver_can_clone() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let (tx, _) = broadcast::channel(4);
        let state = state_in(&tmp, tx.clone());

        let mut rx1 = state.shutdown_rx();
        let mut rx2 = state.shutdown_rx();
        tx.send(()).unwrap();
        rx1.recv().await.unwrap();
        rx2.recv().await.unwrap();
    }
}
