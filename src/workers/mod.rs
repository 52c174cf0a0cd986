pub mod schedule_rollover;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::WorkerConfig;
use crate::constants::{SCHEDULE_ROLLOVER_CRON, WORKER_JOB_TIMEOUT_SECS};
use crate::store::Store;
use crate::study::clock::Clock;
use crate::study::scheduler::Scheduler;

const WORKER_TIMEOUT: Duration = Duration::from_secs(WORKER_JOB_TIMEOUT_SECS);

/// Drain period before scheduler shutdown to let in-flight tasks complete.
#[cfg(test)]
const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);
#[cfg(not(test))]
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerName {
    ScheduleRollover,
}

impl WorkerName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ScheduleRollover => "schedule_rollover",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub name: WorkerName,
    pub cron: &'static str,
    pub enabled: bool,
}

pub struct WorkerManager {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
    shutdown_rx: broadcast::Receiver<()>,
    config: WorkerConfig,
}

impl WorkerManager {
    pub fn new(
        store: Arc<Store>,
        clock: Arc<dyn Clock>,
        shutdown_rx: broadcast::Receiver<()>,
        config: &WorkerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            shutdown_rx,
            config: config.clone(),
        }
    }

    /// Every job this instance would run, with its cron schedule.
    pub fn planned_jobs(&self) -> Vec<JobSpec> {
        if !self.config.is_leader {
            return Vec::new();
        }

        vec![JobSpec {
            name: WorkerName::ScheduleRollover,
            cron: SCHEDULE_ROLLOVER_CRON,
            enabled: self.config.enable_schedule_rollover,
        }]
    }

    /// Start the worker scheduler and block until shutdown is signalled.
    pub async fn start(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !self.config.is_leader {
            tracing::info!("Worker leader disabled; skipping worker startup");
            return Ok(());
        }

        let mut scheduler = JobScheduler::new().await?;

        self.register_jobs(&scheduler).await;

        scheduler.start().await?;

        tracing::info!("Worker manager started");
        let _ = self.shutdown_rx.recv().await;

        tracing::info!(
            drain_secs = DRAIN_TIMEOUT.as_secs(),
            "Worker manager shutting down"
        );
        tokio::time::sleep(DRAIN_TIMEOUT).await;
        let _ = scheduler.shutdown().await;
        Ok(())
    }

    async fn register_jobs(&self, scheduler: &JobScheduler) {
        for spec in &self.planned_jobs() {
            if !spec.enabled {
                tracing::info!(name = spec.name.as_str(), "Skipping disabled worker");
                continue;
            }

            let name_str = spec.name.as_str();
            match spec.name {
                WorkerName::ScheduleRollover => {
                    let scheduler_core = Arc::new(Scheduler::new(self.store.clone(), self.clock.clone()));
                    add_job(scheduler, spec.cron, name_str, move || {
                        let scheduler_core = scheduler_core.clone();
                        async move {
                            schedule_rollover::run(&scheduler_core).await;
                        }
                    })
                    .await;
                }
            }
            tracing::info!(name = name_str, cron = spec.cron, "Registered worker");
        }
    }
}

type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One cron firing. Skipped while the previous firing of the same job is
/// still running; otherwise bounded by `limit` and releases `running` on exit.
fn guarded_invocation<Fut>(
    running: &Arc<AtomicBool>,
    name: &'static str,
    limit: Duration,
    start: impl FnOnce() -> Fut,
) -> JobFuture
where
    Fut: Future<Output = ()> + Send + 'static,
{
    if running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        tracing::warn!(
            worker = name,
            "Skipping worker invocation: previous run still in progress"
        );
        return Box::pin(async {});
    }

    let guard = running.clone();
    let fut = start();
    Box::pin(async move {
        if tokio::time::timeout(limit, fut).await.is_err() {
            tracing::error!(
                worker = name,
                timeout_secs = limit.as_secs(),
                "Worker timed out"
            );
        }
        guard.store(false, Ordering::SeqCst);
    })
}

/// Add a cron job with an overlap guard and the worker timeout.
async fn add_job<Fut, F>(scheduler: &JobScheduler, cron: &str, name: &'static str, mut run: F)
where
    F: FnMut() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));
    let job = Job::new_async(cron, move |_uuid, _lock| {
        guarded_invocation(&running, name, WORKER_TIMEOUT, &mut run)
    });

    match job {
        Ok(job) => {
            if let Err(err) = scheduler.add(job).await {
                tracing::error!(error = %err, cron, worker = name, "Failed to add worker job");
            }
        }
        Err(err) => tracing::error!(error = %err, cron, worker = name, "Failed to create worker job"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use crate::config::WorkerConfig;
    use crate::store::Store;
    use crate::study::clock::SystemClock;

    use super::*;

    fn manager(dir: &tempfile::TempDir, config: WorkerConfig) -> WorkerManager {
        let store = Arc::new(Store::open(dir.path().join("worker.sled").to_str().unwrap()).unwrap());
        let (tx, _) = broadcast::channel(2);
        WorkerManager::new(store, Arc::new(SystemClock), tx.subscribe(), &config)
    }

    #[tokio::test]
    async fn leader_switch_controls_job_registration() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let manager = manager(
            &tmp,
            WorkerConfig {
                is_leader: false,
                enable_schedule_rollover: true,
            },
        );
        assert!(manager.planned_jobs().is_empty());
    }

    #[tokio::test]
    async fn non_leader_start_returns_immediately() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let manager = manager(
            &tmp,
            WorkerConfig {
                is_leader: false,
                enable_schedule_rollover: true,
            },
        );
        manager.start().await.expect("non-leader start should succeed");
    }

    #[tokio::test]
    async fn rollover_runs_just_after_utc_midnight() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let manager = manager(
            &tmp,
            WorkerConfig {
                is_leader: true,
                enable_schedule_rollover: true,
            },
        );
        let jobs = manager.planned_jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].name, WorkerName::ScheduleRollover);
        assert_eq!(jobs[0].cron, "5 0 0 * * *");
        assert!(jobs[0].enabled);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn leader_registers_rollover_job() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let manager = manager(
            &tmp,
            WorkerConfig {
                is_leader: true,
                enable_schedule_rollover: true,
            },
        );
        let mut scheduler = JobScheduler::new().await.expect("job scheduler");
        manager.register_jobs(&scheduler).await;
        let _ = scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn overlapping_invocation_is_skipped() {
        let running = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        guarded_invocation(&running, "test", Duration::from_secs(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn timed_out_invocation_releases_guard() {
        let running = Arc::new(AtomicBool::new(false));

        guarded_invocation(&running, "test", Duration::from_millis(10), || {
            std::future::pending::<()>()
        })
        .await;

        assert!(!running.load(Ordering::SeqCst));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        guarded_invocation(&running, "test", Duration::from_secs(1), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
