//! Background retraining: simulate a fresh corpus, train, persist, then swap the
//! active model. At most one job runs at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use menuwise_core::config::AppConfig;
use menuwise_core::domain::menu::MenuCatalog;
use menuwise_core::model_slot::ModelSource;
use menuwise_core::recommendation::RecommendationEngine;
use menuwise_core::retrain::{RetrainJobRecord, RetrainJobState, RetrainRequest, RetrainSummary};
use menuwise_core::simulator::PolicySimulator;
use menuwise_core::training::{Trainer, TrainingError, TrainingOutcome};
use tokio::sync::{watch, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Blocking training work. The token is cancelled once the job is abandoned and should be
/// polled so the work stops early.
pub type TrainingJob =
    Box<dyn FnOnce(CancellationToken) -> Result<TrainingOutcome, TrainingError> + Send + 'static>;

#[derive(Clone, Debug)]
pub struct RetrainSettings {
    pub default_days: u32,
    pub default_seed: Option<u64>,
    /// Deadline for simulation plus training.
    pub timeout: Duration,
}

impl RetrainSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_days: config.simulation.num_days,
            default_seed: config.simulation.seed,
            timeout: Duration::from_secs(config.training.timeout_secs),
        }
    }
}

struct JobEntry {
    record: RetrainJobRecord,
    updates: watch::Sender<RetrainJobState>,
}

struct Inner {
    engine: RecommendationEngine,
    trainer: Trainer,
    settings: RetrainSettings,
    jobs: RwLock<HashMap<Uuid, JobEntry>>,
    active: Mutex<Option<Uuid>>,
}

#[derive(Clone)]
pub struct RetrainCoordinator {
    inner: Arc<Inner>,
}

impl RetrainCoordinator {
    pub fn new(engine: RecommendationEngine, trainer: Trainer, settings: RetrainSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                trainer,
                settings,
                jobs: RwLock::new(HashMap::new()),
                active: Mutex::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &RetrainSettings {
        &self.inner.settings
    }

    /// Starts a simulated-corpus retrain, or returns the job already in flight. A job that
    /// timed out stays in flight until its blocking work has actually exited.
    pub async fn trigger(&self, request: RetrainRequest) -> RetrainJobRecord {
        let job = self.simulated_job(&request);
        self.trigger_with(request, job).await
    }

    pub async fn trigger_with(&self, request: RetrainRequest, job: TrainingJob) -> RetrainJobRecord {
        let mut active = self.inner.active.lock().await;
        if let Some(running) = *active {
            if let Some(record) = self.get(running).await {
                info!(
                    event_name = "retrain.job.already_running",
                    correlation_id = %running,
                    state = record.state.as_str(),
                    "retrain requested while a job is in flight"
                );
                return record;
            }
        }

        let record = RetrainJobRecord::pending(request);
        let job_id = record.job_id;
        let (updates, _) = watch::channel(record.state);
        self.inner
            .jobs
            .write()
            .await
            .insert(job_id, JobEntry { record: record.clone(), updates });
        *active = Some(job_id);
        drop(active);

        info!(
            event_name = "retrain.job.queued",
            correlation_id = %job_id,
            days = record.request.days,
            "retrain job queued"
        );
        tokio::spawn(self.clone().run(job_id, job));
        record
    }

    pub async fn get(&self, job_id: Uuid) -> Option<RetrainJobRecord> {
        self.inner.jobs.read().await.get(&job_id).map(|entry| entry.record.clone())
    }

    /// Waits up to `wait` for the job to reach a terminal state and returns its record.
    pub async fn wait_for(&self, job_id: Uuid, wait: Duration) -> Option<RetrainJobRecord> {
        let mut receiver = self.inner.jobs.read().await.get(&job_id)?.updates.subscribe();
        let _ = tokio::time::timeout(wait, async move {
            receiver.wait_for(|state| state.is_terminal()).await.is_ok()
        })
        .await;
        self.get(job_id).await
    }

    fn simulated_job(&self, request: &RetrainRequest) -> TrainingJob {
        let trainer = self.inner.trainer.clone();
        let days = request.days;
        let seed = request.seed;
        Box::new(move |cancel: CancellationToken| {
            let mut simulator = PolicySimulator::new(MenuCatalog::default(), seed)
                .map_err(|error| TrainingError::InvalidSettings(error.to_string()))?;
            let orders: Vec<_> = simulator
                .simulate(days)
                .map_err(|error| TrainingError::InvalidSettings(error.to_string()))?
                .collect();
            trainer.train_until(&orders, &|| cancel.is_cancelled())
        })
    }

    async fn run(self, job_id: Uuid, job: TrainingJob) {
        self.update(job_id, RetrainJobRecord::mark_running).await;
        info!(event_name = "retrain.job.started", correlation_id = %job_id, "retrain job started");

        let timeout = self.inner.settings.timeout;
        let cancel = CancellationToken::new();
        let mut work = tokio::task::spawn_blocking({
            let cancel = cancel.clone();
            move || job(cancel)
        });
        match tokio::time::timeout(timeout, &mut work).await {
            Err(_) => {
                cancel.cancel();
                warn!(
                    event_name = "retrain.job.timed_out",
                    correlation_id = %job_id,
                    timeout_secs = timeout.as_secs(),
                    "retrain job exceeded its deadline; active model unchanged"
                );
                self.update(job_id, |record| record.mark_timed_out(timeout.as_secs())).await;

                // Blocking work cannot be aborted; keep the slot until it exits and drop
                // whatever it produced.
                let discarded = match work.await {
                    Ok(Ok(_)) => "completed",
                    Ok(Err(TrainingError::Cancelled)) => "cancelled",
                    Ok(Err(_)) => "failed",
                    Err(_) => "aborted",
                };
                info!(
                    event_name = "retrain.job.drained",
                    correlation_id = %job_id,
                    discarded,
                    "abandoned retrain work exited; result discarded"
                );
            }
            Ok(Err(join_error)) => {
                warn!(
                    event_name = "retrain.job.aborted",
                    correlation_id = %job_id,
                    error = %join_error,
                    "retrain task aborted"
                );
                self.update(job_id, |record| record.mark_failed(format!("retrain task aborted: {join_error}")))
                    .await;
            }
            Ok(Ok(Err(training_error))) => {
                warn!(
                    event_name = "retrain.job.failed",
                    correlation_id = %job_id,
                    error = %training_error,
                    "retrain job failed; active model unchanged"
                );
                self.update(job_id, |record| record.mark_failed(training_error.to_string())).await;
            }
            Ok(Ok(Ok(outcome))) => self.publish(job_id, outcome).await,
        }

        let mut active = self.inner.active.lock().await;
        if *active == Some(job_id) {
            *active = None;
        }
    }

    async fn publish(&self, job_id: Uuid, outcome: TrainingOutcome) {
        let TrainingOutcome { model, report } = outcome;
        let store = self.inner.engine.store().clone();
        let saved = tokio::task::spawn_blocking(move || store.save(&model).map(|()| model)).await;

        match saved {
            Ok(Ok(model)) => {
                let loaded = self.inner.engine.install(model, ModelSource::Retrain { job_id });
                info!(
                    event_name = "retrain.job.succeeded",
                    correlation_id = %job_id,
                    model_version = loaded.version,
                    accuracy = report.evaluation.accuracy,
                    "retrained model published"
                );
                let summary = RetrainSummary::from_report(&report, loaded.version);
                self.update(job_id, |record| record.mark_succeeded(summary)).await;
            }
            Ok(Err(artifact_error)) => {
                let error = TrainingError::from(artifact_error);
                warn!(
                    event_name = "retrain.job.failed",
                    correlation_id = %job_id,
                    error = %error,
                    "retrained model could not be persisted; active model unchanged"
                );
                self.update(job_id, |record| record.mark_failed(error.to_string())).await;
            }
            Err(join_error) => {
                self.update(job_id, |record| {
                    record.mark_failed(format!("artifact write aborted: {join_error}"))
                })
                .await;
            }
        }
    }

    async fn update(&self, job_id: Uuid, apply: impl FnOnce(&mut RetrainJobRecord)) {
        let mut jobs = self.inner.jobs.write().await;
        if let Some(entry) = jobs.get_mut(&job_id) {
            apply(&mut entry.record);
            entry.updates.send_replace(entry.record.state);
        }
    }
}
