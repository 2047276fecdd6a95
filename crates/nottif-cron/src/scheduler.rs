//! Cron job scheduler: maps persisted job IDs to live engine registrations.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{info, warn};

use nottif_notifier::Notifier;
use nottif_types::{CronJob, EventSource, Identity};

use crate::ScheduleError;
use crate::engine::{JobHandle, JobTask, ScheduleEngine};

/// Callback through which firings report their outcome.
pub type EventReporter =
    Arc<dyn Fn(EventSource, String, bool) -> BoxFuture<'static, ()> + Send + Sync>;

/// Owns the logical job ID → engine handle mapping.
pub struct Scheduler {
    engine: Arc<dyn ScheduleEngine>,
    notifier: Arc<Notifier>,
    reporter: EventReporter,
    entries: Mutex<HashMap<String, JobHandle>>,
}

impl Scheduler {
    pub fn new(
        engine: Arc<dyn ScheduleEngine>,
        notifier: Arc<Notifier>,
        reporter: EventReporter,
    ) -> Self {
        Self {
            engine,
            notifier,
            reporter,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a job with the engine.
    ///
    /// On error nothing is registered. Adding an ID that is already
    /// scheduled replaces the old registration once the new one succeeds.
    pub async fn add_job(&self, job: &CronJob) -> Result<(), ScheduleError> {
        let mut entries = self.entries.lock().await;
        let handle = match self.engine.register(&job.schedule, self.job_task(job)).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    job_id = %job.id,
                    schedule = %job.schedule,
                    "Error adding cron job: {e}"
                );
                return Err(e);
            }
        };

        if let Some(previous) = entries.insert(job.id.clone(), handle) {
            self.engine.cancel(previous).await;
        }
        info!(job_id = %job.id, schedule = %job.schedule, "Scheduled cron job");
        Ok(())
    }

    /// Deregister a job. Unknown IDs are logged and ignored.
    ///
    /// Returns whether a registration was removed.
    pub async fn remove_job(&self, id: &str) -> bool {
        let Some(handle) = self.entries.lock().await.remove(id) else {
            info!(job_id = id, "Attempted to remove a cron job that is not scheduled");
            return false;
        };
        if !self.engine.cancel(handle).await {
            warn!(job_id = id, "Engine had no registration for cron job");
        }
        info!(job_id = id, "Removed cron job from scheduler");
        true
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.entries.lock().await.contains_key(id)
    }

    /// IDs of every scheduled job, sorted.
    pub async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Let the engine begin firing.
    pub fn start(&self) {
        self.engine.start();
        info!("Cron scheduler started");
    }

    /// Cancel all registrations.
    pub async fn shutdown(&self) {
        self.entries.lock().await.clear();
        self.engine.shutdown().await;
        info!("Cron scheduler stopped");
    }

    fn job_task(&self, job: &CronJob) -> JobTask {
        let notifier = self.notifier.clone();
        let reporter = self.reporter.clone();
        let job_id = job.id.clone();
        let message = job.message.clone();

        Arc::new(move || {
            let notifier = notifier.clone();
            let reporter = reporter.clone();
            let job_id = job_id.clone();
            let message = message.clone();
            async move {
                info!(job_id = %job_id, "Running cron job");
                let result = notifier.send(&message, &Identity::cron()).await;
                if let Err(e) = &result {
                    warn!(job_id = %job_id, "Cron delivery failed: {e}");
                }
                reporter(EventSource::Cron, message, result.is_ok()).await;
            }
            .boxed()
        })
    }
}
