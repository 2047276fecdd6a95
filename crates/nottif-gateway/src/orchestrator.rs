//! Composition of config, delivery, scheduling and the event log.
//!
//! Every trigger (API call, cron tick, test button) ends up in
//! [`Orchestrator::record`], and every config mutation goes through the
//! [`ConfigStore`] write lock together with the matching [`Scheduler`]
//! change, so the persisted job list and the live schedules never diverge.

use std::sync::Arc;

use futures::FutureExt;
use thiserror::Error;
use tracing::{info, warn};

use nottif_config::{ConfigError, ConfigStore};
use nottif_cron::{EventReporter, ScheduleEngine, ScheduleError, Scheduler};
use nottif_notifier::{Notifier, Transport};
use nottif_types::{CronJob, Event, EventSource, Identity};

use crate::broadcast::{Broadcaster, Subscription};
use crate::event_log::EventLog;

/// Body of the message sent by the test button.
pub const TEST_MESSAGE: &str = "This is a test notification from Nottif!";

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error("failed to persist config: {0}")]
    Persist(#[from] ConfigError),
}

/// Result of a successful removal request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(CronJob),
    NotFound,
}

pub struct Orchestrator {
    config: Arc<ConfigStore>,
    notifier: Arc<Notifier>,
    scheduler: Scheduler,
    events: Arc<EventLog>,
}

impl Orchestrator {
    /// Wire the components together. Persisted jobs are not registered
    /// until [`Orchestrator::start`].
    pub async fn new(
        config: Arc<ConfigStore>,
        transport: Arc<dyn Transport>,
        engine: Arc<dyn ScheduleEngine>,
    ) -> Self {
        let webhook_url = config.read().await.webhook_url.clone();
        let notifier = Arc::new(Notifier::new(webhook_url, transport));
        let events = Arc::new(EventLog::new(Broadcaster::new()));

        let log = events.clone();
        let reporter: EventReporter =
            Arc::new(move |source: EventSource, message: String, success: bool| {
                let log = log.clone();
                async move {
                    log.record(source, &message, success).await;
                }
                .boxed()
            });
        let scheduler = Scheduler::new(engine, notifier.clone(), reporter);

        Self {
            config,
            notifier,
            scheduler,
            events,
        }
    }

    /// Register every persisted job, then let the scheduler fire.
    ///
    /// Jobs with an invalid schedule are skipped. Returns how many jobs were
    /// registered.
    pub async fn start(&self) -> usize {
        let mut registered = 0;
        {
            let config = self.config.read().await;
            for job in &config.cron_jobs {
                match self.scheduler.add_job(job).await {
                    Ok(()) => registered += 1,
                    Err(e) => warn!(job_id = %job.id, "Skipping cron job at startup: {e}"),
                }
            }
        }
        self.scheduler.start();
        info!(registered, "Orchestrator started");
        registered
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    /// Append an event to the log and publish it.
    pub async fn record(&self, source: EventSource, message: &str, success: bool) -> Event {
        self.events.record(source, message, success).await
    }

    /// Deliver `message` and log the outcome under `source`.
    pub async fn record_and_notify(
        &self,
        source: EventSource,
        message: &str,
        identity: Option<Identity>,
    ) -> bool {
        let identity = identity.unwrap_or_default();
        let success = match self.notifier.send(message, &identity).await {
            Ok(()) => true,
            Err(e) => {
                warn!(source = %source, "Failed to send notification: {e}");
                false
            }
        };
        self.record(source, message, success).await;
        success
    }

    /// Send the fixed test message; the log shows it as `Test Notification`.
    pub async fn send_test(&self) -> bool {
        let success = match self.notifier.send(TEST_MESSAGE, &Identity::test()).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send test notification: {e}");
                false
            }
        };
        self.record(EventSource::Test, "Test Notification", success).await;
        success
    }

    /// Schedule and persist a new job.
    ///
    /// The job is registered before it is written; if the write fails it is
    /// deregistered again and nothing changes.
    pub async fn add_cron_job(
        &self,
        message: &str,
        schedule: &str,
    ) -> Result<CronJob, OrchestratorError> {
        let job = CronJob::new(message, schedule);

        let mut config = self.config.write().await;
        self.scheduler.add_job(&job).await?;
        config.cron_jobs.push(job.clone());
        if let Err(e) = config.save().await {
            warn!(job_id = %job.id, "Persisting new cron job failed, rolling back: {e}");
            config.take_job(&job.id);
            self.scheduler.remove_job(&job.id).await;
            return Err(e.into());
        }
        drop(config);

        info!(job_id = %job.id, schedule = %job.schedule, "Added cron job");
        Ok(job)
    }

    /// Deregister and un-persist a job.
    ///
    /// The job stops firing before it is removed from the config. If the
    /// write fails it is restored at its old position and scheduled again.
    pub async fn remove_cron_job(&self, id: &str) -> Result<RemoveOutcome, OrchestratorError> {
        let mut config = self.config.write().await;
        let Some(job) = config.find_job(id).cloned() else {
            info!(job_id = id, "Cron job to delete not found");
            return Ok(RemoveOutcome::NotFound);
        };

        self.scheduler.remove_job(id).await;
        let taken = config.take_job(id);
        if let Err(e) = config.save().await {
            warn!(job_id = id, "Persisting cron job removal failed, rolling back: {e}");
            if let Some((index, job)) = taken {
                config.restore_job(index, job);
            }
            if let Err(e) = self.scheduler.add_job(&job).await {
                warn!(job_id = id, "Failed to reschedule cron job after rollback: {e}");
            }
            return Err(e.into());
        }
        drop(config);

        info!(job_id = id, "Deleted cron job");
        Ok(RemoveOutcome::Removed(job))
    }

    /// Persist a new webhook URL, then point the notifier at it.
    ///
    /// On a failed write the config keeps the old URL and the notifier is
    /// untouched.
    pub async fn update_webhook_url(&self, url: &str) -> Result<(), OrchestratorError> {
        let mut config = self.config.write().await;
        let previous = std::mem::replace(&mut config.webhook_url, url.to_string());
        if let Err(e) = config.save().await {
            warn!("Persisting webhook URL failed, keeping the old one: {e}");
            config.webhook_url = previous;
            return Err(e.into());
        }
        self.notifier.set_webhook_url(url).await;
        drop(config);

        info!("Updated webhook URL");
        Ok(())
    }

    pub async fn list_cron_jobs(&self) -> Vec<CronJob> {
        self.config.read().await.cron_jobs.clone()
    }

    pub async fn current_events(&self) -> Vec<Event> {
        self.events.snapshot().await
    }

    /// Current events plus a live feed of every later snapshot.
    pub async fn subscribe_to_events(&self) -> (Vec<Event>, Subscription) {
        self.events.subscribe().await
    }

    pub async fn webhook_url(&self) -> String {
        self.notifier.webhook_url().await
    }

    /// IDs currently registered with the scheduler, sorted.
    pub async fn scheduled_job_ids(&self) -> Vec<String> {
        self.scheduler.job_ids().await
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }
}
