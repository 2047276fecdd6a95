//! Engine that only fires when told to.
//!
//! Validates expressions exactly like [`TokioCronEngine`](crate::TokioCronEngine)
//! but never looks at the clock; callers drive ticks with
//! [`ManualEngine::fire_all`]. Used by tests and by embedders that tick from
//! their own timer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ScheduleError;
use crate::engine::{JobHandle, JobTask, ScheduleEngine, parse_schedule};

#[derive(Default)]
pub struct ManualEngine {
    jobs: Mutex<HashMap<JobHandle, (String, JobTask)>>,
    started: AtomicBool,
    stopped: AtomicBool,
}

impl ManualEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Number of live registrations.
    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    /// Run one tick of every registration, in no particular order, and wait
    /// for all of them. Does nothing before [`ScheduleEngine::start`].
    ///
    /// Returns how many tasks ran.
    pub async fn fire_all(&self) -> usize {
        if !self.is_started() {
            return 0;
        }
        let tasks: Vec<JobTask> = self
            .jobs
            .lock()
            .await
            .values()
            .map(|(_, task)| task.clone())
            .collect();
        for task in &tasks {
            task().await;
        }
        tasks.len()
    }
}

#[async_trait]
impl ScheduleEngine for ManualEngine {
    async fn register(&self, expr: &str, task: JobTask) -> Result<JobHandle, ScheduleError> {
        parse_schedule(expr)?;
        let mut jobs = self.jobs.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ScheduleError::EngineStopped);
        }
        let handle = JobHandle::new();
        jobs.insert(handle, (expr.to_string(), task));
        Ok(handle)
    }

    async fn cancel(&self, handle: JobHandle) -> bool {
        self.jobs.lock().await.remove(&handle).is_some()
    }

    fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        self.stopped.store(true, Ordering::SeqCst);
        jobs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_fires_only_after_start() {
        let engine = ManualEngine::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let c = counter.clone();
        engine
            .register(
                "* * * * *",
                Arc::new(move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                    }
                    .boxed()
                }),
            )
            .await
            .unwrap();

        assert_eq!(engine.fire_all().await, 0);
        engine.start();
        assert_eq!(engine.fire_all().await, 1);
        assert_eq!(engine.fire_all().await, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_firing() {
        let engine = ManualEngine::new();
        let handle = engine
            .register("0 * * * *", Arc::new(|| async {}.boxed()))
            .await
            .unwrap();
        engine.start();
        assert!(engine.cancel(handle).await);
        assert_eq!(engine.fire_all().await, 0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_expression() {
        let engine = ManualEngine::new();
        let result = engine.register("bogus", Arc::new(|| async {}.boxed())).await;
        assert!(result.is_err());
        assert!(engine.is_empty().await);
    }

    #[tokio::test]
    async fn test_register_after_shutdown() {
        let engine = ManualEngine::new();
        engine.start();
        engine.shutdown().await;
        let result = engine.register("* * * * *", Arc::new(|| async {}.boxed())).await;
        assert!(matches!(result, Err(ScheduleError::EngineStopped)));
        assert_eq!(engine.fire_all().await, 0);
    }
}
