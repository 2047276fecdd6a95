//! Timer engines that turn cron expressions into repeated task invocations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use cron::Schedule;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::ScheduleError;

/// Work run on every tick. Each call produces an independent future.
pub type JobTask = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Opaque handle to a registration inside an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle(Uuid);

impl JobHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability to run tasks on cron schedules.
///
/// Registrations made before [`ScheduleEngine::start`] do not fire until the
/// engine is started.
#[async_trait]
pub trait ScheduleEngine: Send + Sync {
    /// Register `task` to run on `expr`. Fails if the expression is rejected
    /// or the engine has been shut down.
    async fn register(&self, expr: &str, task: JobTask) -> Result<JobHandle, ScheduleError>;

    /// Stop future firings of a registration. Returns `false` if unknown.
    async fn cancel(&self, handle: JobHandle) -> bool;

    /// Begin firing registered tasks.
    fn start(&self);

    /// Cancel every registration.
    async fn shutdown(&self);
}

/// A parsed 5-field cron expression.
///
/// When both day-of-month and day-of-week are restricted, a day matching
/// either field fires, as in classic cron. The `cron` crate ANDs the two, so
/// that case is held as two schedules and the earlier occurrence wins.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    primary: Schedule,
    alternate: Option<Schedule>,
}

impl CronSchedule {
    /// First occurrence strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let primary = self.primary.after(after).next();
        let alternate = self.alternate.as_ref().and_then(|s| s.after(after).next());
        match (primary, alternate) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

/// Parse a standard 5-field cron expression.
///
/// The `cron` crate wants a leading seconds field and a trailing year, and
/// numbers days of the week 1-7 from Sunday, so the expression is rewritten
/// before parsing.
pub fn parse_schedule(expr: &str) -> Result<CronSchedule, ScheduleError> {
    let invalid = |reason: String| ScheduleError::InvalidExpression {
        expr: expr.to_string(),
        reason,
    };

    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() != 5 {
        return Err(invalid(format!("expected 5 fields, found {}", fields.len())));
    }

    let day_of_week = translate_day_of_week(fields[4]).map_err(invalid)?;
    let build = |day_of_month: &str, day_of_week: &str| {
        format!(
            "0 {} {} {} {} {} *",
            fields[0], fields[1], day_of_month, fields[3], day_of_week
        )
        .parse::<Schedule>()
        .map_err(|e| invalid(e.to_string()))
    };

    if is_restricted(fields[2]) && is_restricted(fields[4]) {
        Ok(CronSchedule {
            primary: build(fields[2], "?")?,
            alternate: Some(build("?", &day_of_week)?),
        })
    } else {
        Ok(CronSchedule {
            primary: build(fields[2], &day_of_week)?,
            alternate: None,
        })
    }
}

fn is_restricted(field: &str) -> bool {
    !matches!(field, "*" | "?")
}

/// Rewrite a day-of-week field from 0-7 (0 and 7 = Sunday) to 1-7 (1 = Sunday).
///
/// Numeric ranges and steps are expanded to an explicit list; named days
/// (`MON`, `SUN-SAT`) pass through untouched.
fn translate_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" {
        return Ok(field.to_string());
    }

    let mut days: Vec<String> = Vec::new();
    for item in field.split(',') {
        if item.chars().any(|c| c.is_ascii_alphabetic()) {
            days.push(item.to_string());
            continue;
        }

        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: usize = step
                    .parse()
                    .map_err(|_| format!("invalid day-of-week step '{step}'"))?;
                if step == 0 {
                    return Err("day-of-week step must be > 0".to_string());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((a, b)) = range.split_once('-') {
            (parse_day(a)?, parse_day(b)?)
        } else if item.contains('/') {
            (parse_day(range)?, 6)
        } else {
            let day = parse_day(range)?;
            (day, day)
        };
        if start > end {
            return Err(format!("invalid day-of-week range '{range}'"));
        }

        for day in (start..=end).step_by(step) {
            let mapped = (day % 7 + 1).to_string();
            if !days.contains(&mapped) {
                days.push(mapped);
            }
        }
    }
    Ok(days.join(","))
}

fn parse_day(value: &str) -> Result<u32, String> {
    match value.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("invalid day of week '{value}'")),
    }
}

// ──────────────────── Tokio engine ────────────────────

/// [`ScheduleEngine`] running one tokio task per registration.
///
/// Each tick spawns the job's future separately, so a slow delivery never
/// delays the next tick and firings may overlap.
pub struct TokioCronEngine {
    jobs: Mutex<HashMap<JobHandle, CancellationToken>>,
    started: watch::Sender<bool>,
    shutdown: CancellationToken,
}

impl TokioCronEngine {
    pub fn new() -> Self {
        let (started, _) = watch::channel(false);
        Self {
            jobs: Mutex::new(HashMap::new()),
            started,
            shutdown: CancellationToken::new(),
        }
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.lock().await.is_empty()
    }

    async fn register_schedule(
        &self,
        schedule: CronSchedule,
        task: JobTask,
    ) -> Result<JobHandle, ScheduleError> {
        let mut jobs = self.jobs.lock().await;
        if self.shutdown.is_cancelled() {
            return Err(ScheduleError::EngineStopped);
        }

        let handle = JobHandle::new();
        let cancel = self.shutdown.child_token();
        tokio::spawn(run_schedule(
            schedule,
            task,
            self.started.subscribe(),
            cancel.clone(),
        ));
        jobs.insert(handle, cancel);
        Ok(handle)
    }
}

impl Default for TokioCronEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScheduleEngine for TokioCronEngine {
    async fn register(&self, expr: &str, task: JobTask) -> Result<JobHandle, ScheduleError> {
        let schedule = parse_schedule(expr)?;
        self.register_schedule(schedule, task).await
    }

    async fn cancel(&self, handle: JobHandle) -> bool {
        match self.jobs.lock().await.remove(&handle) {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn start(&self) {
        self.started.send_replace(true);
    }

    async fn shutdown(&self) {
        let mut jobs = self.jobs.lock().await;
        self.shutdown.cancel();
        jobs.clear();
    }
}

/// Next occurrence strictly after `now` and how long until it.
fn next_delay<Tz: TimeZone>(
    schedule: &CronSchedule,
    now: &DateTime<Tz>,
) -> Option<(DateTime<Tz>, Duration)> {
    let next = schedule.next_after(now)?;
    let delay = (next.clone() - now.clone()).to_std().unwrap_or(Duration::ZERO);
    Some((next, delay))
}

async fn run_schedule(
    schedule: CronSchedule,
    task: JobTask,
    mut started: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    let ready = async { started.wait_for(|s| *s).await.is_ok() };
    tokio::select! {
        _ = cancel.cancelled() => return,
        ok = ready => if !ok { return },
    }

    // Expressions are read in the server's local time zone.
    let mut last_fired: Option<DateTime<Local>> = None;
    loop {
        let now = match last_fired {
            Some(last) => Local::now().max(last),
            None => Local::now(),
        };
        let Some((next, delay)) = next_delay(&schedule, &now) else {
            debug!("Schedule has no further occurrences");
            break;
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {
                last_fired = Some(next);
                tokio::spawn(task());
            }
        }
    }
}
