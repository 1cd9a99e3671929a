use super::context::JobContext;
use crate::host::{ManagedTask, TaskError};
use crate::metrics;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Longest period the ticker is armed with. Longer intervals never tick within
/// the lifetime of a process and would overflow `Instant`.
const MAX_TICK_PERIOD: Duration = Duration::from_secs(86_400 * 365 * 30);

/// The work a recurring job performs on every execution.
pub type JobAction = Arc<dyn Fn(JobContext) -> BoxFuture<'static, ()> + Send + Sync>;

/// Errors returned by [`RecurringJob`].
#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid job configuration: {0}")]
    InvalidConfig(String),

    /// `start` was called on a job that already ran. Jobs are single-use.
    #[error("job was already started")]
    AlreadyStarted,

    /// The context passed to `start` was cancelled.
    #[error("job was cancelled")]
    Cancelled,
}

impl JobError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobError::Cancelled)
    }
}

/// What caused an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Immediate,
    Tick,
}

impl Trigger {
    fn as_str(&self) -> &'static str {
        match self {
            Trigger::Immediate => "immediate",
            Trigger::Tick => "tick",
        }
    }
}

/// Builder for [`RecurringJob`].
pub struct RecurringJobBuilder {
    name: String,
    interval: Option<Duration>,
    execute_immediately: bool,
    action: Option<JobAction>,
}

impl RecurringJobBuilder {
    /// Time between two ticks. Required, must be non-zero.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Run the action once at start, without waiting for the first tick.
    pub fn execute_immediately(mut self, execute_immediately: bool) -> Self {
        self.execute_immediately = execute_immediately;
        self
    }

    pub fn action<F, Fut>(mut self, action: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: JobAction = Arc::new(move |ctx: JobContext| action(ctx).boxed());
        self.action = Some(action);
        self
    }

    pub fn build(self) -> Result<RecurringJob, JobError> {
        let interval = match self.interval {
            None => {
                return Err(JobError::InvalidConfig(format!(
                    "job '{}' has no interval",
                    self.name
                )))
            }
            Some(interval) if interval.is_zero() => {
                return Err(JobError::InvalidConfig(format!(
                    "job '{}' interval must be greater than zero",
                    self.name
                )))
            }
            Some(interval) => interval,
        };

        let action = self.action.ok_or_else(|| {
            JobError::InvalidConfig(format!("job '{}' has no action", self.name))
        })?;

        Ok(RecurringJob {
            name: self.name,
            interval,
            execute_immediately: self.execute_immediately,
            action,
            stop_token: CancellationToken::new(),
            stop_requested: AtomicBool::new(false),
            started: AtomicBool::new(false),
            in_flight: TaskTracker::new(),
        })
    }
}

/// Runs an action at a fixed interval until stopped or cancelled.
///
/// Ticked executions run in-line on the task driving [`RecurringJob::start`],
/// so they never overlap. Missed ticks are skipped rather than replayed: after
/// an execution that outlasts the interval, the next one starts on the next
/// tick of the original schedule, so the gap can be up to one interval. The
/// optional immediate execution runs on its own task and is joined before
/// `start` returns.
pub struct RecurringJob {
    name: String,
    interval: Duration,
    execute_immediately: bool,
    action: JobAction,
    stop_token: CancellationToken,
    /// Once-guard for `stop_token`.
    stop_requested: AtomicBool,
    started: AtomicBool,
    /// Tracks every in-flight execution.
    in_flight: TaskTracker,
}

impl RecurringJob {
    pub fn builder(name: impl Into<String>) -> RecurringJobBuilder {
        RecurringJobBuilder {
            name: name.into(),
            interval: None,
            execute_immediately: false,
            action: None,
        }
    }

    /// Shorthand for the builder with every option supplied.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        interval: Duration,
        execute_immediately: bool,
        action: F,
    ) -> Result<Self, JobError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::builder(name)
            .interval(interval)
            .execute_immediately(execute_immediately)
            .action(action)
            .build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn executes_immediately(&self) -> bool {
        self.execute_immediately
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Number of executions currently in flight.
    pub fn running_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Run the job until `stop` is called or `ctx` is cancelled.
    ///
    /// Returns `Ok(())` after a stop and [`JobError::Cancelled`] after a
    /// context cancellation. In both cases every in-flight execution has
    /// completed by the time this returns.
    pub async fn start(&self, ctx: JobContext) -> Result<(), JobError> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!(job = %self.name, "Recurring job started more than once");
            return Err(JobError::AlreadyStarted);
        }

        info!(
            job = %self.name,
            interval = ?self.interval,
            execute_immediately = self.execute_immediately,
            "Recurring job started"
        );

        if self.execute_immediately {
            let name = self.name.clone();
            let action = Arc::clone(&self.action);
            let run_ctx = ctx.clone();
            self.in_flight.spawn(async move {
                execute(&name, &action, run_ctx, Trigger::Immediate).await;
            });
        }

        let period = self.interval.min(MAX_TICK_PERIOD);
        let first_tick = tokio::time::Instant::now() + period;
        let mut ticker = tokio::time::interval_at(first_tick, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let outcome = loop {
            tokio::select! {
                biased;
                _ = ctx.cancelled() => break Err(JobError::Cancelled),
                _ = self.stop_token.cancelled() => break Ok(()),
                _ = ticker.tick() => {
                    self.in_flight
                        .track_future(execute(&self.name, &self.action, ctx.clone(), Trigger::Tick))
                        .await;
                }
            }
        };

        self.in_flight.close();
        self.in_flight.wait().await;

        match &outcome {
            Ok(()) => info!(job = %self.name, "Recurring job stopped"),
            Err(_) => info!(job = %self.name, "Recurring job stopped by context"),
        }
        outcome
    }

    /// Request termination. Never blocks and may be called any number of
    /// times, from any thread, before, during or after `start`.
    ///
    /// Hosts that need the fallible `stop(ctx)` form go through
    /// [`ManagedTask::stop`], which calls this and always returns `Ok(())`.
    pub fn stop(&self) {
        if !self.stop_requested.swap(true, Ordering::AcqRel) {
            debug!(job = %self.name, "Stop requested");
            self.stop_token.cancel();
        }
    }
}

impl fmt::Debug for RecurringJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurringJob")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("execute_immediately", &self.execute_immediately)
            .field("stop_requested", &self.is_stop_requested())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ManagedTask for RecurringJob {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self, ctx: JobContext) -> Result<(), TaskError> {
        RecurringJob::start(self, ctx).await.map_err(TaskError::from)
    }

    async fn stop(&self, _ctx: JobContext) -> Result<(), TaskError> {
        RecurringJob::stop(self);
        Ok(())
    }
}

/// Run one execution. A panic inside the action is logged and swallowed so
/// the job keeps ticking.
async fn execute(name: &str, action: &JobAction, ctx: JobContext, trigger: Trigger) {
    debug!(job = %name, trigger = trigger.as_str(), "Executing recurring job");
    metrics::job_execution_started(name);
    let started_at = Instant::now();

    let result = AssertUnwindSafe(async move { action(ctx).await })
        .catch_unwind()
        .await;

    let elapsed = started_at.elapsed();
    metrics::job_execution_finished(name);

    let status = match result {
        Ok(()) => {
            debug!(job = %name, "Recurring job execution finished in {:?}", elapsed);
            "success"
        }
        Err(payload) => {
            error!(
                job = %name,
                "Recurring job action panicked after {:?}: {}",
                elapsed,
                panic_message(payload.as_ref())
            );
            "panic"
        }
    };
    metrics::record_job_execution(name, trigger.as_str(), status, elapsed);
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
