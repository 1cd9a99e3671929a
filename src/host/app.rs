use super::task::{ManagedTask, TaskError};
use crate::background_jobs::JobContext;
use anyhow::anyhow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type TaskExit = (String, Result<(), TaskError>);

/// Runs a set of managed tasks until shutdown.
///
/// Shutdown is graceful first: every task gets `stop` (in reverse
/// registration order) and its `start` is awaited. Tasks that are still
/// running after the stop timeout see their start context cancelled, and
/// whatever survives a second timeout is aborted.
pub struct App {
    name: String,
    version: String,
    stop_timeout: Duration,
    tasks: Vec<Arc<dyn ManagedTask>>,
    shutdown_token: CancellationToken,
}

impl App {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            stop_timeout: Duration::from_secs(30),
            tasks: Vec::new(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_task(mut self, task: Arc<dyn ManagedTask>) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn with_tasks(mut self, tasks: impl IntoIterator<Item = Arc<dyn ManagedTask>>) -> Self {
        self.tasks.extend(tasks);
        self
    }

    /// Cancelling this token triggers the same graceful shutdown as a signal.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until Ctrl+C or until the shutdown token is cancelled.
    pub async fn run(&self) -> Result<(), TaskError> {
        self.run_until(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
                Err(e) => {
                    error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await
                }
            }
        })
        .await
    }

    /// Run until `shutdown` resolves, the shutdown token is cancelled, or a
    /// task fails. Returns the first task failure, if any.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<(), TaskError>
    where
        F: Future<Output = ()>,
    {
        let ctx = JobContext::new();
        let mut running: JoinSet<TaskExit> = JoinSet::new();

        info!(
            service = %self.name,
            version = %self.version,
            "Starting {} task(s)",
            self.tasks.len()
        );
        for task in &self.tasks {
            let task = Arc::clone(task);
            let task_ctx = ctx.child();
            running.spawn(async move {
                let result = task.start(task_ctx).await;
                (task.name().to_string(), result)
            });
        }

        let mut first_error: Option<TaskError> = None;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }
                Some(joined) = running.join_next() => {
                    if let Some(err) = record_exit(joined) {
                        first_error = Some(err);
                        break;
                    }
                }
            }
        }

        self.stop_tasks().await;

        if !drain(&mut running, self.stop_timeout, &mut first_error).await {
            warn!(
                "{} task(s) still running after {:?}, cancelling their context",
                running.len(),
                self.stop_timeout
            );
            ctx.cancel();

            if !drain(&mut running, self.stop_timeout, &mut first_error).await {
                warn!("Aborting {} task(s) that ignored cancellation", running.len());
                running.abort_all();
                while running.join_next().await.is_some() {}
            }
        }
        ctx.cancel();

        info!(service = %self.name, "Host stopped");
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn stop_tasks(&self) {
        for task in self.tasks.iter().rev() {
            let stop_ctx = JobContext::new();
            match tokio::time::timeout(self.stop_timeout, task.stop(stop_ctx.clone())).await {
                Ok(Ok(())) => debug!("Stop requested for task {}", task.name()),
                Ok(Err(e)) => warn!("Failed to stop task {}: {}", task.name(), e),
                Err(_) => {
                    stop_ctx.cancel();
                    warn!(
                        "Stopping task {} timed out after {:?}",
                        task.name(),
                        self.stop_timeout
                    );
                }
            }
        }
    }
}

/// Log a task exit. Returns the error when the exit was a failure.
fn record_exit(joined: Result<TaskExit, JoinError>) -> Option<TaskError> {
    match joined {
        Ok((name, Ok(()))) => {
            info!("Task {} exited", name);
            None
        }
        Ok((name, Err(e))) if e.is_cancelled() => {
            info!("Task {} exited on cancellation", name);
            None
        }
        Ok((name, Err(e))) => {
            error!("Task {} failed: {}", name, e);
            Some(e)
        }
        Err(e) => {
            error!("Task panicked: {}", e);
            Some(TaskError::Failed(anyhow!("task panicked: {}", e)))
        }
    }
}

/// Await every task for at most `limit`. Returns false on timeout.
async fn drain(
    running: &mut JoinSet<TaskExit>,
    limit: Duration,
    first_error: &mut Option<TaskError>,
) -> bool {
    let waited = tokio::time::timeout(limit, async {
        while let Some(joined) = running.join_next().await {
            if let Some(err) = record_exit(joined) {
                if first_error.is_none() {
                    *first_error = Some(err);
                }
            }
        }
    })
    .await;
    waited.is_ok()
}
