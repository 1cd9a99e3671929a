use crate::background_jobs::{JobContext, JobError};
use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a managed task to the host.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The context passed to `start` was cancelled.
    #[error("task was cancelled")]
    Cancelled,

    #[error("task was already started")]
    AlreadyStarted,

    #[error("task failed: {0:#}")]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled)
    }
}

impl From<JobError> for TaskError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Cancelled => TaskError::Cancelled,
            JobError::AlreadyStarted => TaskError::AlreadyStarted,
            other => TaskError::Failed(anyhow::Error::new(other)),
        }
    }
}

/// A long-lived component the host runs and stops uniformly.
///
/// `start` runs until the task terminates. `stop` only requests termination
/// and must return without waiting for it; the host observes completion
/// through the `start` future.
#[async_trait]
pub trait ManagedTask: Send + Sync {
    /// Name used in host logs.
    fn name(&self) -> &str;

    async fn start(&self, ctx: JobContext) -> Result<(), TaskError>;

    async fn stop(&self, ctx: JobContext) -> Result<(), TaskError>;
}
