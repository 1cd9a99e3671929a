//! Recurring background jobs.
//!
//! A [`RecurringJob`] runs an action at a fixed interval and plugs into the
//! host as a [`ManagedTask`]. Concrete jobs live in [`jobs`] and are collected
//! by the [`JobRegistry`].

mod context;
mod job;
pub mod jobs;
mod registry;

pub use context::JobContext;
pub use job::{JobAction, JobError, RecurringJob, RecurringJobBuilder};
pub use registry::JobRegistry;

pub use crate::host::{ManagedTask, TaskError};
