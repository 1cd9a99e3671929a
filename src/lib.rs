//! Recurring background jobs for long-lived service processes.
//!
//! This library exposes the internal modules for the `jobs-host` binary and
//! for integration tests.

pub mod background_jobs;
pub mod cache;
pub mod config;
pub mod host;
pub mod metrics;

// Re-export commonly used types for convenience
pub use background_jobs::{JobContext, JobError, JobRegistry, RecurringJob};
pub use host::{App, ManagedTask, MetricsServer, TaskError};
