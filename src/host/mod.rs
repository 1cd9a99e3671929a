//! Process host: runs background jobs and listeners under one lifecycle.

mod app;
mod metrics_server;
mod task;

pub use app::App;
pub use metrics_server::MetricsServer;
pub use task::{ManagedTask, TaskError};
