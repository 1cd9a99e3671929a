//! Cache health probe.
//!
//! Pings the cache on every tick and reports transitions between healthy and
//! unhealthy through logs and the `cache_healthy` gauge.

use crate::background_jobs::{JobContext, JobError, ManagedTask, RecurringJob, TaskError};
use crate::cache::CacheClient;
use crate::metrics;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct CacheHealthJob {
    job: RecurringJob,
    consecutive_failures: Arc<AtomicU32>,
}

impl CacheHealthJob {
    pub const NAME: &'static str = "cache_health";

    pub fn new(
        cache: Arc<dyn CacheClient>,
        interval: Duration,
        execute_immediately: bool,
    ) -> Result<Self, JobError> {
        let consecutive_failures = Arc::new(AtomicU32::new(0));
        let failures = Arc::clone(&consecutive_failures);

        let job = RecurringJob::builder(Self::NAME)
            .interval(interval)
            .execute_immediately(execute_immediately)
            .action(move |_ctx| probe(Arc::clone(&cache), Arc::clone(&failures)))
            .build()?;

        Ok(Self {
            job,
            consecutive_failures,
        })
    }

    /// Failed probes since the last successful one.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn job(&self) -> &RecurringJob {
        &self.job
    }
}

async fn probe(cache: Arc<dyn CacheClient>, failures: Arc<AtomicU32>) {
    match cache.ping().await {
        Ok(()) => {
            let previous = failures.swap(0, Ordering::SeqCst);
            if previous > 0 {
                info!("Cache recovered after {} failed probe(s)", previous);
            } else {
                debug!("Cache healthy");
            }
            metrics::set_cache_healthy(true);
        }
        Err(e) => {
            let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
            warn!("Cache health probe failed ({} in a row): {:#}", count, e);
            metrics::set_cache_healthy(false);
        }
    }
}

#[async_trait]
impl ManagedTask for CacheHealthJob {
    fn name(&self) -> &str {
        self.job.name()
    }

    async fn start(&self, ctx: JobContext) -> Result<(), TaskError> {
        ManagedTask::start(&self.job, ctx).await
    }

    async fn stop(&self, ctx: JobContext) -> Result<(), TaskError> {
        ManagedTask::stop(&self.job, ctx).await
    }
}
