//! Cache warmer background job.
//!
//! Writes a fixed set of seed entries into the cache so that the first
//! requests after a deploy or a cache flush hit warm keys.

use crate::background_jobs::{JobContext, JobError, ManagedTask, RecurringJob, TaskError};
use crate::cache::CacheClient;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Key holding the RFC 3339 timestamp of the last successful warm-up.
pub const LAST_RUN_KEY: &str = "cache_warmer:last_run";

pub struct CacheWarmerJob {
    job: RecurringJob,
}

impl CacheWarmerJob {
    pub const NAME: &'static str = "cache_warmer";

    /// Entries are written with a TTL of twice the interval so they survive
    /// until the next run even when it is late.
    pub fn new(
        cache: Arc<dyn CacheClient>,
        seed: BTreeMap<String, String>,
        interval: Duration,
        execute_immediately: bool,
    ) -> Result<Self, JobError> {
        let seed = Arc::new(seed);
        let ttl = interval.saturating_mul(2);

        let job = RecurringJob::builder(Self::NAME)
            .interval(interval)
            .execute_immediately(execute_immediately)
            .action(move |ctx| warm(Arc::clone(&cache), Arc::clone(&seed), ttl, ctx))
            .build()?;

        Ok(Self { job })
    }

    pub fn job(&self) -> &RecurringJob {
        &self.job
    }
}

async fn warm(
    cache: Arc<dyn CacheClient>,
    seed: Arc<BTreeMap<String, String>>,
    ttl: Duration,
    ctx: JobContext,
) {
    if let Err(e) = cache.ping().await {
        warn!("Cache unavailable, skipping warm-up: {:#}", e);
        return;
    }

    let mut written = 0usize;
    for (key, value) in seed.iter() {
        if ctx.is_cancelled() {
            info!("Cache warm-up interrupted after {} entries", written);
            return;
        }
        match cache.set(key, value.clone(), Some(ttl)).await {
            Ok(()) => written += 1,
            Err(e) => warn!("Failed to warm cache key {}: {:#}", key, e),
        }
    }

    let now = chrono::Utc::now().to_rfc3339();
    if let Err(e) = cache.set(LAST_RUN_KEY, now, None).await {
        warn!("Failed to record cache warm-up time: {:#}", e);
    }

    info!("Warmed {}/{} cache entries", written, seed.len());
}

#[async_trait]
impl ManagedTask for CacheWarmerJob {
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
