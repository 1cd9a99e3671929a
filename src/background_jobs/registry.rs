use super::job::JobError;
use super::jobs::{CacheHealthJob, CacheWarmerJob};
use crate::cache::CacheClient;
use crate::config::JobsSettings;
use crate::host::ManagedTask;
use std::sync::Arc;
use tracing::info;

/// Ordered collection of background jobs handed to the host.
#[derive(Default, Clone)]
pub struct JobRegistry {
    jobs: Vec<Arc<dyn ManagedTask>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry of every enabled job in `settings`.
    pub fn from_config(
        settings: &JobsSettings,
        cache: Arc<dyn CacheClient>,
    ) -> Result<Self, JobError> {
        let mut registry = Self::new();

        let warmer = &settings.cache_warmer;
        if warmer.enabled {
            registry.register(Arc::new(CacheWarmerJob::new(
                Arc::clone(&cache),
                settings.cache_warmer_seed.clone(),
                warmer.interval,
                warmer.execute_immediately,
            )?));
        }

        let health = &settings.cache_health;
        if health.enabled {
            registry.register(Arc::new(CacheHealthJob::new(
                Arc::clone(&cache),
                health.interval,
                health.execute_immediately,
            )?));
        }

        Ok(registry)
    }

    pub fn register(&mut self, job: Arc<dyn ManagedTask>) -> &mut Self {
        info!("Registering job: {}", job.name());
        self.jobs.push(job);
        self
    }

    pub fn with_job(mut self, job: Arc<dyn ManagedTask>) -> Self {
        self.register(job);
        self
    }

    /// All jobs, in registration order, for the host to run.
    pub fn servers(&self) -> Vec<Arc<dyn ManagedTask>> {
        self.jobs.clone()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::RecurringJob;
    use crate::cache::InMemoryCache;
    use std::time::Duration;

    fn noop_job(name: &str) -> Arc<dyn ManagedTask> {
        Arc::new(
            RecurringJob::new(name.to_string(), Duration::from_secs(60), false, |_ctx| async {})
                .unwrap(),
        )
    }

    #[test]
    fn test_empty_registry() {
        let registry = JobRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.servers().is_empty());
    }

    #[test]
    fn test_servers_preserve_registration_order() {
        let mut registry = JobRegistry::new();
        registry.register(noop_job("job_b")).register(noop_job("job_a"));
        let registry = registry.with_job(noop_job("job_c"));

        let names: Vec<String> = registry
            .servers()
            .iter()
            .map(|j| j.name().to_string())
            .collect();
        assert_eq!(names, vec!["job_b", "job_a", "job_c"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_from_config_registers_enabled_jobs() {
        let cache = Arc::new(InMemoryCache::new());
        let settings = JobsSettings::default();

        let registry = JobRegistry::from_config(&settings, cache).unwrap();
        let names: Vec<String> = registry
            .servers()
            .iter()
            .map(|j| j.name().to_string())
            .collect();
        assert_eq!(names, vec!["cache_warmer", "cache_health"]);
    }

    #[test]
    fn test_from_config_skips_disabled_jobs() {
        let cache = Arc::new(InMemoryCache::new());
        let mut settings = JobsSettings::default();
        settings.cache_warmer.enabled = false;

        let registry = JobRegistry::from_config(&settings, cache).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.servers()[0].name(), "cache_health");
    }

    #[test]
    fn test_from_config_rejects_zero_interval() {
        let cache = Arc::new(InMemoryCache::new());
        let mut settings = JobsSettings::default();
        settings.cache_health.interval = Duration::ZERO;

        let result = JobRegistry::from_config(&settings, cache);
        assert!(matches!(result, Err(JobError::InvalidConfig(_))));
    }
}
