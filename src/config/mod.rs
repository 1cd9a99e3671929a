mod file_config;

pub use file_config::{CacheWarmerConfig, FileConfig, JobConfig, JobsConfig};

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// Values from the TOML file override these.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub service_name: String,
    pub service_version: String,
    pub metrics_port: u16,
    pub stop_timeout_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            service_name: "jobs-host".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_port: 9091,
            stop_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub service_version: String,
    /// `None` disables the metrics listener.
    pub metrics_port: Option<u16>,
    pub stop_timeout: Duration,
    pub jobs: JobsSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub execute_immediately: bool,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub cache_warmer: JobSettings,
    pub cache_warmer_seed: BTreeMap<String, String>,
    pub cache_health: JobSettings,
}

impl Default for JobsSettings {
    fn default() -> Self {
        Self {
            // Warm-up is most useful right after boot
            cache_warmer: JobSettings {
                enabled: true,
                interval: Duration::from_secs(5 * 60),
                execute_immediately: true,
            },
            cache_warmer_seed: BTreeMap::new(),
            cache_health: JobSettings {
                enabled: true,
                interval: Duration::from_secs(30),
                execute_immediately: false,
            },
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let service_name = file
            .service_name
            .unwrap_or_else(|| cli.service_name.clone());
        if service_name.trim().is_empty() {
            bail!("service_name must not be empty");
        }
        let service_version = file
            .service_version
            .unwrap_or_else(|| cli.service_version.clone());

        let metrics_port = match file.metrics_port.unwrap_or(cli.metrics_port) {
            0 => None,
            port => Some(port),
        };

        let stop_timeout_secs = file.stop_timeout_secs.unwrap_or(cli.stop_timeout_secs);
        if stop_timeout_secs == 0 {
            bail!("stop_timeout_secs must be greater than zero");
        }

        let jobs_file = file.jobs.unwrap_or_default();
        let defaults = JobsSettings::default();

        let warmer_file = jobs_file.cache_warmer.unwrap_or_default();
        let cache_warmer = resolve_job("cache_warmer", warmer_file.job(), &defaults.cache_warmer)?;
        let cache_warmer_seed = warmer_file.seed.unwrap_or(defaults.cache_warmer_seed);

        let cache_health = resolve_job(
            "cache_health",
            jobs_file.cache_health.unwrap_or_default(),
            &defaults.cache_health,
        )?;

        Ok(Self {
            service_name,
            service_version,
            metrics_port,
            stop_timeout: Duration::from_secs(stop_timeout_secs),
            jobs: JobsSettings {
                cache_warmer,
                cache_warmer_seed,
                cache_health,
            },
        })
    }
}

fn resolve_job(name: &str, file: JobConfig, defaults: &JobSettings) -> Result<JobSettings> {
    let interval = match file.interval_secs {
        Some(0) => bail!("jobs.{}.interval_secs must be greater than zero", name),
        Some(secs) => Duration::from_secs(secs),
        None => defaults.interval,
    };

    Ok(JobSettings {
        enabled: file.enabled.unwrap_or(defaults.enabled),
        interval,
        execute_immediately: file
            .execute_immediately
            .unwrap_or(defaults.execute_immediately),
    })
}
