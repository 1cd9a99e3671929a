use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub service_name: Option<String>,
    pub service_version: Option<String>,
    pub metrics_port: Option<u16>,
    pub stop_timeout_secs: Option<u64>,

    // Per-job configs
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub cache_warmer: Option<CacheWarmerConfig>,
    pub cache_health: Option<JobConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub execute_immediately: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct CacheWarmerConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub execute_immediately: Option<bool>,
    /// Entries written on every warm-up, key to value.
    pub seed: Option<BTreeMap<String, String>>,
}

impl CacheWarmerConfig {
    pub fn job(&self) -> JobConfig {
        JobConfig {
            enabled: self.enabled,
            interval_secs: self.interval_secs,
            execute_immediately: self.execute_immediately,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
