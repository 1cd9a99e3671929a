use anyhow::{Context, Result};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use recurring_jobs::background_jobs::JobRegistry;
use recurring_jobs::cache::{CacheClient, InMemoryCache};
use recurring_jobs::config::{AppConfig, CliConfig, FileConfig};
use recurring_jobs::host::{App, ManagedTask, MetricsServer};
use recurring_jobs::metrics;

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, env = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Service name reported in logs.
    #[clap(long, env = "SERVICE_NAME", default_value = "jobs-host")]
    pub service_name: String,

    /// Service version reported in logs.
    #[clap(long, env = "SERVICE_VERSION", default_value = env!("CARGO_PKG_VERSION"))]
    pub service_version: String,

    /// The port for the metrics server (Prometheus scraping). 0 disables it.
    #[clap(long, default_value_t = 9091)]
    pub metrics_port: u16,

    /// Seconds to wait for tasks to finish after a stop request.
    #[clap(long, default_value_t = 30)]
    pub stop_timeout_secs: u64,
}

impl CliArgs {
    fn to_cli_config(&self) -> CliConfig {
        CliConfig {
            service_name: self.service_name.clone(),
            service_version: self.service_version.clone(),
            metrics_port: self.metrics_port,
            stop_timeout_secs: self.stop_timeout_secs,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let app_config = AppConfig::resolve(&cli_args.to_cli_config(), file_config)?;

    metrics::init_metrics();

    // No external cache is wired in yet, jobs run against the in-process one
    let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCache::new());
    let jobs = JobRegistry::from_config(&app_config.jobs, cache)
        .context("Failed to build background jobs")?;
    info!("Job registry initialized with {} job(s)", jobs.len());

    let mut tasks: Vec<Arc<dyn ManagedTask>> = Vec::new();
    if let Some(port) = app_config.metrics_port {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        tasks.push(Arc::new(MetricsServer::new(addr)));
    }
    tasks.extend(jobs.servers());

    let app = App::new(&app_config.service_name, &app_config.service_version)
        .stop_timeout(app_config.stop_timeout)
        .with_tasks(tasks);

    app.run().await.context("Host exited with error")?;
    Ok(())
}
