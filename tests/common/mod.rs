//! Common test infrastructure
//!
//! Spawns a fully wired host on an ephemeral metrics port and hands back what
//! tests need to drive and inspect it.

use recurring_jobs::cache::InMemoryCache;
use recurring_jobs::config::{AppConfig, CliConfig, FileConfig};
use recurring_jobs::host::{App, ManagedTask, MetricsServer, TaskError};
use recurring_jobs::JobRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct TestHost {
    pub cache: Arc<InMemoryCache>,
    pub metrics_server: Arc<MetricsServer>,
    pub shutdown: CancellationToken,
    pub handle: JoinHandle<Result<(), TaskError>>,
}

impl TestHost {
    /// Start a host configured from `toml` plus `extra` tasks.
    pub async fn spawn(toml: &str, extra: Vec<Arc<dyn ManagedTask>>) -> Self {
        let file = FileConfig::parse(toml).expect("invalid test config");
        let cli = CliConfig {
            stop_timeout_secs: 5,
            ..Default::default()
        };
        let config = AppConfig::resolve(&cli, Some(file)).expect("config should resolve");

        let cache = Arc::new(InMemoryCache::new());
        let jobs = JobRegistry::from_config(&config.jobs, cache.clone()).unwrap();
        let metrics_server = Arc::new(MetricsServer::new("127.0.0.1:0".parse().unwrap()));

        let mut tasks: Vec<Arc<dyn ManagedTask>> = vec![metrics_server.clone()];
        tasks.extend(jobs.servers());
        tasks.extend(extra);

        let app = App::new(config.service_name, config.service_version)
            .stop_timeout(config.stop_timeout)
            .with_tasks(tasks);
        let shutdown = app.shutdown_token();
        let handle = tokio::spawn(async move { app.run_until(std::future::pending()).await });

        let host = Self {
            cache,
            metrics_server,
            shutdown,
            handle,
        };
        host.wait_for_metrics_addr().await;
        host
    }

    async fn wait_for_metrics_addr(&self) {
        for _ in 0..100 {
            if self.metrics_server.local_addr().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("metrics server did not bind");
    }

    pub fn metrics_url(&self) -> String {
        let addr: SocketAddr = self.metrics_server.local_addr().unwrap();
        format!("http://{}/metrics", addr)
    }

    /// Trigger a graceful shutdown and wait for the host to return.
    pub async fn shutdown(self) -> Result<(), TaskError> {
        self.shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("host did not shut down in time")
            .expect("host task panicked")
    }
}
