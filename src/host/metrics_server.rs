use super::task::{ManagedTask, TaskError};
use crate::background_jobs::JobContext;
use crate::metrics;
use anyhow::Context;
use async_trait::async_trait;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// HTTP listener exposing `/metrics` for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    local_addr: OnceLock<SocketAddr>,
}

impl MetricsServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            shutdown: CancellationToken::new(),
            local_addr: OnceLock::new(),
        }
    }

    /// Address actually bound, known once `start` has bound the listener.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }
}

#[async_trait]
impl ManagedTask for MetricsServer {
    fn name(&self) -> &str {
        "metrics_server"
    }

    async fn start(&self, ctx: JobContext) -> Result<(), TaskError> {
        let listener = TcpListener::bind(self.addr)
            .await
            .with_context(|| format!("Failed to bind metrics listener on {}", self.addr))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read metrics listener address")?;
        let _ = self.local_addr.set(local_addr);

        metrics::init_metrics();
        info!("Metrics available at http://{}/metrics", local_addr);

        let router = Router::new().route("/metrics", get(metrics_handler));
        let stop = self.shutdown.clone();
        let cancel = ctx.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = stop.cancelled() => {}
                    _ = cancel.cancelled() => {}
                }
            })
            .await
            .context("Metrics server failed")?;

        if ctx.is_cancelled() && !self.shutdown.is_cancelled() {
            info!("Metrics server stopped by context");
            return Err(TaskError::Cancelled);
        }
        info!("Metrics server stopped");
        Ok(())
    }

    async fn stop(&self, _ctx: JobContext) -> Result<(), TaskError> {
        self.shutdown.cancel();
        Ok(())
    }
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            error!("Failed to encode metrics: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stop_shuts_listener_down() {
        let server = Arc::new(MetricsServer::new("127.0.0.1:0".parse().unwrap()));
        let runner = Arc::clone(&server);
        let done = tokio::spawn(async move { runner.start(JobContext::new()).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(server.local_addr().is_some());

        server.stop(JobContext::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(2), done)
            .await
            .expect("metrics server did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_context_cancellation_reports_cancelled() {
        let server = Arc::new(MetricsServer::new("127.0.0.1:0".parse().unwrap()));
        let ctx = JobContext::new();
        let runner = Arc::clone(&server);
        let start_ctx = ctx.clone();
        let done = tokio::spawn(async move { runner.start(start_ctx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        ctx.cancel();

        let result = tokio::time::timeout(Duration::from_secs(2), done)
            .await
            .expect("metrics server did not stop")
            .unwrap();
        assert!(matches!(result, Err(TaskError::Cancelled)));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = occupied.local_addr().unwrap();

        let server = MetricsServer::new(addr);
        let err = server.start(JobContext::new()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to bind metrics listener"));
    }
}
