mod common;

use common::TestHost;
use recurring_jobs::background_jobs::jobs::cache_warmer::LAST_RUN_KEY;
use recurring_jobs::cache::CacheClient;
use recurring_jobs::host::ManagedTask;
use recurring_jobs::RecurringJob;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WARM_CONFIG: &str = r#"
[jobs.cache_warmer]
interval_secs = 3600
execute_immediately = true

[jobs.cache_warmer.seed]
"greeter:default" = "hello"

[jobs.cache_health]
interval_secs = 3600
"#;

#[tokio::test]
async fn test_host_runs_immediate_warm_up() {
    let host = TestHost::spawn(WARM_CONFIG, vec![]).await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(
        host.cache.get("greeter:default").await.unwrap(),
        Some("hello".to_string())
    );
    assert!(host.cache.get(LAST_RUN_KEY).await.unwrap().is_some());

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint_reports_job_executions() {
    let host = TestHost::spawn(WARM_CONFIG, vec![]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = reqwest::get(host.metrics_url()).await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body = response.text().await.unwrap();
    assert!(body.contains("jobs_host_job_executions_total"));
    assert!(body.contains("job=\"cache_warmer\""));
    assert!(body.contains("trigger=\"immediate\""));

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_execution() {
    let started = Arc::new(AtomicBool::new(false));
    let finished = Arc::new(AtomicBool::new(false));

    let slow = {
        let started = Arc::clone(&started);
        let finished = Arc::clone(&finished);
        RecurringJob::new("slow_sweep", Duration::from_secs(3600), true, move |_ctx| {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            async move {
                started.store(true, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(300)).await;
                finished.store(true, Ordering::SeqCst);
            }
        })
        .unwrap()
    };

    let host = TestHost::spawn("", vec![Arc::new(slow) as Arc<dyn ManagedTask>]).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(started.load(Ordering::SeqCst));
    assert!(!finished.load(Ordering::SeqCst));

    host.shutdown().await.unwrap();
    assert!(
        finished.load(Ordering::SeqCst),
        "host returned before the in-flight execution completed"
    );
}

#[tokio::test]
async fn test_disabled_jobs_do_not_run() {
    let host = TestHost::spawn(
        r#"
        [jobs.cache_warmer]
        enabled = false
        execute_immediately = true

        [jobs.cache_warmer.seed]
        "greeter:default" = "hello"
        "#,
        vec![],
    )
    .await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(host.cache.get(LAST_RUN_KEY).await.unwrap().is_none());

    host.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_periodic_job_ticks_under_host() {
    let count = Arc::new(AtomicUsize::new(0));
    let job = {
        let count = Arc::clone(&count);
        RecurringJob::new("ticker", Duration::from_millis(25), false, move |_ctx| {
            let count = Arc::clone(&count);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap()
    };

    let host = TestHost::spawn("", vec![Arc::new(job) as Arc<dyn ManagedTask>]).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    host.shutdown().await.unwrap();

    assert!(count.load(Ordering::SeqCst) >= 3);
}
