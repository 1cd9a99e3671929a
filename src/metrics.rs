use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all job host metrics
const PREFIX: &str = "jobs_host";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref JOB_EXECUTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_job_executions_total"), "Total recurring job executions"),
        &["job", "trigger", "status"]
    ).expect("Failed to create job_executions_total metric");

    pub static ref JOB_EXECUTION_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_job_execution_duration_seconds"),
            "Recurring job execution duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0, 600.0]),
        &["job"]
    ).expect("Failed to create job_execution_duration_seconds metric");

    pub static ref JOB_RUNNING: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            format!("{PREFIX}_job_running"),
            "Number of job executions currently in flight"
        ),
        &["job"]
    ).expect("Failed to create job_running metric");

    pub static ref CACHE_HEALTHY: Gauge = Gauge::new(
        format!("{PREFIX}_cache_healthy"),
        "Result of the last cache health probe (1 healthy, 0 unhealthy)"
    ).expect("Failed to create cache_healthy metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    // Registration errors only mean "already registered"
    let _ = REGISTRY.register(Box::new(JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(JOB_EXECUTION_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(JOB_RUNNING.clone()));
    let _ = REGISTRY.register(Box::new(CACHE_HEALTHY.clone()));

    tracing::debug!("Metrics registered");
}

/// Record a finished job execution.
pub fn record_job_execution(job: &str, trigger: &str, status: &str, duration: Duration) {
    JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job, trigger, status])
        .inc();

    JOB_EXECUTION_DURATION_SECONDS
        .with_label_values(&[job])
        .observe(duration.as_secs_f64());
}

pub fn job_execution_started(job: &str) {
    JOB_RUNNING.with_label_values(&[job]).inc();
}

pub fn job_execution_finished(job: &str) {
    JOB_RUNNING.with_label_values(&[job]).dec();
}

pub fn set_cache_healthy(healthy: bool) {
    CACHE_HEALTHY.set(if healthy { 1.0 } else { 0.0 });
}

/// Render the registry in the Prometheus text exposition format.
pub fn render() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let mut buffer = vec![];
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
