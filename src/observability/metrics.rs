//! # Metrics
//!
//! Prometheus metrics for monitoring the node agent.
//!
//! ## Metrics Exposed
//!
//! - `ark_restic_lifecycle_state` - Current lifecycle state (0 = Initializing ... 5 = Stopped)
//! - `ark_restic_credential_provisioning_total` - Provisioning attempts by provider and result
//! - `ark_restic_watch_events_total` - Watch events applied to a cache, by stream
//! - `ark_restic_watch_errors_total` - Transient watch failures, by stream
//! - `ark_restic_cache_objects` - Objects currently held in a cache, by stream
//! - `ark_restic_tasks_registered_total` - Background tasks registered with the completion barrier
//! - `ark_restic_tasks_running` - Background tasks that have not finished yet
//! - `ark_restic_reconciliations_total` - Reconciliations, by controller
//! - `ark_restic_reconciliation_errors_total` - Failed reconciliations, by controller
//! - `ark_restic_command_duration_seconds` - restic command durations, by command
//! - `ark_restic_command_errors_total` - Failed restic commands, by command

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static LIFECYCLE_STATE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ark_restic_lifecycle_state",
        "Current lifecycle state of the node agent",
    )
    .expect("Failed to create LIFECYCLE_STATE metric - this should never happen")
});

static CREDENTIAL_PROVISIONING_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_credential_provisioning_total",
            "Total number of credential provisioning attempts by provider and result",
        ),
        &["provider", "result"],
    )
    .expect("Failed to create CREDENTIAL_PROVISIONING_TOTAL metric - this should never happen")
});

static WATCH_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_watch_events_total",
            "Total number of watch events applied to a local cache",
        ),
        &["stream"],
    )
    .expect("Failed to create WATCH_EVENTS_TOTAL metric - this should never happen")
});

static WATCH_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_watch_errors_total",
            "Total number of transient watch errors",
        ),
        &["stream"],
    )
    .expect("Failed to create WATCH_ERRORS_TOTAL metric - this should never happen")
});

static CACHE_OBJECTS: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "ark_restic_cache_objects",
            "Current number of objects held in a local cache",
        ),
        &["stream"],
    )
    .expect("Failed to create CACHE_OBJECTS metric - this should never happen")
});

static TASKS_REGISTERED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "ark_restic_tasks_registered_total",
        "Total number of background tasks registered with the completion barrier",
    )
    .expect("Failed to create TASKS_REGISTERED_TOTAL metric - this should never happen")
});

static TASKS_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "ark_restic_tasks_running",
        "Current number of background tasks that have not finished",
    )
    .expect("Failed to create TASKS_RUNNING metric - this should never happen")
});

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_reconciliations_total",
            "Total number of reconciliations by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_reconciliation_errors_total",
            "Total number of reconciliation errors by controller",
        ),
        &["controller"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static COMMAND_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "ark_restic_command_duration_seconds",
            "Duration of restic commands in seconds",
        )
        .buckets(vec![1.0, 5.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
        &["command"],
    )
    .expect("Failed to create COMMAND_DURATION metric - this should never happen")
});

static COMMAND_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "ark_restic_command_errors_total",
            "Total number of failed restic commands",
        ),
        &["command"],
    )
    .expect("Failed to create COMMAND_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(LIFECYCLE_STATE.clone()))?;
    REGISTRY.register(Box::new(CREDENTIAL_PROVISIONING_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(WATCH_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_OBJECTS.clone()))?;
    REGISTRY.register(Box::new(TASKS_REGISTERED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TASKS_RUNNING.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_DURATION.clone()))?;
    REGISTRY.register(Box::new(COMMAND_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn set_lifecycle_state(state: i64) {
    LIFECYCLE_STATE.set(state);
}

pub fn record_credential_provisioning(provider: &str, result: &str) {
    CREDENTIAL_PROVISIONING_TOTAL
        .with_label_values(&[provider, result])
        .inc();
}

pub fn increment_watch_events(stream: &str) {
    WATCH_EVENTS_TOTAL.with_label_values(&[stream]).inc();
}

pub fn increment_watch_errors(stream: &str) {
    WATCH_ERRORS_TOTAL.with_label_values(&[stream]).inc();
}

pub fn set_cache_objects(stream: &str, count: usize) {
    let count = i64::try_from(count).unwrap_or(i64::MAX);
    CACHE_OBJECTS.with_label_values(&[stream]).set(count);
}

/// Record a task being registered and started
pub fn task_started() {
    TASKS_REGISTERED_TOTAL.inc();
    TASKS_RUNNING.inc();
}

pub fn task_finished() {
    TASKS_RUNNING.dec();
}

pub fn increment_reconciliations(controller: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[controller]).inc();
}

pub fn increment_reconciliation_errors(controller: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[controller])
        .inc();
}

pub fn observe_command_duration(command: &str, duration: f64) {
    COMMAND_DURATION
        .with_label_values(&[command])
        .observe(duration);
}

pub fn increment_command_errors(command: &str) {
    COMMAND_ERRORS_TOTAL.with_label_values(&[command]).inc();
}
