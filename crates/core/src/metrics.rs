//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job ledger (submissions, terminal outcomes, durations)
//! - Version allocation (retries, contention)
//! - Indexing and prediction writes

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Jobs
// =============================================================================

/// Jobs submitted by kind.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("lexiclass_jobs_submitted_total", "Total jobs submitted"),
        &["kind"], // "index", "train", "predict"
    )
    .unwrap()
});

/// Jobs that reached a terminal state through the executor.
pub static JOB_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lexiclass_job_outcomes_total",
            "Terminal job outcomes reported by executors",
        ),
        &["kind", "outcome"], // outcome: "success", "failure", "cancelled"
    )
    .unwrap()
});

/// Wall time from claim to completion.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "lexiclass_job_duration_seconds",
            "Duration of job execution from claim to completion",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 1800.0]),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// Versions
// =============================================================================

pub static VERSION_ALLOCATION_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "lexiclass_version_allocation_retries_total",
        "Version allocation attempts that hit contention and were retried",
    )
    .unwrap()
});

pub static VERSION_ALLOCATION_CONTENDED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "lexiclass_version_allocation_contended_total",
        "Version allocations that gave up after exhausting retries",
    )
    .unwrap()
});

// =============================================================================
// Indexing & Predictions
// =============================================================================

/// Index outcomes recorded, by result.
pub static INDEX_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "lexiclass_index_outcomes_total",
            "Per-document index outcomes recorded",
        ),
        &["result"], // "applied", "unchanged", "conflicting", "superseded"
    )
    .unwrap()
});

pub static PREDICTION_LOG_LINES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "lexiclass_prediction_log_lines_total",
        "Prediction lines appended to versioned logs",
    )
    .unwrap()
});

pub static PREDICTION_UPSERT_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "lexiclass_prediction_upsert_failures_total",
        "Logged predictions that could not be written to the latest view",
    )
    .unwrap()
});

/// Register all core metrics with the given registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Jobs
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOB_OUTCOMES.clone()),
        Box::new(JOB_DURATION.clone()),
        // Versions
        Box::new(VERSION_ALLOCATION_RETRIES.clone()),
        Box::new(VERSION_ALLOCATION_CONTENDED.clone()),
        // Indexing & predictions
        Box::new(INDEX_OUTCOMES.clone()),
        Box::new(PREDICTION_LOG_LINES.clone()),
        Box::new(PREDICTION_UPSERT_FAILURES.clone()),
    ]
}
