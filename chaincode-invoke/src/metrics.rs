//! Prometheus metrics for chaincode invocation
//!
//! # Metrics
//!
//! - `invoke_attempts_total` - Submission attempts started
//! - `invoke_retries_total` - Attempts restarted after an MVCC read conflict
//! - `invoke_outcomes_total` - Final outcomes by code (`success` or error code)
//! - `invoke_duration_seconds` - End-to-end invocation latency
//! - `invoke_event_wait_seconds` - Time from event registration to join

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Metrics collector
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Attempts started
    pub attempts_total: IntCounter,

    /// Conflict-triggered retries
    pub retries_total: IntCounter,

    /// Final outcomes by code
    pub outcomes_total: IntCounterVec,

    /// End-to-end invocation latency
    pub invoke_duration: Histogram,

    /// Commit event wait latency
    pub event_wait_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl Metrics {
    /// Create new metrics collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let attempts_total =
            IntCounter::new("invoke_attempts_total", "Submission attempts started")?;
        registry.register(Box::new(attempts_total.clone()))?;

        let retries_total = IntCounter::new(
            "invoke_retries_total",
            "Attempts restarted after an MVCC read conflict",
        )?;
        registry.register(Box::new(retries_total.clone()))?;

        let outcomes_total = IntCounterVec::new(
            Opts::new("invoke_outcomes_total", "Final invocation outcomes"),
            &["outcome"],
        )?;
        registry.register(Box::new(outcomes_total.clone()))?;

        let invoke_duration = Histogram::with_opts(
            HistogramOpts::new("invoke_duration_seconds", "End-to-end invocation latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        )?;
        registry.register(Box::new(invoke_duration.clone()))?;

        let event_wait_duration = Histogram::with_opts(
            HistogramOpts::new(
                "invoke_event_wait_seconds",
                "Time from commit event registration to join",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )?;
        registry.register(Box::new(event_wait_duration.clone()))?;

        Ok(Self {
            attempts_total,
            retries_total,
            outcomes_total,
            invoke_duration,
            event_wait_duration,
            registry,
        })
    }

    /// Record attempt start
    pub fn record_attempt(&self) {
        self.attempts_total.inc();
    }

    /// Record conflict-triggered retry
    pub fn record_retry(&self) {
        self.retries_total.inc();
    }

    /// Record final outcome
    pub fn record_outcome(&self, outcome: &str, elapsed: Duration) {
        self.outcomes_total.with_label_values(&[outcome]).inc();
        self.invoke_duration.observe(elapsed.as_secs_f64());
    }

    /// Record commit event wait
    pub fn record_event_wait(&self, elapsed: Duration) {
        self.event_wait_duration.observe(elapsed.as_secs_f64());
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
