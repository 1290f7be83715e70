use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Run-wide counters shared by workers and the writer.
pub struct Metrics {
    // Units
    units_dispatched: AtomicUsize,
    records_written: AtomicUsize,
    degraded_records: AtomicUsize,
    retries_exhausted: AtomicUsize,

    // Inference calls
    inference_attempts: AtomicUsize,
    transport_errors: AtomicUsize,
    empty_responses: AtomicUsize,
    total_inference_time_us: AtomicU64,

    // Graph output
    entities_emitted: AtomicUsize,
    relations_emitted: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            units_dispatched: AtomicUsize::new(0),
            records_written: AtomicUsize::new(0),
            degraded_records: AtomicUsize::new(0),
            retries_exhausted: AtomicUsize::new(0),
            inference_attempts: AtomicUsize::new(0),
            transport_errors: AtomicUsize::new(0),
            empty_responses: AtomicUsize::new(0),
            total_inference_time_us: AtomicU64::new(0),
            entities_emitted: AtomicUsize::new(0),
            relations_emitted: AtomicUsize::new(0),
        })
    }

    pub fn record_dispatch(&self) {
        self.units_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_attempt(&self, duration: Duration, outcome: AttemptOutcome) {
        self.inference_attempts.fetch_add(1, Ordering::Relaxed);
        self.total_inference_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        match outcome {
            AttemptOutcome::Content => {}
            AttemptOutcome::Empty => {
                self.empty_responses.fetch_add(1, Ordering::Relaxed);
            }
            AttemptOutcome::TransportError => {
                self.transport_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn record_exhausted(&self) {
        self.retries_exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_written(&self, entities: usize, relations: usize, degraded: bool) {
        self.records_written.fetch_add(1, Ordering::Relaxed);
        self.entities_emitted.fetch_add(entities, Ordering::Relaxed);
        self.relations_emitted.fetch_add(relations, Ordering::Relaxed);
        if degraded {
            self.degraded_records.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn records_written(&self) -> usize {
        self.records_written.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let attempts = self.inference_attempts.load(Ordering::Relaxed);
        let total_us = self.total_inference_time_us.load(Ordering::Relaxed) as f64;

        MetricsSnapshot {
            units_dispatched: self.units_dispatched.load(Ordering::Relaxed),
            records_written: self.records_written.load(Ordering::Relaxed),
            degraded_records: self.degraded_records.load(Ordering::Relaxed),
            retries_exhausted: self.retries_exhausted.load(Ordering::Relaxed),
            inference_attempts: attempts,
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            empty_responses: self.empty_responses.load(Ordering::Relaxed),
            avg_inference_time_ms: if attempts > 0 {
                total_us / attempts as f64 / 1000.0 // Convert to ms
            } else {
                0.0
            },
            entities_emitted: self.entities_emitted.load(Ordering::Relaxed),
            relations_emitted: self.relations_emitted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttemptOutcome {
    Content,
    Empty,
    TransportError,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub units_dispatched: usize,
    pub records_written: usize,
    pub degraded_records: usize,
    pub retries_exhausted: usize,
    pub inference_attempts: usize,
    pub transport_errors: usize,
    pub empty_responses: usize,
    pub avg_inference_time_ms: f64,
    pub entities_emitted: usize,
    pub relations_emitted: usize,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
