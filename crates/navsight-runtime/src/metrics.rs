//! Pipeline counters and rolling latency averages.
//!
//! Every worker records into one shared [`PipelineMetrics`]; the telemetry
//! worker and [`Navigator`][crate::navigator::Navigator] read it back as
//! [`PipelineCounters`] / [`LatencyStats`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use navsight_types::{LatencyStats, NavState, PipelineCounters};
use serde::Serialize;

/// Number of samples averaged per latency series.
pub const LATENCY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Detection,
    Fusion,
    Decision,
}

#[derive(Debug, Default)]
struct Window(VecDeque<Duration>);

impl Window {
    fn push(&mut self, d: Duration) {
        if self.0.len() == LATENCY_WINDOW {
            self.0.pop_front();
        }
        self.0.push_back(d);
    }

    fn mean_ms(&self) -> f64 {
        if self.0.is_empty() {
            return 0.0;
        }
        let total: Duration = self.0.iter().sum();
        total.as_secs_f64() * 1000.0 / self.0.len() as f64
    }
}

#[derive(Debug, Default)]
struct Latencies {
    detection: Window,
    fusion: Window,
    decision: Window,
}

#[derive(Debug)]
pub struct PipelineMetrics {
    started_at: Mutex<Instant>,
    batches_processed: AtomicU64,
    detections: AtomicU64,
    ranging_readings: AtomicU64,
    rejected_inputs: AtomicU64,
    warnings_issued: AtomicU64,
    suppressed_alerts: AtomicU64,
    dropped_detection_batches: AtomicU64,
    dropped_ranging_readings: AtomicU64,
    dropped_alerts: AtomicU64,
    worker_faults: AtomicU64,
    latencies: Mutex<Latencies>,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(Instant::now()),
            batches_processed: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            ranging_readings: AtomicU64::new(0),
            rejected_inputs: AtomicU64::new(0),
            warnings_issued: AtomicU64::new(0),
            suppressed_alerts: AtomicU64::new(0),
            dropped_detection_batches: AtomicU64::new(0),
            dropped_ranging_readings: AtomicU64::new(0),
            dropped_alerts: AtomicU64::new(0),
            worker_faults: AtomicU64::new(0),
            latencies: Mutex::new(Latencies::default()),
        }
    }

    pub fn record_batch(&self, detections: usize) {
        bump(&self.batches_processed);
        self.detections.fetch_add(detections as u64, Ordering::Relaxed);
    }

    pub fn record_ranging(&self) {
        bump(&self.ranging_readings);
    }

    pub fn record_rejected(&self) {
        bump(&self.rejected_inputs);
    }

    pub fn record_warning(&self) {
        bump(&self.warnings_issued);
    }

    pub fn record_suppressed(&self) {
        bump(&self.suppressed_alerts);
    }

    pub fn record_dropped_detection_batch(&self) {
        bump(&self.dropped_detection_batches);
    }

    pub fn record_dropped_ranging(&self) {
        bump(&self.dropped_ranging_readings);
    }

    pub fn record_dropped_alert(&self) {
        bump(&self.dropped_alerts);
    }

    pub fn record_fault(&self) {
        bump(&self.worker_faults);
    }

    pub fn record_latency(&self, stage: Stage, elapsed: Duration) {
        let mut l = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        match stage {
            Stage::Detection => l.detection.push(elapsed),
            Stage::Fusion => l.fusion.push(elapsed),
            Stage::Decision => l.decision.push(elapsed),
        }
    }

    pub fn counters(&self) -> PipelineCounters {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        PipelineCounters {
            batches_processed: get(&self.batches_processed),
            detections: get(&self.detections),
            ranging_readings: get(&self.ranging_readings),
            rejected_inputs: get(&self.rejected_inputs),
            warnings_issued: get(&self.warnings_issued),
            suppressed_alerts: get(&self.suppressed_alerts),
            dropped_detection_batches: get(&self.dropped_detection_batches),
            dropped_ranging_readings: get(&self.dropped_ranging_readings),
            dropped_alerts: get(&self.dropped_alerts),
            worker_faults: get(&self.worker_faults),
        }
    }

    /// Mean of the last [`LATENCY_WINDOW`] samples per stage, in ms.
    pub fn latency(&self) -> LatencyStats {
        let l = self.latencies.lock().unwrap_or_else(PoisonError::into_inner);
        LatencyStats {
            detection_ms: l.detection.mean_ms(),
            fusion_ms: l.fusion.mean_ms(),
            decision_ms: l.decision.mean_ms(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    /// Zero every counter and latency series and restart the uptime clock.
    pub fn reset(&self) {
        for c in [
            &self.batches_processed,
            &self.detections,
            &self.ranging_readings,
            &self.rejected_inputs,
            &self.warnings_issued,
            &self.suppressed_alerts,
            &self.dropped_detection_batches,
            &self.dropped_ranging_readings,
            &self.dropped_alerts,
            &self.worker_faults,
        ] {
            c.store(0, Ordering::Relaxed);
        }
        *self.latencies.lock().unwrap_or_else(PoisonError::into_inner) = Latencies::default();
        *self.started_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn performance(&self, state: NavState) -> PerformanceSummary {
        let uptime_s = self.uptime().as_secs_f64();
        let c = self.counters();
        let per_second = |n: u64| if uptime_s > 0.0 { n as f64 / uptime_s } else { 0.0 };
        PerformanceSummary {
            uptime_s,
            batches_per_second: per_second(c.batches_processed),
            detections_per_batch: if c.batches_processed > 0 {
                c.detections as f64 / c.batches_processed as f64
            } else {
                0.0
            },
            warnings_per_minute: per_second(c.warnings_issued) * 60.0,
            latency: self.latency(),
            state,
        }
    }
}

/// Throughput summary derived from the counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub uptime_s: f64,
    pub batches_per_second: f64,
    pub detections_per_batch: f64,
    pub warnings_per_minute: f64,
    pub latency: LatencyStats,
    pub state: NavState,
}
