// src/pipeline/metrics.rs
//
// Loop observability. Counters are shared atomics so extractor tasks and the
// orchestrator can record without locking; a summary is logged at shutdown.

use crate::types::ExtractorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub cycles: Arc<AtomicU64>,
    pub aborted_cycles: Arc<AtomicU64>,
    pub resets: Arc<AtomicU64>,
    pub circles_found: Arc<AtomicU64>,
    pub corners_found: Arc<AtomicU64>,
    pub points_tracked: Arc<AtomicU64>,
    pub points_lost: Arc<AtomicU64>,
    pub circles_time_us: Arc<AtomicU64>,
    pub corners_time_us: Arc<AtomicU64>,
    pub flow_time_us: Arc<AtomicU64>,
    pub cycle_time_us: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            cycles: Arc::new(AtomicU64::new(0)),
            aborted_cycles: Arc::new(AtomicU64::new(0)),
            resets: Arc::new(AtomicU64::new(0)),
            circles_found: Arc::new(AtomicU64::new(0)),
            corners_found: Arc::new(AtomicU64::new(0)),
            points_tracked: Arc::new(AtomicU64::new(0)),
            points_lost: Arc::new(AtomicU64::new(0)),
            circles_time_us: Arc::new(AtomicU64::new(0)),
            corners_time_us: Arc::new(AtomicU64::new(0)),
            flow_time_us: Arc::new(AtomicU64::new(0)),
            cycle_time_us: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, amount: u64) {
        counter.fetch_add(amount, Ordering::Relaxed);
    }

    pub fn set_timing(&self, counter: &AtomicU64, duration: Duration) {
        counter.store(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Last-run timing slot for one extractor
    pub fn extractor_timing(&self, kind: ExtractorKind) -> &AtomicU64 {
        match kind {
            ExtractorKind::Circles => &self.circles_time_us,
            ExtractorKind::Corners => &self.corners_time_us,
            ExtractorKind::Flow => &self.flow_time_us,
        }
    }

    pub fn cycles_per_sec(&self) -> f64 {
        let cycles = self.cycles.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            cycles as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            cycles: self.cycles.load(Ordering::Relaxed),
            aborted_cycles: self.aborted_cycles.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            cycles_per_sec: self.cycles_per_sec(),
            circles_found: self.circles_found.load(Ordering::Relaxed),
            corners_found: self.corners_found.load(Ordering::Relaxed),
            points_tracked: self.points_tracked.load(Ordering::Relaxed),
            points_lost: self.points_lost.load(Ordering::Relaxed),
            last_circles_us: self.circles_time_us.load(Ordering::Relaxed),
            last_corners_us: self.corners_time_us.load(Ordering::Relaxed),
            last_flow_us: self.flow_time_us.load(Ordering::Relaxed),
            last_cycle_us: self.cycle_time_us.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub cycles: u64,
    pub aborted_cycles: u64,
    pub resets: u64,
    pub cycles_per_sec: f64,
    pub circles_found: u64,
    pub corners_found: u64,
    pub points_tracked: u64,
    pub points_lost: u64,
    pub last_circles_us: u64,
    pub last_corners_us: u64,
    pub last_flow_us: u64,
    pub last_cycle_us: u64,
    pub elapsed_secs: f64,
}
