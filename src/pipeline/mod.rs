// src/pipeline/mod.rs

pub mod metrics;
pub mod orchestrator;

pub use metrics::PipelineMetrics;
pub use orchestrator::{CycleOrchestrator, StopReason};
