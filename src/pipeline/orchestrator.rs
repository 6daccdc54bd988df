// src/pipeline/orchestrator.rs
//
// Drives the capture loop. Every cycle fans the current frame out to the
// three extractors on the blocking pool, waits for all of them, and only then
// applies their results:
//
//   acquire ─┬─→ circles ─┐
//            ├─→ corners ─┼─→ join ─→ render ─→ display
//            └─→ flow ────┘     └──→ fold into TrackingState
//
// Results are matched back by ExtractorKind, so the order tasks are launched
// or finish in has no effect on the outcome.

use super::PipelineMetrics;
use crate::display::Display;
use crate::error::ExtractorError;
use crate::extractors::{CircleFinder, CornerFinder, FlowResult, FlowTracker};
use crate::render;
use crate::tracking::TrackingState;
use crate::types::{Circle, Config, ExtractorKind, TrackingConfig};
use crate::video_source::FrameSource;
use anyhow::{anyhow, bail, Context, Result};
use opencv::{
    core::{KeyPoint, Mat, Vector},
    prelude::*,
};
use std::mem;
use std::time::{Duration, Instant};
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// No frame could be read at bootstrap
    CameraUnavailable,
    EndOfStream,
    StopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Bootstrapped,
    Running,
    Terminated(StopReason),
}

/// Frames produced by one fully joined cycle
pub struct CycleOutput {
    pub annotated: Mat,
    pub flow_view: Mat,
    pub circles: usize,
    pub corners: usize,
    pub tracked: usize,
    pub lost: usize,
    /// Tracking was re-bootstrapped at the end of this cycle
    pub reset: bool,
}

pub enum CycleOutcome {
    Rendered(CycleOutput),
    /// At least one extractor failed; nothing was rendered this cycle
    Aborted(ExtractorError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    pub cycles: u64,
}

enum Extracted {
    Circles(Vec<Circle>),
    Corners(Vector<KeyPoint>),
    Flow(FlowResult),
}

type TaskHandle = JoinHandle<Result<Extracted, ExtractorError>>;

/// Per-task results in launch order, or the timeout that cut the join short
type Joined = Result<Vec<Result<Extracted, ExtractorError>>, ExtractorError>;

pub struct CycleOrchestrator {
    circles: CircleFinder,
    corners: CornerFinder,
    flow: FlowTracker,
    tracking_config: TrackingConfig,
    annotated_window: String,
    flow_window: String,
    cycle_timeout: Option<Duration>,
    launch_order: [ExtractorKind; 3],
    state: LoopState,
    tracking: Option<TrackingState>,
    metrics: PipelineMetrics,
}

impl CycleOrchestrator {
    pub fn new(config: &Config, metrics: PipelineMetrics) -> Self {
        Self {
            circles: CircleFinder::new(config.circles.clone()),
            corners: CornerFinder::new(config.corners.clone()),
            flow: FlowTracker::new(config.tracking.clone()),
            tracking_config: config.tracking.clone(),
            annotated_window: config.display.annotated_window.clone(),
            flow_window: config.display.flow_window.clone(),
            cycle_timeout: config.pipeline.cycle_timeout_ms.map(Duration::from_millis),
            launch_order: ExtractorKind::ALL,
            state: LoopState::Uninitialized,
            tracking: None,
            metrics,
        }
    }

    /// Start extractor tasks in a different order. Each kind must appear once.
    #[cfg(test)]
    pub fn with_launch_order(mut self, order: [ExtractorKind; 3]) -> Result<Self> {
        for kind in ExtractorKind::ALL {
            if !order.contains(&kind) {
                bail!("launch order {:?} is missing {}", order, kind);
            }
        }
        self.launch_order = order;
        Ok(self)
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[cfg(test)]
    pub fn tracking(&self) -> Option<&TrackingState> {
        self.tracking.as_ref()
    }

    #[cfg(test)]
    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    /// Reads the first frame and seeds tracking from it. A source that is
    /// already exhausted terminates the loop as `CameraUnavailable`.
    pub fn bootstrap(&mut self, source: &mut dyn FrameSource) -> Result<LoopState> {
        let frame = source.acquire().context("Failed to read first frame")?;
        self.state = match frame {
            None => {
                warn!("No frame at bootstrap");
                LoopState::Terminated(StopReason::CameraUnavailable)
            }
            Some(frame) => {
                self.tracking = Some(TrackingState::bootstrap(&frame, &self.tracking_config)?);
                LoopState::Bootstrapped
            }
        };
        Ok(self.state)
    }

    /// One fan-out/join cycle over `frame`
    pub async fn run_cycle(&mut self, frame: Mat) -> Result<CycleOutcome> {
        let cycle_started = Instant::now();

        let lent = match self.tracking.as_ref() {
            Some(tracking) => tracking.is_lent(),
            None => bail!("cycle started without bootstrapped tracking state"),
        };
        if lent {
            warn!("Tracking state incomplete after last cycle, re-bootstrapping");
            if let Err(err) = self.rebootstrap(&frame) {
                let failure = ExtractorError::vision(ExtractorKind::Flow)(err);
                error!("Cycle aborted: {}", failure);
                return Ok(self.record(CycleOutcome::Aborted(failure), cycle_started));
            }
        }

        let handles = self.launch(&frame)?;
        let joined = join_all(handles, self.cycle_timeout).await;
        let outcome = self.settle(frame, joined)?;
        Ok(self.record(outcome, cycle_started))
    }

    /// Lends the flow inputs out of the tracking state and starts the three
    /// tasks in `launch_order`
    fn launch(&mut self, frame: &Mat) -> Result<Vec<(ExtractorKind, TaskHandle)>> {
        let tracking = self
            .tracking
            .as_mut()
            .ok_or_else(|| anyhow!("tracking state missing at launch"))?;
        let mut flow_input = Some(tracking.lend(frame.try_clone()?));

        let mut handles = Vec::with_capacity(3);
        for kind in self.launch_order {
            let metrics = self.metrics.clone();
            let handle = match kind {
                ExtractorKind::Circles => {
                    let finder = self.circles.clone();
                    let copy = frame.try_clone()?;
                    task::spawn_blocking(move || {
                        timed(&metrics, kind, || finder.find(&copy).map(Extracted::Circles))
                    })
                }
                ExtractorKind::Corners => {
                    let finder = self.corners.clone();
                    let copy = frame.try_clone()?;
                    task::spawn_blocking(move || {
                        timed(&metrics, kind, || finder.find(&copy).map(Extracted::Corners))
                    })
                }
                ExtractorKind::Flow => {
                    let tracker = self.flow.clone();
                    let input = flow_input
                        .take()
                        .ok_or_else(|| anyhow!("flow launched twice in one cycle"))?;
                    task::spawn_blocking(move || {
                        timed(&metrics, kind, || tracker.track(input).map(Extracted::Flow))
                    })
                }
            };
            handles.push((kind, handle));
        }
        Ok(handles)
    }

    /// Applies joined results. Tracking is folded or re-bootstrapped before
    /// anything is rendered; any failure turns the cycle into `Aborted`.
    fn settle(&mut self, frame: Mat, joined: Joined) -> Result<CycleOutcome> {
        let mut circles = None;
        let mut corners = None;
        let mut flow = None;
        let mut failures = Vec::new();
        match joined {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Extracted::Circles(found)) => circles = Some(found),
                        Ok(Extracted::Corners(found)) => corners = Some(found),
                        Ok(Extracted::Flow(result)) => flow = Some(result),
                        Err(err) => failures.push(err),
                    }
                }
            }
            Err(timeout) => failures.push(timeout),
        }

        let mut flow_view = None;
        let (mut tracked, mut lost, mut reset) = (0, 0, false);

        if failures.iter().any(ExtractorError::loses_tracking) {
            warn!("Tracking state lost with the flow task, re-bootstrapping");
            match self.rebootstrap(&frame) {
                Ok(()) => reset = true,
                Err(err) => failures.push(ExtractorError::vision(ExtractorKind::Flow)(err)),
            }
        } else if let Some(mut result) = flow {
            flow_view = Some(mem::take(&mut result.visualization));
            tracked = result.points.len();
            lost = result.lost;
            self.metrics.add(&self.metrics.points_tracked, tracked as u64);
            self.metrics.add(&self.metrics.points_lost, lost as u64);

            let tracking = self
                .tracking
                .as_mut()
                .ok_or_else(|| anyhow!("tracking state missing at fold"))?;
            match tracking.absorb(frame.try_clone()?, result, &self.tracking_config) {
                Ok(true) => {
                    info!("Tracking reset: {} fresh points", tracking.points().len());
                    self.metrics.inc(&self.metrics.resets);
                    reset = true;
                }
                Ok(false) => {
                    debug!("{} cycles since reset", tracking.frames_since_reset());
                }
                Err(err) => {
                    warn!("Reset failed, tracking re-bootstraps next cycle");
                    failures.push(ExtractorError::vision(ExtractorKind::Flow)(err));
                }
            }
        } else {
            bail!("flow result missing after join");
        }

        if !failures.is_empty() {
            for failure in &failures {
                error!("Cycle aborted: {}", failure);
            }
            return Ok(CycleOutcome::Aborted(failures.remove(0)));
        }

        let (circles, corners, flow_view) = match (circles, corners, flow_view) {
            (Some(circles), Some(corners), Some(flow_view)) => (circles, corners, flow_view),
            _ => bail!("extractor result missing after join"),
        };

        self.metrics
            .add(&self.metrics.circles_found, circles.len() as u64);
        self.metrics
            .add(&self.metrics.corners_found, corners.len() as u64);

        let annotated = render::annotate(&frame, &circles, &corners)?;

        Ok(CycleOutcome::Rendered(CycleOutput {
            annotated,
            flow_view,
            circles: circles.len(),
            corners: corners.len(),
            tracked,
            lost,
            reset,
        }))
    }

    fn rebootstrap(&mut self, frame: &Mat) -> opencv::Result<()> {
        self.tracking = Some(TrackingState::bootstrap(frame, &self.tracking_config)?);
        self.metrics.inc(&self.metrics.resets);
        Ok(())
    }

    fn record(&self, outcome: CycleOutcome, started: Instant) -> CycleOutcome {
        self.metrics.inc(&self.metrics.cycles);
        if matches!(outcome, CycleOutcome::Aborted(_)) {
            self.metrics.inc(&self.metrics.aborted_cycles);
        }
        self.metrics
            .set_timing(&self.metrics.cycle_time_us, started.elapsed());
        outcome
    }

    /// Bootstraps if needed, then cycles until the source ends or the
    /// display asks to stop. Stop requests take effect between cycles.
    pub async fn run(
        &mut self,
        source: &mut dyn FrameSource,
        display: &mut dyn Display,
    ) -> Result<RunSummary> {
        if self.state == LoopState::Uninitialized {
            self.bootstrap(source)?;
        }
        if let LoopState::Terminated(stop) = self.state {
            return Ok(RunSummary { stop, cycles: 0 });
        }

        self.state = LoopState::Running;
        let mut cycles = 0;

        let stop = loop {
            let frame = match source.acquire().context("Frame acquisition failed")? {
                Some(frame) => frame,
                None => break StopReason::EndOfStream,
            };

            cycles += 1;
            match self.run_cycle(frame).await? {
                CycleOutcome::Rendered(output) => {
                    debug!(
                        "Cycle {}: {} circles, {} corners, {} tracked, {} lost",
                        cycles, output.circles, output.corners, output.tracked, output.lost
                    );
                    if output.reset {
                        debug!("Trails cleared");
                    }
                    display.show(&self.annotated_window, &output.annotated)?;
                    display.show(&self.flow_window, &output.flow_view)?;
                }
                CycleOutcome::Aborted(err) => {
                    debug!("Cycle {}: skipping render: {}", cycles, err);
                }
            }

            if display.poll_stop()? {
                break StopReason::StopRequested;
            }
        };

        info!("Loop stopped after {} cycles ({:?})", cycles, stop);
        self.state = LoopState::Terminated(stop);
        Ok(RunSummary { stop, cycles })
    }
}

fn timed<T>(
    metrics: &PipelineMetrics,
    kind: ExtractorKind,
    work: impl FnOnce() -> opencv::Result<T>,
) -> Result<T, ExtractorError> {
    let started = Instant::now();
    let result = work().map_err(ExtractorError::vision(kind));
    metrics.set_timing(metrics.extractor_timing(kind), started.elapsed());
    result
}

/// Waits for every handle. A panicked task becomes `Panicked`; hitting the
/// timeout fails the whole join and leaves the tasks running detached.
async fn join_all(
    handles: Vec<(ExtractorKind, TaskHandle)>,
    timeout: Option<Duration>,
) -> Joined {
    let join = async move {
        let mut results = Vec::with_capacity(handles.len());
        for (kind, handle) in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(_) => Err(ExtractorError::Panicked { extractor: kind }),
            });
        }
        results
    };

    match timeout {
        Some(limit) => tokio::time::timeout(limit, join)
            .await
            .map_err(|_| ExtractorError::TimedOut {
                after_ms: limit.as_millis() as u64,
            }),
        None => Ok(join.await),
    }
}
