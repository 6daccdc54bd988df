// src/tracking.rs
//
// State carried from one cycle to the next: the previous frame, the tracked
// point set, the trail mask and the frames-since-reset counter.
//
// `previous_frame` and `trail_mask` always belong to the same cycle. They
// leave together in `lend()` and come back together in `absorb()`, or are
// both rebuilt by a bootstrap.

use crate::extractors::{sample_features, FlowInput, FlowResult};
use crate::types::TrackingConfig;
use opencv::{
    core::{Mat, Point2f, Scalar, Vector},
    prelude::*,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::mem;
use std::sync::Arc;
use tracing::{debug, info};

/// Per-point trail colors, indexed by position in the tracked sequence.
/// Generated once per bootstrap.
#[derive(Debug, Clone)]
pub struct Palette(Arc<[Scalar]>);

impl Palette {
    pub fn generate(size: usize, seed: Option<u64>) -> Self {
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let colors: Vec<Scalar> = (0..size.max(1))
            .map(|_| {
                Scalar::new(
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                    rng.gen_range(0.0..255.0),
                    0.0,
                )
            })
            .collect();
        Self(colors.into())
    }

    /// Color for the point at `index`. Indices past the end wrap around.
    pub fn color(&self, index: usize) -> Scalar {
        self.0[index % self.0.len()]
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub struct TrackingState {
    previous_frame: Mat,
    points: Vector<Point2f>,
    trail_mask: Mat,
    frames_since_reset: u32,
    palette: Palette,
}

impl TrackingState {
    /// Seed tracking from `frame`: fresh feature sample, zeroed mask,
    /// counter at 0.
    pub fn bootstrap(frame: &Mat, config: &TrackingConfig) -> opencv::Result<Self> {
        Self::bootstrap_owned(frame.try_clone()?, config)
    }

    fn bootstrap_owned(frame: Mat, config: &TrackingConfig) -> opencv::Result<Self> {
        let points = sample_features(&frame, config)?;
        let trail_mask = Mat::new_size_with_default(frame.size()?, frame.typ(), Scalar::all(0.0))?;
        info!("Tracking bootstrapped with {} points", points.len());

        Ok(Self {
            previous_frame: frame,
            points,
            trail_mask,
            frames_since_reset: 0,
            palette: Palette::generate(config.max_points, config.palette_seed),
        })
    }

    /// Move this cycle's flow inputs out of the state. Until `absorb` or a
    /// new bootstrap, the state holds no frame and no mask.
    pub fn lend(&mut self, current: Mat) -> FlowInput {
        FlowInput {
            previous: mem::take(&mut self.previous_frame),
            current,
            trail_mask: mem::take(&mut self.trail_mask),
            points: mem::take(&mut self.points),
            palette: self.palette.clone(),
        }
    }

    /// True between `lend` and `absorb`
    pub fn is_lent(&self) -> bool {
        self.previous_frame.empty() || self.trail_mask.empty()
    }

    /// Fold a flow result and the frame it was computed on back into the
    /// state. Returns true when this cycle hit the reset interval and
    /// tracking was re-bootstrapped from `frame`. If that re-bootstrap
    /// fails the state stays lent.
    pub fn absorb(
        &mut self,
        frame: Mat,
        result: FlowResult,
        config: &TrackingConfig,
    ) -> opencv::Result<bool> {
        self.frames_since_reset += 1;

        if self.frames_since_reset >= config.reset_interval {
            debug!(
                "Reset interval reached after {} cycles",
                self.frames_since_reset
            );
            *self = Self::bootstrap_owned(frame, config)?;
            return Ok(true);
        }

        self.previous_frame = frame;
        self.points = result.points;
        self.trail_mask = result.trail_mask;
        Ok(false)
    }

    pub fn points(&self) -> &Vector<Point2f> {
        &self.points
    }

    #[cfg(test)]
    pub fn trail_mask(&self) -> &Mat {
        &self.trail_mask
    }

    pub fn frames_since_reset(&self) -> u32 {
        self.frames_since_reset
    }

    #[cfg(test)]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }
}
