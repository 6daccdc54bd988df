// src/extractors/flow.rs
//
// Sparse optical flow between consecutive frames.
//
// The tracker receives the trail mask and the point set by value, draws into
// the mask, and hands both back in `FlowResult`. Nothing else holds the mask
// while the task runs, so no locking is needed.

use super::to_gray;
use crate::tracking::Palette;
use crate::types::TrackingConfig;
use opencv::{
    core::{self, Mat, Point, Point2f, Size, TermCriteria, TermCriteria_Type, Vector},
    imgproc,
    prelude::*,
    video,
};
use tracing::debug;

/// Smallest min-eigenvalue of the LK spatial gradient matrix (library default)
const MIN_EIG_THRESHOLD: f64 = 1e-4;

/// Everything the flow task owns for one cycle
pub struct FlowInput {
    pub previous: Mat,
    pub current: Mat,
    pub trail_mask: Mat,
    pub points: Vector<Point2f>,
    pub palette: Palette,
}

pub struct FlowResult {
    /// Points the estimator reported as found, in their original order
    pub points: Vector<Point2f>,
    /// The mask passed in, with this cycle's trail segments added
    pub trail_mask: Mat,
    /// Current frame with point markers, composited with the trail mask
    pub visualization: Mat,
    pub lost: usize,
}

#[derive(Debug, Clone)]
pub struct FlowTracker {
    config: TrackingConfig,
}

impl FlowTracker {
    pub fn new(config: TrackingConfig) -> Self {
        Self { config }
    }

    pub fn track(&self, input: FlowInput) -> opencv::Result<FlowResult> {
        let FlowInput {
            previous,
            current,
            mut trail_mask,
            points,
            palette,
        } = input;

        let mut markers = current.try_clone()?;

        if points.is_empty() {
            let visualization = composite(&markers, &trail_mask)?;
            return Ok(FlowResult {
                points,
                trail_mask,
                visualization,
                lost: 0,
            });
        }

        let prev_gray = to_gray(&previous)?;
        let curr_gray = to_gray(&current)?;

        let mut next = Vector::<Point2f>::new();
        let mut status = Vector::<u8>::new();
        let mut err = Vector::<f32>::new();
        let criteria = TermCriteria::new(
            TermCriteria_Type::COUNT as i32 | TermCriteria_Type::EPS as i32,
            self.config.max_iterations,
            self.config.epsilon,
        )?;
        let window = self.config.window_size;

        video::calc_optical_flow_pyr_lk(
            &prev_gray,
            &curr_gray,
            &points,
            &mut next,
            &mut status,
            &mut err,
            Size::new(window, window),
            self.config.pyramid_levels,
            criteria,
            0,
            MIN_EIG_THRESHOLD,
        )?;

        let mut retained = Vector::<Point2f>::with_capacity(points.len());
        for (i, (old, new)) in points.iter().zip(next.iter()).enumerate() {
            if status.get(i)? != 1 {
                continue;
            }
            let color = palette.color(retained.len());
            imgproc::line(
                &mut trail_mask,
                pixel(new),
                pixel(old),
                color,
                self.config.trail_thickness,
                imgproc::LINE_8,
                0,
            )?;
            imgproc::circle(
                &mut markers,
                pixel(new),
                self.config.point_radius,
                color,
                -1,
                imgproc::LINE_8,
                0,
            )?;
            retained.push(new);
        }

        let lost = points.len() - retained.len();
        debug!("Flow: {} tracked, {} lost", retained.len(), lost);

        let visualization = composite(&markers, &trail_mask)?;
        Ok(FlowResult {
            points: retained,
            trail_mask,
            visualization,
            lost,
        })
    }
}

/// Strong corners to seed tracking, capped at `max_points`
pub fn sample_features(frame: &Mat, config: &TrackingConfig) -> opencv::Result<Vector<Point2f>> {
    let gray = to_gray(frame)?;
    let mut corners = Vector::<Point2f>::new();
    imgproc::good_features_to_track(
        &gray,
        &mut corners,
        config.max_points as i32,
        config.quality_level,
        config.min_distance,
        &Mat::default(),
        config.block_size,
        config.use_harris,
        config.harris_k,
    )?;
    Ok(corners)
}

fn pixel(p: Point2f) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

fn composite(frame: &Mat, mask: &Mat) -> opencv::Result<Mat> {
    let mut out = Mat::default();
    core::add(frame, mask, &mut out, &Mat::default(), -1)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fixtures::{
        black_frame, blocks_frame, nonzero_pixels, shifted_blocks_frame, HEIGHT, WIDTH,
    };

    fn tracker() -> FlowTracker {
        FlowTracker::new(TrackingConfig::default())
    }

    fn input(previous: Mat, current: Mat, points: Vector<Point2f>) -> FlowInput {
        let trail_mask = black_frame();
        FlowInput {
            previous,
            current,
            trail_mask,
            points,
            palette: Palette::generate(100, Some(7)),
        }
    }

    #[test]
    fn test_sample_features_capped_and_in_bounds() {
        let config = TrackingConfig::default();
        let points = sample_features(&blocks_frame(), &config).unwrap();
        assert!(!points.is_empty());
        assert!(points.len() <= 100);
        for p in points.iter() {
            assert!(p.x >= 0.0 && p.x < WIDTH as f32);
            assert!(p.y >= 0.0 && p.y < HEIGHT as f32);
        }
    }

    #[test]
    fn test_sample_features_on_black_frame_is_empty() {
        let points = sample_features(&black_frame(), &TrackingConfig::default()).unwrap();
        assert!(points.is_empty());
    }

    #[test]
    fn test_nothing_to_track_returns_empty() {
        let result = tracker()
            .track(input(black_frame(), black_frame(), Vector::new()))
            .unwrap();
        assert!(result.points.is_empty());
        assert_eq!(result.lost, 0);
        assert_eq!(nonzero_pixels(&result.trail_mask), 0);
    }

    #[test]
    fn test_static_scene_keeps_points_in_place() {
        let frame = blocks_frame();
        let seeds = sample_features(&frame, &TrackingConfig::default()).unwrap();
        let result = tracker()
            .track(input(frame.clone(), frame, seeds.clone()))
            .unwrap();

        assert!(!result.points.is_empty());
        assert!(result.points.len() <= seeds.len());
        for p in result.points.iter() {
            let nearest = seeds
                .iter()
                .map(|s| ((s.x - p.x).powi(2) + (s.y - p.y).powi(2)).sqrt())
                .fold(f32::INFINITY, f32::min);
            assert!(nearest < 0.5);
        }
        assert!(nonzero_pixels(&result.trail_mask) > 0);
    }

    #[test]
    fn test_follows_horizontal_shift() {
        let previous = blocks_frame();
        let seeds = sample_features(&previous, &TrackingConfig::default()).unwrap();
        let result = tracker()
            .track(input(previous, shifted_blocks_frame(4), seeds.clone()))
            .unwrap();

        assert!(!result.points.is_empty());
        let total: f32 = result
            .points
            .iter()
            .map(|p| {
                seeds
                    .iter()
                    .map(|s| ((s.x + 4.0 - p.x).powi(2) + (s.y - p.y).powi(2)).sqrt())
                    .fold(f32::INFINITY, f32::min)
            })
            .sum();
        let mean_error = total / result.points.len() as f32;
        assert!(mean_error < 1.5, "mean error {}", mean_error);
    }

    #[test]
    fn test_lost_points_are_dropped() {
        let frame = blocks_frame();
        let mut points = sample_features(&frame, &TrackingConfig::default()).unwrap();
        let seeded = points.len();
        // Middle of a flat black area: no gradient, the estimator gives up on it
        points.push(Point2f::new(12.0, 12.0));

        let result = tracker().track(input(frame.clone(), frame, points)).unwrap();

        assert!(result.lost >= 1);
        assert!(result.points.len() <= seeded);
        assert!(result
            .points
            .iter()
            .all(|p| (p.x - 12.0).abs() > 1.0 || (p.y - 12.0).abs() > 1.0));
    }

    #[test]
    fn test_track_is_deterministic() {
        let previous = blocks_frame();
        let current = shifted_blocks_frame(2);
        let seeds = sample_features(&previous, &TrackingConfig::default()).unwrap();

        let a = tracker()
            .track(input(previous.clone(), current.clone(), seeds.clone()))
            .unwrap();
        let b = tracker().track(input(previous, current, seeds)).unwrap();

        assert_eq!(a.points.to_vec(), b.points.to_vec());
        let mut diff = Mat::default();
        core::absdiff(&a.trail_mask, &b.trail_mask, &mut diff).unwrap();
        assert_eq!(nonzero_pixels(&diff), 0);
    }
}
