// src/extractors/circles.rs

use super::to_gray;
use crate::types::{Circle, CircleConfig};
use opencv::{
    core::{Mat, Point2f, Size, Vec3f, Vector},
    imgproc,
    prelude::*,
};
use tracing::debug;

/// Hough-gradient circle detection on a blurred intensity image
#[derive(Debug, Clone)]
pub struct CircleFinder {
    config: CircleConfig,
}

impl CircleFinder {
    pub fn new(config: CircleConfig) -> Self {
        Self { config }
    }

    /// Circle candidates in accumulator order. No circles is an empty Vec,
    /// not an error.
    pub fn find(&self, frame: &Mat) -> opencv::Result<Vec<Circle>> {
        debug!("Finding circles...");
        let gray = to_gray(frame)?;

        let mut blurred = Mat::default();
        let k = self.config.blur_kernel;
        imgproc::gaussian_blur_def(&gray, &mut blurred, Size::new(k, k), self.config.blur_sigma)?;

        let min_dist = f64::from(frame.rows().min(frame.cols())) / self.config.min_dist_divisor;

        let mut raw = Vector::<Vec3f>::new();
        imgproc::hough_circles(
            &blurred,
            &mut raw,
            imgproc::HOUGH_GRADIENT,
            self.config.dp,
            min_dist,
            self.config.canny_threshold,
            self.config.accumulator_threshold,
            self.config.min_radius,
            self.config.max_radius,
        )?;

        Ok(raw
            .iter()
            .map(|c| Circle {
                center: Point2f::new(c.0[0], c.0[1]),
                radius: c.0[2],
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::fixtures::{black_frame, blocks_frame, disc_frame, HEIGHT, WIDTH};

    #[test]
    fn test_black_frame_has_no_circles() {
        let finder = CircleFinder::new(CircleConfig::default());
        let circles = finder.find(&black_frame()).unwrap();
        assert!(circles.is_empty());
    }

    #[test]
    fn test_find_is_pure() {
        let finder = CircleFinder::new(CircleConfig::default());
        let frame = blocks_frame();
        let first = finder.find(&frame).unwrap();
        let second = finder.find(&frame).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_finds_synthetic_disc_with_relaxed_threshold() {
        let config = CircleConfig {
            accumulator_threshold: 30.0,
            ..CircleConfig::default()
        };
        let finder = CircleFinder::new(config);
        let circles = finder.find(&disc_frame(50)).unwrap();

        assert!(!circles.is_empty());
        let best = circles[0];
        assert!((best.center.x - (WIDTH / 2) as f32).abs() < 6.0);
        assert!((best.center.y - (HEIGHT / 2) as f32).abs() < 6.0);
        assert!((best.radius - 50.0).abs() < 8.0);
    }

    #[test]
    fn test_input_frame_untouched() {
        let finder = CircleFinder::new(CircleConfig::default());
        let frame = disc_frame(40);
        let before = frame.try_clone().unwrap();
        finder.find(&frame).unwrap();

        let mut diff = Mat::default();
        opencv::core::absdiff(&frame, &before, &mut diff).unwrap();
        assert_eq!(crate::extractors::fixtures::nonzero_pixels(&diff), 0);
    }
}
