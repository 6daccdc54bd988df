// src/render.rs

use crate::types::Circle;
use anyhow::Result;
use opencv::{
    core::{self, KeyPoint, Mat, Vector},
    features2d::{self, DrawMatchesFlags},
    imgproc,
    prelude::*,
};

fn green() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 0.0, 0.0)
}

fn red() -> core::Scalar {
    core::Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn yellow() -> core::Scalar {
    core::Scalar::new(0.0, 255.0, 255.0, 0.0)
}

/// Center dot plus outline for every circle, in place
pub fn draw_circles(frame: &mut Mat, circles: &[Circle]) -> Result<()> {
    for circle in circles {
        let center = core::Point::new(
            circle.center.x.round() as i32,
            circle.center.y.round() as i32,
        );

        // Center
        imgproc::circle(frame, center, 3, green(), -1, imgproc::LINE_8, 0)?;

        // Outline
        imgproc::circle(
            frame,
            center,
            circle.radius.round() as i32,
            red(),
            3,
            imgproc::LINE_8,
            0,
        )?;
    }
    Ok(())
}

/// Keypoint markers in yellow. Returns a new frame.
pub fn draw_corners(frame: &Mat, keypoints: &Vector<KeyPoint>) -> Result<Mat> {
    let mut output = frame.try_clone()?;
    if keypoints.is_empty() {
        return Ok(output);
    }
    features2d::draw_keypoints(
        frame,
        keypoints,
        &mut output,
        yellow(),
        DrawMatchesFlags::DEFAULT,
    )?;
    Ok(output)
}

/// Annotated copy of `frame` with both circle and corner overlays
pub fn annotate(frame: &Mat, circles: &[Circle], keypoints: &Vector<KeyPoint>) -> Result<Mat> {
    let mut output = frame.try_clone()?;
    draw_circles(&mut output, circles)?;
    draw_corners(&output, keypoints)
}
