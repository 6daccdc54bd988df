// src/extractors/mod.rs
//
// The three per-frame analyses. Each one owns its inputs for the duration of
// a task and never touches another task's data:
//
//   frame copy ──→ circles ──→ Vec<Circle>
//   frame copy ──→ corners ──→ Vector<KeyPoint>
//   prev + frame copy + mask + points ──→ flow ──→ FlowResult
//
// `to_gray` is shared by all of them.

pub mod circles;
pub mod corners;
pub mod flow;

pub use circles::CircleFinder;
pub use corners::CornerFinder;
pub use flow::{sample_features, FlowInput, FlowResult, FlowTracker};

use opencv::{core::Mat, imgproc, prelude::*};

/// Single-channel intensity image. Already-gray input is copied through.
pub fn to_gray(frame: &Mat) -> opencv::Result<Mat> {
    let mut gray = Mat::default();
    if frame.channels() == 1 {
        frame.copy_to(&mut gray)?;
    } else {
        imgproc::cvt_color_def(frame, &mut gray, imgproc::COLOR_BGR2GRAY)?;
    }
    Ok(gray)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use opencv::{
        core::{Mat, Point, Rect, Scalar, Size, CV_8UC3},
        imgproc,
        prelude::*,
    };

    pub const WIDTH: i32 = 320;
    pub const HEIGHT: i32 = 240;

    pub fn black_frame() -> Mat {
        Mat::new_size_with_default(Size::new(WIDTH, HEIGHT), CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    /// White rectangles on black: plenty of strong corners, no circles
    pub fn blocks_frame() -> Mat {
        shifted_blocks_frame(0)
    }

    /// A single filled disc centred in the frame
    pub fn disc_frame(radius: i32) -> Mat {
        let mut frame = black_frame();
        imgproc::circle(
            &mut frame,
            Point::new(WIDTH / 2, HEIGHT / 2),
            radius,
            Scalar::all(255.0),
            -1,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        frame
    }

    /// `blocks_frame` shifted right by `dx` pixels
    pub fn shifted_blocks_frame(dx: i32) -> Mat {
        let mut frame = black_frame();
        let white = Scalar::all(255.0);
        for (x, y) in [(50, 50), (150, 60), (230, 140), (70, 150)] {
            imgproc::rectangle(
                &mut frame,
                Rect::new(x + dx, y, 40, 30),
                white,
                -1,
                imgproc::LINE_8,
                0,
            )
            .unwrap();
        }
        frame
    }

    pub fn nonzero_pixels(image: &Mat) -> i32 {
        let gray = super::to_gray(image).unwrap();
        opencv::core::count_non_zero(&gray).unwrap()
    }
}
