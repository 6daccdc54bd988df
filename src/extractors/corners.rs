// src/extractors/corners.rs

use super::to_gray;
use crate::types::CornerConfig;
use opencv::{
    core::{KeyPoint, Mat, Vector},
    features2d::{self, ORB_ScoreType},
    prelude::*,
};
use tracing::debug;

/// ORB keypoint detection with the library's default sensitivity.
///
/// A detector is built per call so the finder itself holds no mutable
/// state and can be handed to any task.
#[derive(Debug, Clone)]
pub struct CornerFinder {
    config: CornerConfig,
}

impl CornerFinder {
    pub fn new(config: CornerConfig) -> Self {
        Self { config }
    }

    pub fn find(&self, frame: &Mat) -> opencv::Result<Vector<KeyPoint>> {
        debug!("Finding corners...");
        let gray = to_gray(frame)?;

        let mut detector = features2d::ORB::create(
            self.config.max_features,
            1.2,
            8,
            31,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            31,
            20,
        )?;

        let mut keypoints = Vector::<KeyPoint>::new();
        detector.detect(&gray, &mut keypoints, &Mat::default())?;
        Ok(keypoints)
    }
}
