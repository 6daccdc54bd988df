// src/types.rs

use opencv::core::Point2f;
use serde::{Deserialize, Serialize};

/// Hard ceiling on concurrently tracked points. The trail palette is sized
/// to match, so every retained point has a color.
pub const MAX_TRACKED_POINTS: usize = 100;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub circles: CircleConfig,
    pub corners: CornerConfig,
    pub tracking: TrackingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub device_index: i32,
    /// Read from a video file instead of the camera when set
    pub video_path: Option<String>,
    /// Extra reads attempted on an empty frame before calling it end of stream
    pub read_retries: u32,
    pub fallback_image: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            video_path: None,
            read_retries: 0,
            fallback_image: "./data/planets.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub enabled: bool,
    pub annotated_window: String,
    pub flow_window: String,
    pub key_poll_ms: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            annotated_window: "Boom".to_string(),
            flow_window: "Optical flow".to_string(),
            key_poll_ms: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircleConfig {
    pub blur_kernel: i32,
    pub blur_sigma: f64,
    /// Inverse accumulator resolution ratio
    pub dp: f64,
    /// Minimum center separation is min(rows, cols) / this
    pub min_dist_divisor: f64,
    pub canny_threshold: f64,
    pub accumulator_threshold: f64,
    pub min_radius: i32,
    pub max_radius: i32,
}

impl Default for CircleConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 3,
            blur_sigma: 2.0,
            dp: 2.0,
            min_dist_divisor: 4.0,
            canny_threshold: 150.0,
            accumulator_threshold: 200.0,
            min_radius: 0,
            max_radius: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CornerConfig {
    pub max_features: i32,
}

impl Default for CornerConfig {
    fn default() -> Self {
        Self { max_features: 500 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    // Feature sampling (bootstrap / reset)
    pub max_points: usize,
    pub quality_level: f64,
    pub min_distance: f64,
    pub block_size: i32,
    pub use_harris: bool,
    pub harris_k: f64,

    // Pyramidal Lucas-Kanade
    pub window_size: i32,
    pub pyramid_levels: i32,
    pub max_iterations: i32,
    pub epsilon: f64,

    /// Cycles between full re-bootstraps of the tracked set
    pub reset_interval: u32,
    pub palette_seed: Option<u64>,
    pub trail_thickness: i32,
    pub point_radius: i32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            max_points: MAX_TRACKED_POINTS,
            quality_level: 0.3,
            min_distance: 7.0,
            block_size: 7,
            use_harris: false,
            harris_k: 0.04,
            window_size: 15,
            pyramid_levels: 2,
            max_iterations: 10,
            epsilon: 0.03,
            reset_interval: 5,
            palette_seed: None,
            trail_thickness: 2,
            point_radius: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on the join of one cycle; unbounded when absent
    pub cycle_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// A circle candidate from the Hough transform
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub center: Point2f,
    pub radius: f32,
}

/// The three analyses run every cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractorKind {
    Circles,
    Corners,
    Flow,
}

impl ExtractorKind {
    pub const ALL: [ExtractorKind; 3] = [Self::Circles, Self::Corners, Self::Flow];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Circles => "circles",
            Self::Corners => "corners",
            Self::Flow => "flow",
        }
    }
}

impl std::fmt::Display for ExtractorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
